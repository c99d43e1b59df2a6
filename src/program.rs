//! Program model: typed arguments and an ordered list of instructions
//!
//! A [`Program`] is a straight-line dataflow graph. Instructions can only
//! reference values that already exist when they are appended, so program
//! order is always a valid dependency order.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// Widest argument the functional units can compute on
pub const MAX_WIDTH: u32 = 64;

/// Identity of anything that can be produced or consumed
///
/// Values compare by identity: two arguments with the same name and width
/// in different positions are different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Value {
    /// Index into the program's argument list
    Arg(usize),
    /// Index into the program's instruction list
    Instr(usize),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Arg(id) => write!(f, "a{}", id),
            Value::Instr(id) => write!(f, "i{}", id),
        }
    }
}

impl From<Value> for String {
    fn from(value: Value) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Value {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let parse = |digits: &str| {
            digits
                .parse::<usize>()
                .map_err(|_| format!("Invalid value reference: {}", s))
        };

        if let Some(rest) = s.strip_prefix('a') {
            parse(rest).map(Value::Arg)
        } else if let Some(rest) = s.strip_prefix('i') {
            parse(rest).map(Value::Instr)
        } else {
            Err(format!("Invalid value reference: {}", s))
        }
    }
}

/// Direction of a program argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// A named, fixed-width program argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub width: u32,
    pub direction: Direction,
}

impl Argument {
    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }
}

impl std::fmt::Display for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} : {}", self.direction, self.name, self.width)
    }
}

/// Operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Mul,
    MulPipelined,
    /// Sink: drives an output argument with a value
    Write,
}

impl Opcode {
    pub const ALL: [Opcode; 8] = [
        Opcode::Add,
        Opcode::Sub,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Mul,
        Opcode::MulPipelined,
        Opcode::Write,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Mul => "mul",
            Opcode::MulPipelined => "mul_pipelined",
            Opcode::Write => "write",
        }
    }

    /// Look up an opcode by its textual name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "uadd" => Some(Opcode::Add),
            "umul_l1" => Some(Opcode::MulPipelined),
            _ => Self::ALL.iter().copied().find(|op| op.name() == name),
        }
    }

    /// Everything except the sink produces a value
    pub fn has_output(&self) -> bool {
        *self != Opcode::Write
    }

    /// Number of operands the instruction takes
    pub fn arity(&self) -> usize {
        2
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single operation in the program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Sequence number, equal to the instruction's position in the program
    pub id: usize,
    pub opcode: Opcode,
    pub operands: Vec<Value>,
    /// Cycles from start to result; 0 means combinational
    pub latency: u32,
    /// Result width in bits
    pub width: u32,
}

impl Instruction {
    pub fn has_output(&self) -> bool {
        self.opcode.has_output()
    }

    pub fn uses(&self, value: Value) -> bool {
        self.operands.contains(&value)
    }

    pub fn value(&self) -> Value {
        Value::Instr(self.id)
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let operands: Vec<String> = self.operands.iter().map(|v| v.to_string()).collect();
        write!(f, "i{} = {}({})", self.id, self.opcode, operands.join(", "))?;
        if self.latency > 0 {
            write!(f, " latency {}", self.latency)?;
        }
        Ok(())
    }
}

/// A complete straight-line program
///
/// Deserialized programs are rebuilt through the same checks as
/// [`Program::add_input`] and [`Program::add_instr`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProgram")]
pub struct Program {
    pub name: String,
    args: Vec<Argument>,
    instrs: Vec<Instruction>,
    /// Reserved for loop pipelining; always 1
    pub trip_count: u32,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            instrs: Vec::new(),
            trip_count: 1,
        }
    }

    /// Add an input argument
    pub fn add_input(&mut self, name: &str, width: u32) -> CompileResult<Value> {
        self.add_arg(name, width, Direction::Input)
    }

    /// Add an output argument
    pub fn add_output(&mut self, name: &str, width: u32) -> CompileResult<Value> {
        self.add_arg(name, width, Direction::Output)
    }

    fn add_arg(&mut self, name: &str, width: u32, direction: Direction) -> CompileResult<Value> {
        if self.args.iter().any(|a| a.name == name) {
            return Err(CompileError::DuplicatePort {
                name: name.to_string(),
            });
        }

        if !(1..=MAX_WIDTH).contains(&width) {
            return Err(CompileError::InvalidWidth {
                name: name.to_string(),
                width,
            });
        }

        self.args.push(Argument {
            name: name.to_string(),
            width,
            direction,
        });
        Ok(Value::Arg(self.args.len() - 1))
    }

    /// Append an instruction with latency 0
    pub fn add_instr(&mut self, opcode: Opcode, operands: &[Value]) -> CompileResult<Value> {
        let id = self.instrs.len();
        let label = format!("i{} ({})", id, opcode);

        for operand in operands {
            if !self.contains(*operand) {
                return Err(CompileError::undefined(operand.to_string()));
            }
        }

        if operands.len() != opcode.arity() {
            return Err(CompileError::invalid_operands(
                label,
                format!("expected {} operands, got {}", opcode.arity(), operands.len()),
            ));
        }

        let width = if opcode == Opcode::Write {
            self.check_write(&label, operands[0], operands[1])?
        } else {
            for operand in operands {
                if !self.produces(*operand) {
                    return Err(CompileError::invalid_operands(
                        label,
                        format!("{} does not produce a value", self.value_name(*operand)),
                    ));
                }
            }
            operands.iter().map(|v| self.width(*v)).max().unwrap_or(0)
        };

        self.instrs.push(Instruction {
            id,
            opcode,
            operands: operands.to_vec(),
            latency: 0,
            width,
        });
        Ok(Value::Instr(id))
    }

    /// Validate a sink and return the width of the port it drives
    fn check_write(&self, label: &str, target: Value, source: Value) -> CompileResult<u32> {
        let port = match target {
            Value::Arg(id) if self.args[id].is_output() => &self.args[id],
            _ => {
                return Err(CompileError::invalid_operands(
                    label,
                    format!("{} is not an output", self.value_name(target)),
                ))
            }
        };

        if !self.produces(source) {
            return Err(CompileError::invalid_operands(
                label,
                format!("{} does not produce a value", self.value_name(source)),
            ));
        }

        if self.width(source) > port.width {
            return Err(CompileError::invalid_operands(
                label,
                format!(
                    "{} is {} bits wide but `{}` is {}",
                    self.value_name(source),
                    self.width(source),
                    port.name,
                    port.width
                ),
            ));
        }

        if self.writer_of(target).is_some() {
            return Err(CompileError::MultiplyDrivenOutput {
                name: port.name.clone(),
            });
        }

        Ok(port.width)
    }

    /// Set the latency of an instruction, e.g. to model a pipelined resource
    ///
    /// Sinks bind no unit, so they stay at latency 0.
    pub fn set_latency(&mut self, value: Value, latency: u32) -> CompileResult<()> {
        let instr = match value {
            Value::Instr(id) => self.instrs.get_mut(id),
            Value::Arg(_) => None,
        }
        .ok_or_else(|| CompileError::undefined(value.to_string()))?;

        if !instr.has_output() && latency > 0 {
            return Err(CompileError::invalid_operands(
                format!("i{} ({})", instr.id, instr.opcode),
                "sinks have no latency",
            ));
        }

        instr.latency = latency;
        Ok(())
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    pub fn instrs(&self) -> &[Instruction] {
        &self.instrs
    }

    pub fn arg(&self, id: usize) -> Option<&Argument> {
        self.args.get(id)
    }

    pub fn instr(&self, id: usize) -> Option<&Instruction> {
        self.instrs.get(id)
    }

    /// Input arguments, in declaration order
    pub fn inputs(&self) -> impl Iterator<Item = (Value, &Argument)> {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_input())
            .map(|(id, a)| (Value::Arg(id), a))
    }

    /// Output arguments, in declaration order
    pub fn outputs(&self) -> impl Iterator<Item = (Value, &Argument)> {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_output())
            .map(|(id, a)| (Value::Arg(id), a))
    }

    /// Every value that carries data: input arguments and producing instructions
    pub fn produced_values(&self) -> Vec<Value> {
        let args = self.inputs().map(|(v, _)| v);
        let instrs = self
            .instrs
            .iter()
            .filter(|i| i.has_output())
            .map(|i| i.value());
        args.chain(instrs).collect()
    }

    pub fn contains(&self, value: Value) -> bool {
        match value {
            Value::Arg(id) => id < self.args.len(),
            Value::Instr(id) => id < self.instrs.len(),
        }
    }

    /// Whether the value carries data that instructions can consume
    pub fn produces(&self, value: Value) -> bool {
        match value {
            Value::Arg(id) => self.args.get(id).is_some_and(|a| a.is_input()),
            Value::Instr(id) => self.instrs.get(id).is_some_and(|i| i.has_output()),
        }
    }

    /// Cycles from a value's start to its production
    ///
    /// Arguments take one cycle: the register that captures them.
    pub fn latency(&self, value: Value) -> u32 {
        match value {
            Value::Arg(_) => 1,
            Value::Instr(id) => self.instrs.get(id).map_or(0, |i| i.latency),
        }
    }

    pub fn width(&self, value: Value) -> u32 {
        match value {
            Value::Arg(id) => self.args.get(id).map_or(0, |a| a.width),
            Value::Instr(id) => self.instrs.get(id).map_or(0, |i| i.width),
        }
    }

    /// Instructions that consume a value, in program order
    pub fn users(&self, value: Value) -> impl Iterator<Item = &Instruction> {
        self.instrs.iter().filter(move |i| i.uses(value))
    }

    /// The sink that drives an output argument, if any
    pub fn writer_of(&self, output: Value) -> Option<&Instruction> {
        self.instrs
            .iter()
            .find(|i| i.opcode == Opcode::Write && i.operands.first() == Some(&output))
    }

    /// Human-readable name for diagnostics
    pub fn value_name(&self, value: Value) -> String {
        match value {
            Value::Arg(id) => match self.args.get(id) {
                Some(arg) => arg.name.clone(),
                None => value.to_string(),
            },
            Value::Instr(id) => match self.instrs.get(id) {
                Some(instr) => format!("i{} ({})", id, instr.opcode),
                None => value.to_string(),
            },
        }
    }
}

/// Serialized form of a [`Program`], before validation
#[derive(Deserialize)]
struct RawProgram {
    name: String,
    args: Vec<Argument>,
    instrs: Vec<Instruction>,
    #[serde(default = "default_trip_count")]
    trip_count: u32,
}

fn default_trip_count() -> u32 {
    1
}

impl TryFrom<RawProgram> for Program {
    type Error = CompileError;

    fn try_from(raw: RawProgram) -> CompileResult<Self> {
        let mut program = Program::new(raw.name);
        program.trip_count = raw.trip_count;

        for arg in raw.args {
            program.add_arg(&arg.name, arg.width, arg.direction)?;
        }

        for instr in raw.instrs {
            let value = program.add_instr(instr.opcode, &instr.operands)?;
            if value != instr.value() {
                return Err(CompileError::invalid_operands(
                    format!("i{} ({})", instr.id, instr.opcode),
                    format!("listed at position {}", program.instrs.len() - 1),
                ));
            }
            if instr.latency > 0 {
                program.set_latency(value, instr.latency)?;
            }
        }

        Ok(program)
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "program {}", self.name)?;
        for (id, arg) in self.args.iter().enumerate() {
            writeln!(f, "  a{}: {}", id, arg)?;
        }
        for instr in &self.instrs {
            writeln!(f, "  {}", instr)?;
        }
        Ok(())
    }
}
