//! Microarchitecture plan handed to a netlist backend
//!
//! The plan is an abstract netlist: every wire, register and unit output is
//! a [`Signal`] addressed by an opaque [`SignalId`]. A backend walks the
//! signals and units and materializes them in its own representation; the
//! core never depends on how it does that.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::program::{Argument, Opcode, Value};

/// Configuration for scheduling and generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HlsConfig {
    /// Cycles between successive pipeline starts (only 1 is supported)
    pub initiation_interval: u32,
    /// Upper bound on simulated scheduling time
    pub max_cycles: u32,
}

impl HlsConfig {
    pub fn new(initiation_interval: u32, max_cycles: u32) -> Self {
        Self {
            initiation_interval,
            max_cycles,
        }
    }

    pub fn from_json(source: &str) -> CompileResult<Self> {
        serde_json::from_str(source).map_err(|e| CompileError::invalid_config(e.to_string()))
    }

    pub fn validate(&self) -> CompileResult<()> {
        if self.initiation_interval != 1 {
            return Err(CompileError::invalid_config(format!(
                "initiation interval must be 1, got {}",
                self.initiation_interval
            )));
        }
        if self.max_cycles == 0 {
            return Err(CompileError::invalid_config("max_cycles must be positive"));
        }
        Ok(())
    }
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self::new(1, 4096)
    }
}

/// Opaque handle to a signal in the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SignalId(pub usize);

impl std::fmt::Display for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Why a register exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterRole {
    /// Link of the stage-active chain
    StageValid,
    /// Captures an input port when `start` fires
    InputCapture,
    /// Carries a live value into the next stage
    Pipeline,
}

/// What drives a signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalKind {
    /// External start strobe
    Start,
    /// External input port
    Input { port: String },
    /// Clocked register; loads `d` every cycle, or only when `enable` is high
    Register {
        d: SignalId,
        enable: Option<SignalId>,
        role: RegisterRole,
    },
    /// Result port of the unit bound to an instruction
    UnitOutput { instr: usize },
}

/// A wire or register output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signal {
    pub id: SignalId,
    pub name: String,
    pub width: u32,
    #[serde(flatten)]
    pub kind: SignalKind,
}

impl Signal {
    pub fn is_register(&self) -> bool {
        matches!(self.kind, SignalKind::Register { .. })
    }

    pub fn register_role(&self) -> Option<RegisterRole> {
        match self.kind {
            SignalKind::Register { role, .. } => Some(role),
            _ => None,
        }
    }
}

/// A functional unit instance, dedicated to one instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionalUnit {
    pub instr: usize,
    pub opcode: Opcode,
    pub latency: u32,
    pub width: u32,
    /// Operand signals, in port order
    pub inputs: Vec<SignalId>,
    pub output: SignalId,
}

/// An external output port and the signal driving it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputBinding {
    pub port: String,
    pub width: u32,
    pub driver: SignalId,
}

/// A generated pipelined microarchitecture
#[derive(Debug, Clone, Serialize)]
pub struct Microarchitecture {
    pub name: String,
    /// Program ports in declaration order
    pub ports: Vec<Argument>,
    pub start: SignalId,
    pub done: SignalId,
    signals: Vec<Signal>,
    stage_active: Vec<SignalId>,
    unit_binding: BTreeMap<usize, FunctionalUnit>,
    availability: BTreeMap<Value, BTreeMap<u32, SignalId>>,
    outputs: Vec<OutputBinding>,
}

impl Microarchitecture {
    pub fn new(name: impl Into<String>, ports: Vec<Argument>) -> Self {
        let start = Signal {
            id: SignalId(0),
            name: "start".to_string(),
            width: 1,
            kind: SignalKind::Start,
        };

        Self {
            name: name.into(),
            ports,
            start: start.id,
            done: start.id,
            signals: vec![start],
            stage_active: Vec::new(),
            unit_binding: BTreeMap::new(),
            availability: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }

    pub(crate) fn add_signal(&mut self, name: String, width: u32, kind: SignalKind) -> SignalId {
        let id = SignalId(self.signals.len());
        self.signals.push(Signal {
            id,
            name,
            width,
            kind,
        });
        id
    }

    pub(crate) fn add_register(
        &mut self,
        name: String,
        width: u32,
        d: SignalId,
        enable: Option<SignalId>,
        role: RegisterRole,
    ) -> SignalId {
        self.add_signal(name, width, SignalKind::Register { d, enable, role })
    }

    pub(crate) fn push_stage(&mut self, signal: SignalId) {
        self.stage_active.push(signal);
    }

    pub(crate) fn bind_unit(&mut self, unit: FunctionalUnit) {
        self.unit_binding.insert(unit.instr, unit);
    }

    pub(crate) fn unit_mut(&mut self, instr: usize) -> Option<&mut FunctionalUnit> {
        self.unit_binding.get_mut(&instr)
    }

    pub(crate) fn set_available(&mut self, value: Value, stage: u32, signal: SignalId) {
        self.availability.entry(value).or_default().insert(stage, signal);
    }

    pub(crate) fn bind_output(&mut self, binding: OutputBinding) {
        self.outputs.push(binding);
    }

    pub fn signal(&self, id: SignalId) -> Option<&Signal> {
        self.signals.get(id.0)
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// Stage-active chain; entry 0 is `start`
    pub fn stage_active(&self) -> &[SignalId] {
        &self.stage_active
    }

    pub fn num_stages(&self) -> usize {
        self.stage_active.len()
    }

    pub fn units(&self) -> impl Iterator<Item = &FunctionalUnit> {
        self.unit_binding.values()
    }

    pub fn unit(&self, instr: usize) -> Option<&FunctionalUnit> {
        self.unit_binding.get(&instr)
    }

    pub fn availability(&self, value: Value) -> Option<&BTreeMap<u32, SignalId>> {
        self.availability.get(&value)
    }

    /// Signal holding `value` during `stage`
    pub fn wire_at(&self, value: Value, stage: u32) -> CompileResult<SignalId> {
        self.availability
            .get(&value)
            .and_then(|stages| stages.get(&stage))
            .copied()
            .ok_or_else(|| CompileError::MissingAvailability {
                value: value.to_string(),
                stage,
            })
    }

    pub fn outputs(&self) -> &[OutputBinding] {
        &self.outputs
    }

    pub fn output(&self, port: &str) -> Option<&OutputBinding> {
        self.outputs.iter().find(|o| o.port == port)
    }

    pub fn count_registers(&self, role: RegisterRole) -> usize {
        self.signals
            .iter()
            .filter(|s| s.register_role() == Some(role))
            .count()
    }

    /// Total flip-flop bits across all registers
    pub fn register_bits(&self) -> u64 {
        self.signals
            .iter()
            .filter(|s| s.is_register())
            .map(|s| u64::from(s.width))
            .sum()
    }

    /// Export to JSON format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for Microarchitecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Microarchitecture `{}`", self.name)?;
        writeln!(f, "================")?;
        writeln!(f, "Stages: {}", self.num_stages())?;
        writeln!(f, "Units: {}", self.unit_binding.len())?;
        writeln!(
            f,
            "Registers: {} pipeline, {} input capture, {} stage valid ({} bits)",
            self.count_registers(RegisterRole::Pipeline),
            self.count_registers(RegisterRole::InputCapture),
            self.count_registers(RegisterRole::StageValid),
            self.register_bits()
        )?;
        writeln!(f)?;

        writeln!(f, "Ports:")?;
        for port in &self.ports {
            writeln!(f, "  {}", port)?;
        }
        writeln!(f)?;

        for unit in self.unit_binding.values() {
            let inputs: Vec<String> = unit.inputs.iter().map(|s| s.to_string()).collect();
            writeln!(
                f,
                "Unit i{}: {} (latency {}, {} bits) [{}] -> {}",
                unit.instr,
                unit.opcode,
                unit.latency,
                unit.width,
                inputs.join(", "),
                unit.output
            )?;
        }

        for (value, stages) in &self.availability {
            let entries: Vec<String> = stages
                .iter()
                .map(|(stage, signal)| format!("{}:{}", stage, signal))
                .collect();
            writeln!(f, "Value {}: {}", value, entries.join(" "))?;
        }

        for output in &self.outputs {
            writeln!(f, "Output {} <- {}", output.port, output.driver)?;
        }
        writeln!(f, "done <- {}", self.done)
    }
}
