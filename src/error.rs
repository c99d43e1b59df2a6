//! Error types for the HLS backend

use thiserror::Error;

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Compilation errors
///
/// Everything here is detected while compiling a program; none of it can
/// happen at runtime of the generated hardware.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Lexer error at position {position}: {message}")]
    LexerError { position: usize, message: String },

    #[error("Parser error: {message}")]
    ParseError { message: String },

    #[error("Undefined value: {name}")]
    UndefinedValue { name: String },

    #[error("Invalid operands for {instr}: {message}")]
    InvalidOperands { instr: String, message: String },

    #[error("Duplicate port name: {name}")]
    DuplicatePort { name: String },

    #[error("Port `{name}` is {width} bits wide, expected 1 to 64")]
    InvalidWidth { name: String, width: u32 },

    #[error("Value {value} is never used")]
    UnusedValue { value: String },

    #[error("Program cannot be scheduled, stuck on: {}", pending.join(", "))]
    UnschedulableProgram { pending: Vec<String> },

    #[error("Unsupported operation `{opcode}` in {instr}")]
    UnsupportedOperation { opcode: String, instr: String },

    #[error("Latency mismatch for {instr}: declared {declared}, but `{opcode}` units take {unit}")]
    LatencyMismatch {
        instr: String,
        opcode: String,
        declared: u32,
        unit: u32,
    },

    #[error("Output `{name}` is never written")]
    UndrivenOutput { name: String },

    #[error("Output `{name}` is written more than once")]
    MultiplyDrivenOutput { name: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Internal error: no availability for {value} at stage {stage}")]
    MissingAvailability { value: String, stage: u32 },
}

impl CompileError {
    pub fn parse_error(msg: impl Into<String>) -> Self {
        CompileError::ParseError { message: msg.into() }
    }

    pub fn undefined(name: impl Into<String>) -> Self {
        CompileError::UndefinedValue { name: name.into() }
    }

    pub fn invalid_operands(instr: impl Into<String>, msg: impl Into<String>) -> Self {
        CompileError::InvalidOperands {
            instr: instr.into(),
            message: msg.into(),
        }
    }

    pub fn unused(value: impl Into<String>) -> Self {
        CompileError::UnusedValue { value: value.into() }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        CompileError::InvalidConfig { message: msg.into() }
    }

    /// True for generator defects, as opposed to problems with the input program
    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::MissingAvailability { .. })
    }
}
