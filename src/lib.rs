//! Miniature HLS backend
//!
//! This library takes a straight-line dataflow program and produces a
//! pipelined synchronous microarchitecture: an ASAP schedule, one functional
//! unit per operation, and the pipeline registers that keep every value
//! alive until its last use.
//!
//! # Example
//!
//! ```rust
//! use mini_hls::{compile, HlsConfig};
//!
//! let source = "
//!     program ab_add;
//!     input a : 32;
//!     input b : 32;
//!     output c : 32;
//!     s = add(a, b);
//!     write(c, s);
//! ";
//! let design = compile(source, &HlsConfig::default()).unwrap();
//! assert_eq!(design.schedule.num_stages(), 2);
//! println!("{}", design.microarchitecture);
//! ```

pub mod catalog;
pub mod codegen;
pub mod error;
pub mod hardware;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod schedule;

#[cfg(test)]
mod sim;

pub use catalog::{FunctionalUnitCatalog, UnitContract};
pub use codegen::{generate_microarchitecture, CodeGenerator, LiveRange};
pub use error::{CompileError, CompileResult};
pub use hardware::{HlsConfig, Microarchitecture, RegisterRole, SignalId, SignalKind};
pub use parser::Parser;
pub use program::{Argument, Direction, Instruction, Opcode, Program, Value};
pub use schedule::{asap_schedule, AsapScheduler, Schedule, ScheduleEvent};

/// A program together with its schedule and generated plan
#[derive(Debug, Clone)]
pub struct CompiledDesign {
    pub program: Program,
    pub schedule: Schedule,
    pub microarchitecture: Microarchitecture,
}

/// Schedule a built program and generate its microarchitecture
pub fn compile_program(
    program: Program,
    config: &HlsConfig,
    catalog: &FunctionalUnitCatalog,
) -> CompileResult<CompiledDesign> {
    config.validate()?;

    let schedule = AsapScheduler::new(config.clone()).schedule(&program)?;
    let microarchitecture = CodeGenerator::new(catalog.clone()).generate(&program, &schedule)?;

    Ok(CompiledDesign {
        program,
        schedule,
        microarchitecture,
    })
}

/// Main compilation function: parse a program source and compile it with
/// the standard functional unit catalog
pub fn compile(source: &str, config: &HlsConfig) -> CompileResult<CompiledDesign> {
    let catalog = FunctionalUnitCatalog::standard();
    let program = Parser::new(source).with_catalog(&catalog).parse_program()?;
    compile_program(program, config, &catalog)
}
