//! Example: Pipelined Multiplier
//!
//! `c = a * b + f` with a one-cycle multiplier. The input `f` has to be
//! carried across the multiplier's stage by an inserted pipeline register.
//!
//! Run with: cargo run --example pipelined_mul

use mini_hls::{compile_program, FunctionalUnitCatalog, HlsConfig, Opcode, Program, RegisterRole};

fn main() {
    println!("=== Pipelined Multiplier Example ===\n");

    let mut prog = Program::new("pipelined_mul");
    let a = prog.add_input("a", 32).unwrap();
    let b = prog.add_input("b", 32).unwrap();
    let f = prog.add_input("f", 32).unwrap();
    let c = prog.add_output("c", 32).unwrap();
    let m = prog.add_instr(Opcode::MulPipelined, &[a, b]).unwrap();
    prog.set_latency(m, 1).unwrap();
    let s = prog.add_instr(Opcode::Add, &[m, f]).unwrap();
    prog.add_instr(Opcode::Write, &[c, s]).unwrap();

    let catalog = FunctionalUnitCatalog::standard();
    let design = compile_program(prog, &HlsConfig::default(), &catalog).unwrap();

    println!("Schedule:");
    println!("{}", design.schedule);

    let arch = &design.microarchitecture;
    println!("Live ranges (stage -> signal):");
    for value in design.program.produced_values() {
        let stages = arch.availability(value).unwrap();
        println!("  {:<16} {:?}", design.program.value_name(value), stages);
    }
    println!();

    println!(
        "Pipeline registers inserted: {}",
        arch.count_registers(RegisterRole::Pipeline)
    );
    println!("`done` follows `start` by {} cycles", arch.num_stages() - 1);
    println!();

    println!("JSON plan:");
    println!("{}", arch.to_json().unwrap());
}
