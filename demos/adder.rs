//! Example: Combinational Adder
//!
//! Builds `c = a + b` through the library API and walks the generated plan.
//!
//! Run with: cargo run --example adder

use mini_hls::{
    asap_schedule, generate_microarchitecture, FunctionalUnitCatalog, Opcode, Program,
};

fn main() {
    println!("=== Combinational Adder Example ===\n");

    let mut prog = Program::new("ab_add");
    let a = prog.add_input("a", 32).unwrap();
    let b = prog.add_input("b", 32).unwrap();
    let c = prog.add_output("c", 32).unwrap();
    let sum = prog.add_instr(Opcode::Add, &[a, b]).unwrap();
    prog.add_instr(Opcode::Write, &[c, sum]).unwrap();

    println!("{}", prog);

    let schedule = asap_schedule(&prog).unwrap();
    println!("Schedule:");
    println!("{}", schedule);

    let catalog = FunctionalUnitCatalog::standard();
    let arch = generate_microarchitecture(&prog, &schedule, &catalog).unwrap();

    // Inputs are captured at stage 1 and the add is combinational,
    // so `done` rises one cycle after `start`.
    println!("Stages: {}", arch.num_stages());
    for signal in arch.signals() {
        println!("  {} {:<10} {:>2} bits  {:?}", signal.id, signal.name, signal.width, signal.kind);
    }
    println!();
    println!("{}", arch);
}
