//! Example: Compiling Program Sources
//!
//! Compiles the sample programs under `demos/` and shows how each kind of
//! error is reported.
//!
//! Run with: cargo run --example from_source

use mini_hls::{compile, HlsConfig};

const SAMPLES: [(&str, &str); 3] = [
    ("passthrough", include_str!("passthrough.hls")),
    ("pipelined_mul", include_str!("pipelined_mul.hls")),
    ("mac_chain", include_str!("mac_chain.hls")),
];

const BROKEN: [(&str, &str); 3] = [
    (
        "unused value",
        "input a : 8; output o : 8; s = add(a, a); t = xor(a, a); write(o, s);",
    ),
    (
        "undriven output",
        "input a : 8; output o : 8; output p : 8; write(o, a);",
    ),
    ("undefined name", "input a : 8; output o : 8; write(o, b);"),
];

fn main() {
    println!("=== Program Source Example ===\n");

    let config = HlsConfig::default();

    for (name, source) in SAMPLES {
        let design = compile(source, &config).unwrap();
        println!(
            "{}: {} stages, {} units",
            name,
            design.microarchitecture.num_stages(),
            design.microarchitecture.units().count()
        );
    }
    println!();

    for (what, source) in BROKEN {
        match compile(source, &config) {
            Ok(_) => println!("{}: unexpectedly compiled", what),
            Err(e) => println!("{}: {}", what, e),
        }
    }
}
