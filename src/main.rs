//! Mini HLS compiler CLI
//!
//! Usage:
//!   minihls program.hls
//!   minihls program.hls --json
//!   minihls --trace -v < program.hls

use clap::{ArgAction, Parser as ClapParser};
use colored::Colorize;
use std::fs;
use std::io::{self, Read};

use mini_hls::{compile, CompiledDesign, HlsConfig, RegisterRole};

#[derive(ClapParser, Debug)]
#[command(name = "minihls")]
#[command(author = "FPGA Team")]
#[command(version = "0.1.0")]
#[command(about = "Schedules dataflow programs into pipelined microarchitectures")]
struct Args {
    /// Program source file (reads stdin when omitted)
    #[arg(value_name = "FILE")]
    input_file: Option<String>,

    /// Read the configuration from a JSON file
    #[arg(short = 'c', long = "config")]
    config_file: Option<String>,

    /// Output the microarchitecture as JSON
    #[arg(short = 'j', long = "json")]
    json_output: bool,

    /// Print every scheduling decision
    #[arg(short = 't', long = "trace")]
    trace: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn fail(what: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", what.red(), err);
    std::process::exit(1);
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let source = if let Some(file) = &args.input_file {
        fs::read_to_string(file)
            .unwrap_or_else(|e| fail("Error", format!("Failed to read file '{}': {}", file, e)))
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .unwrap_or_else(|e| fail("Error", format!("Failed to read stdin: {}", e)));
        buffer
    };

    let config = match &args.config_file {
        Some(file) => {
            let text = fs::read_to_string(file)
                .unwrap_or_else(|e| fail("Error", format!("Failed to read config '{}': {}", file, e)));
            HlsConfig::from_json(&text).unwrap_or_else(|e| fail("Configuration error", e))
        }
        None => HlsConfig::default(),
    };

    let design = match compile(&source, &config) {
        Ok(design) => design,
        Err(e) if e.is_internal() => fail("Internal compiler error", e),
        Err(e) => fail("Compilation error", e),
    };

    if args.json_output {
        match design.microarchitecture.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => fail("Error", format!("Failed to serialize to JSON: {}", e)),
        }
    } else {
        print_design(&design, args.trace);
    }
}

fn print_design(design: &CompiledDesign, trace: bool) {
    let arch = &design.microarchitecture;

    println!("{}", "Compilation Results".bold().green());
    println!("{}", "=".repeat(50));
    println!();

    println!("{}: {}", "Program".cyan(), design.program.name);
    for port in &arch.ports {
        println!("  {}", port);
    }
    println!("{}: {}", "Stages".cyan(), arch.num_stages());
    println!("{}: {}", "Functional units".cyan(), arch.units().count());
    println!(
        "{}: {} pipeline, {} input capture, {} stage valid ({} bits)",
        "Registers".cyan(),
        arch.count_registers(RegisterRole::Pipeline),
        arch.count_registers(RegisterRole::InputCapture),
        arch.count_registers(RegisterRole::StageValid),
        arch.register_bits()
    );
    println!();

    println!("{}", "Schedule".bold().yellow());
    println!("{}", "-".repeat(50));
    for (value, start) in design.schedule.start_times() {
        let end = design.schedule.production_time(*value).unwrap_or(*start);
        println!(
            "  {:<20} start {:>3}  ready {:>3}",
            design.program.value_name(*value),
            start,
            end
        );
    }
    println!();

    println!("{}", "Units".bold().yellow());
    println!("{}", "-".repeat(50));
    for unit in arch.units() {
        let inputs: Vec<String> = unit.inputs.iter().map(|s| s.to_string()).collect();
        println!(
            "  i{} {} (latency {}, {} bits): [{}] -> {}",
            unit.instr,
            unit.opcode,
            unit.latency,
            unit.width,
            inputs.join(", "),
            unit.output
        );
    }
    for output in arch.outputs() {
        println!("  {} <- {}", output.port, output.driver);
    }
    println!("  done <- {}", arch.done);

    if trace {
        println!();
        println!("{}", "Scheduling Trace".bold().yellow());
        println!("{}", "-".repeat(50));
        for event in design.schedule.trace() {
            println!("  {}", event);
        }
    }
}
