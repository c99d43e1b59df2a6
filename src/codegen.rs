//! Microarchitecture generator
//!
//! Turns a scheduled program into a pipelined plan:
//!
//! 1. a stage-active shift register, one link per stage
//! 2. a capture register per input port, loaded on `start`
//! 3. one dedicated functional unit per value-producing instruction
//! 4. pipeline registers carrying every value from its production time to
//!    its last use
//! 5. wiring of operands (as seen at each instruction's start time) into
//!    unit ports and output ports
//! 6. `done`, tied to the last stage

use std::collections::BTreeMap;

use log::{debug, trace};

use crate::catalog::{FunctionalUnitCatalog, UnitContract};
use crate::error::{CompileError, CompileResult};
use crate::hardware::{FunctionalUnit, Microarchitecture, OutputBinding, RegisterRole, SignalKind};
use crate::program::{Opcode, Program, Value};
use crate::schedule::Schedule;

/// Liveness window of a value, in stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub production: u32,
    pub last_use: u32,
}

/// Generator for pipelined microarchitectures
pub struct CodeGenerator {
    catalog: FunctionalUnitCatalog,
}

impl CodeGenerator {
    pub fn new(catalog: FunctionalUnitCatalog) -> Self {
        Self { catalog }
    }

    /// Generate the plan for a scheduled program
    ///
    /// Every check that can reject the program runs before the first signal
    /// is created, so a failing program never yields a partial plan.
    pub fn generate(
        &self,
        program: &Program,
        schedule: &Schedule,
    ) -> CompileResult<Microarchitecture> {
        let live_ranges = self.live_ranges(program, schedule)?;
        let contracts = self.bind_contracts(program)?;
        self.check_outputs(program)?;

        let mut arch = Microarchitecture::new(program.name.clone(), program.args().to_vec());

        let num_stages = schedule.num_stages();
        self.build_stage_chain(&mut arch, num_stages);
        self.capture_inputs(&mut arch, program, &live_ranges);
        self.instantiate_units(&mut arch, program, &live_ranges, &contracts);
        self.insert_pipeline_registers(&mut arch, program, &live_ranges)?;
        self.wire(&mut arch, program, schedule, &contracts)?;

        arch.done = arch.stage_active()[arch.num_stages() - 1];

        debug!(
            "generated `{}`: {} stages, {} units, {} pipeline registers",
            arch.name,
            arch.num_stages(),
            arch.units().count(),
            arch.count_registers(RegisterRole::Pipeline)
        );
        Ok(arch)
    }

    /// Production and last-use time of every value that carries data
    pub fn live_ranges(
        &self,
        program: &Program,
        schedule: &Schedule,
    ) -> CompileResult<BTreeMap<Value, LiveRange>> {
        let mut ranges = BTreeMap::new();

        for value in program.produced_values() {
            let production = schedule.production_time(value).ok_or_else(|| {
                CompileError::UnschedulableProgram {
                    pending: vec![program.value_name(value)],
                }
            })?;
            let last_use = schedule.last_use_time(program, value)?;
            trace!("{} is live over [{}, {}]", value, production, last_use);
            ranges.insert(value, LiveRange { production, last_use });
        }

        Ok(ranges)
    }

    /// Look up the unit contract of every value-producing instruction
    fn bind_contracts(&self, program: &Program) -> CompileResult<BTreeMap<usize, UnitContract>> {
        let mut contracts = BTreeMap::new();

        for instr in program.instrs().iter().filter(|i| i.has_output()) {
            let contract = self.catalog.lookup(instr.opcode).copied().ok_or_else(|| {
                CompileError::UnsupportedOperation {
                    opcode: instr.opcode.to_string(),
                    instr: instr.to_string(),
                }
            })?;

            if contract.latency != instr.latency {
                return Err(CompileError::LatencyMismatch {
                    instr: instr.to_string(),
                    opcode: instr.opcode.to_string(),
                    declared: instr.latency,
                    unit: contract.latency,
                });
            }

            if contract.input_arity != instr.operands.len() || contract.output_arity != 1 {
                return Err(CompileError::invalid_operands(
                    instr.to_string(),
                    format!(
                        "`{}` units take {} inputs and {} outputs",
                        instr.opcode, contract.input_arity, contract.output_arity
                    ),
                ));
            }

            contracts.insert(instr.id, contract);
        }

        Ok(contracts)
    }

    fn check_outputs(&self, program: &Program) -> CompileResult<()> {
        for (value, arg) in program.outputs() {
            if program.writer_of(value).is_none() {
                return Err(CompileError::UndrivenOutput {
                    name: arg.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Stage 0 is `start`; stage s is stage s - 1 delayed by one register
    fn build_stage_chain(&self, arch: &mut Microarchitecture, num_stages: u32) {
        arch.push_stage(arch.start);

        let mut prev = arch.start;
        for stage in 1..num_stages {
            let reg = arch.add_register(
                format!("stage_{}", stage),
                1,
                prev,
                None,
                RegisterRole::StageValid,
            );
            arch.push_stage(reg);
            prev = reg;
        }
    }

    fn capture_inputs(
        &self,
        arch: &mut Microarchitecture,
        program: &Program,
        live_ranges: &BTreeMap<Value, LiveRange>,
    ) {
        let start = arch.start;

        for (value, arg) in program.inputs() {
            let port = arch.add_signal(
                arg.name.clone(),
                arg.width,
                SignalKind::Input {
                    port: arg.name.clone(),
                },
            );
            let reg = arch.add_register(
                format!("{}_in", arg.name),
                arg.width,
                port,
                Some(start),
                RegisterRole::InputCapture,
            );
            arch.set_available(value, live_ranges[&value].production, reg);
        }
    }

    /// One unit per instruction, no sharing
    fn instantiate_units(
        &self,
        arch: &mut Microarchitecture,
        program: &Program,
        live_ranges: &BTreeMap<Value, LiveRange>,
        contracts: &BTreeMap<usize, UnitContract>,
    ) {
        for instr in program.instrs().iter().filter(|i| i.has_output()) {
            let value = instr.value();
            let output = arch.add_signal(
                format!("i{}_{}", instr.id, instr.opcode),
                instr.width,
                SignalKind::UnitOutput { instr: instr.id },
            );

            arch.bind_unit(FunctionalUnit {
                instr: instr.id,
                opcode: instr.opcode,
                latency: contracts[&instr.id].latency,
                width: instr.width,
                inputs: Vec::new(),
                output,
            });
            arch.set_available(value, live_ranges[&value].production, output);
        }
    }

    /// Exactly one register per stage after production, up to the last use
    fn insert_pipeline_registers(
        &self,
        arch: &mut Microarchitecture,
        program: &Program,
        live_ranges: &BTreeMap<Value, LiveRange>,
    ) -> CompileResult<()> {
        for (&value, range) in live_ranges {
            let width = program.width(value);
            let mut prev = arch.wire_at(value, range.production)?;

            for stage in range.production + 1..=range.last_use {
                trace!("carrying {} into stage {}", value, stage);
                let reg = arch.add_register(
                    format!("{}_s{}", value, stage),
                    width,
                    prev,
                    None,
                    RegisterRole::Pipeline,
                );
                arch.set_available(value, stage, reg);
                prev = reg;
            }
        }
        Ok(())
    }

    /// Connect operands, as seen at each instruction's start time
    fn wire(
        &self,
        arch: &mut Microarchitecture,
        program: &Program,
        schedule: &Schedule,
        contracts: &BTreeMap<usize, UnitContract>,
    ) -> CompileResult<()> {
        for instr in program.instrs() {
            let value = instr.value();
            let start = schedule
                .start_time(value)
                .ok_or_else(|| CompileError::UnschedulableProgram {
                    pending: vec![program.value_name(value)],
                })?;

            if instr.opcode == Opcode::Write {
                let [target, source] = instr.operands[..] else {
                    return Err(CompileError::invalid_operands(
                        instr.to_string(),
                        "sinks take a port and a value",
                    ));
                };
                let driver = arch.wire_at(source, start)?;
                let port = match target {
                    Value::Arg(id) => program.arg(id),
                    Value::Instr(_) => None,
                };
                let port = port.ok_or_else(|| {
                    CompileError::invalid_operands(instr.to_string(), "sink target is not a port")
                })?;

                trace!("output {} <- {} at stage {}", port.name, driver, start);
                arch.bind_output(OutputBinding {
                    port: port.name.clone(),
                    width: port.width,
                    driver,
                });
                continue;
            }

            debug_assert!(contracts.contains_key(&instr.id));
            let inputs = instr
                .operands
                .iter()
                .map(|operand| arch.wire_at(*operand, start))
                .collect::<CompileResult<Vec<_>>>()?;

            match arch.unit_mut(instr.id) {
                Some(unit) => unit.inputs = inputs,
                None => {
                    return Err(CompileError::MissingAvailability {
                        value: value.to_string(),
                        stage: start,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Generate a microarchitecture for a scheduled program
pub fn generate_microarchitecture(
    program: &Program,
    schedule: &Schedule,
    catalog: &FunctionalUnitCatalog,
) -> CompileResult<Microarchitecture> {
    CodeGenerator::new(catalog.clone()).generate(program, schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::asap_schedule;
    use pretty_assertions::assert_eq;

    fn generate(program: &Program) -> CompileResult<Microarchitecture> {
        let schedule = asap_schedule(program)?;
        generate_microarchitecture(program, &schedule, &FunctionalUnitCatalog::standard())
    }

    fn pipelined_mul() -> Program {
        let mut prog = Program::new("pipelined_mul");
        let a = prog.add_input("a", 32).unwrap();
        let b = prog.add_input("b", 32).unwrap();
        let f = prog.add_input("f", 32).unwrap();
        let c = prog.add_output("c", 32).unwrap();
        let m = prog.add_instr(Opcode::MulPipelined, &[a, b]).unwrap();
        prog.set_latency(m, 1).unwrap();
        let s = prog.add_instr(Opcode::Add, &[m, f]).unwrap();
        prog.add_instr(Opcode::Write, &[c, s]).unwrap();
        prog
    }

    #[test]
    fn test_stage_chain() {
        let arch = generate(&pipelined_mul()).unwrap();

        assert_eq!(arch.num_stages(), 3);
        assert_eq!(arch.stage_active()[0], arch.start);
        for pair in arch.stage_active().windows(2) {
            let next = arch.signal(pair[1]).unwrap();
            match &next.kind {
                SignalKind::Register { d, enable, role } => {
                    assert_eq!(*d, pair[0]);
                    assert_eq!(*enable, None);
                    assert_eq!(*role, RegisterRole::StageValid);
                }
                other => panic!("stage link is not a register: {:?}", other),
            }
        }
        assert_eq!(arch.done, arch.stage_active()[2]);
    }

    #[test]
    fn test_pipeline_register_for_bypassed_value() {
        let prog = pipelined_mul();
        let arch = generate(&prog).unwrap();
        let f = Value::Arg(2);

        // `f` is captured at stage 1 and carried across the multiplier's stage
        let stages: Vec<u32> = arch.availability(f).unwrap().keys().copied().collect();
        assert_eq!(stages, vec![1, 2]);
        assert_eq!(arch.count_registers(RegisterRole::Pipeline), 1);
        assert_eq!(arch.count_registers(RegisterRole::InputCapture), 3);

        let carried = arch.signal(arch.wire_at(f, 2).unwrap()).unwrap();
        match &carried.kind {
            SignalKind::Register { d, role, .. } => {
                assert_eq!(*d, arch.wire_at(f, 1).unwrap());
                assert_eq!(*role, RegisterRole::Pipeline);
            }
            other => panic!("expected a pipeline register, got {:?}", other),
        }
    }

    #[test]
    fn test_liveness_completeness() {
        let prog = pipelined_mul();
        let schedule = asap_schedule(&prog).unwrap();
        let generator = CodeGenerator::new(FunctionalUnitCatalog::standard());
        let arch = generator.generate(&prog, &schedule).unwrap();

        for (value, range) in generator.live_ranges(&prog, &schedule).unwrap() {
            let stages: Vec<u32> = arch.availability(value).unwrap().keys().copied().collect();
            let expected: Vec<u32> = (range.production..=range.last_use).collect();
            assert_eq!(stages, expected, "gap in availability of {}", value);
        }
    }

    #[test]
    fn test_unit_wiring() {
        let prog = pipelined_mul();
        let arch = generate(&prog).unwrap();

        let mul = arch.unit(0).unwrap();
        assert_eq!(mul.opcode, Opcode::MulPipelined);
        assert_eq!(mul.latency, 1);
        assert_eq!(
            mul.inputs,
            vec![
                arch.wire_at(Value::Arg(0), 1).unwrap(),
                arch.wire_at(Value::Arg(1), 1).unwrap(),
            ]
        );

        let add = arch.unit(1).unwrap();
        assert_eq!(
            add.inputs,
            vec![mul.output, arch.wire_at(Value::Arg(2), 2).unwrap()]
        );

        let out = arch.output("c").unwrap();
        assert_eq!(out.driver, add.output);
        assert!(arch.unit(2).is_none());
    }

    #[test]
    fn test_passthrough() {
        let mut prog = Program::new("inout_test");
        let x = prog.add_input("input_val", 1).unwrap();
        let y = prog.add_output("out", 1).unwrap();
        prog.add_instr(Opcode::Write, &[y, x]).unwrap();

        let arch = generate(&prog).unwrap();
        assert_eq!(arch.num_stages(), 2);
        assert_eq!(arch.units().count(), 0);
        assert_eq!(arch.output("out").unwrap().driver, arch.wire_at(x, 1).unwrap());
    }

    #[test]
    fn test_unused_value_rejected() {
        let mut prog = Program::new("dangling");
        let a = prog.add_input("a", 8).unwrap();
        let b = prog.add_input("b", 8).unwrap();
        let out = prog.add_output("out", 8).unwrap();
        let sum = prog.add_instr(Opcode::Add, &[a, b]).unwrap();
        prog.add_instr(Opcode::Add, &[sum, b]).unwrap();
        prog.add_instr(Opcode::Write, &[out, sum]).unwrap();

        let err = generate(&prog).unwrap_err();
        assert_eq!(err, CompileError::unused("i1 (add)"));
        assert!(!err.is_internal());
    }

    #[test]
    fn test_unused_input_rejected() {
        let mut prog = Program::new("spare_input");
        let a = prog.add_input("a", 8).unwrap();
        prog.add_input("b", 8).unwrap();
        let out = prog.add_output("out", 8).unwrap();
        prog.add_instr(Opcode::Write, &[out, a]).unwrap();

        let err = generate(&prog).unwrap_err();
        assert_eq!(err, CompileError::unused("b"));
    }

    #[test]
    fn test_unsupported_operation() {
        let prog = pipelined_mul();
        let schedule = asap_schedule(&prog).unwrap();
        let catalog = FunctionalUnitCatalog::new().with_unit(
            Opcode::Add,
            *FunctionalUnitCatalog::standard().lookup(Opcode::Add).unwrap(),
        );

        let err = generate_microarchitecture(&prog, &schedule, &catalog).unwrap_err();
        match err {
            CompileError::UnsupportedOperation { opcode, instr } => {
                assert_eq!(opcode, "mul_pipelined");
                assert!(instr.starts_with("i0 "));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_latency_mismatch() {
        let mut prog = pipelined_mul();
        prog.set_latency(Value::Instr(0), 0).unwrap();

        let err = generate(&prog).unwrap_err();
        assert!(matches!(
            err,
            CompileError::LatencyMismatch {
                declared: 0,
                unit: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_custom_unit_latency() {
        fn sat_add(a: u64, b: u64, width: u32) -> u64 {
            let max = crate::catalog::mask(u64::MAX, width);
            a.saturating_add(b).min(max)
        }

        let mut prog = Program::new("slow_add");
        let a = prog.add_input("a", 8).unwrap();
        let b = prog.add_input("b", 8).unwrap();
        let out = prog.add_output("out", 8).unwrap();
        let sum = prog.add_instr(Opcode::Add, &[a, b]).unwrap();
        prog.set_latency(sum, 2).unwrap();
        prog.add_instr(Opcode::Write, &[out, sum]).unwrap();

        let catalog =
            FunctionalUnitCatalog::new().with_unit(Opcode::Add, UnitContract::binary(2, sat_add));
        let schedule = asap_schedule(&prog).unwrap();
        let arch = generate_microarchitecture(&prog, &schedule, &catalog).unwrap();

        assert_eq!(arch.num_stages(), 4);
        assert_eq!(arch.unit(0).unwrap().latency, 2);
        assert_eq!(arch.output("out").unwrap().driver, arch.unit(0).unwrap().output);
    }

    #[test]
    fn test_undriven_output() {
        let mut prog = Program::new("undriven");
        let a = prog.add_input("a", 8).unwrap();
        let out = prog.add_output("out", 8).unwrap();
        prog.add_output("spare", 8).unwrap();
        prog.add_instr(Opcode::Write, &[out, a]).unwrap();

        let err = generate(&prog).unwrap_err();
        assert_eq!(err, CompileError::UndrivenOutput { name: "spare".to_string() });
    }

    #[test]
    fn test_long_live_range() {
        // `a` feeds both the head and the tail of a multi-cycle chain
        let mut prog = Program::new("long_range");
        let a = prog.add_input("a", 16).unwrap();
        let out = prog.add_output("out", 16).unwrap();
        let m1 = prog.add_instr(Opcode::MulPipelined, &[a, a]).unwrap();
        prog.set_latency(m1, 1).unwrap();
        let m2 = prog.add_instr(Opcode::MulPipelined, &[m1, m1]).unwrap();
        prog.set_latency(m2, 1).unwrap();
        let s = prog.add_instr(Opcode::Add, &[m2, a]).unwrap();
        prog.add_instr(Opcode::Write, &[out, s]).unwrap();

        let arch = generate(&prog).unwrap();
        let stages: Vec<u32> = arch.availability(a).unwrap().keys().copied().collect();
        assert_eq!(stages, vec![1, 2, 3]);
        assert_eq!(arch.count_registers(RegisterRole::Pipeline), 2);
        assert_eq!(arch.num_stages(), 4);
    }
}
