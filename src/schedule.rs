//! ASAP scheduling under unlimited resources
//!
//! The scheduler simulates time cycle by cycle. At every step it first
//! retires values whose latency has elapsed, then repeatedly scans the
//! unscheduled instructions (in program order) and starts every one whose
//! operands are all done. Zero-latency instructions finish in the step they
//! start, so combinational chains resolve within a single cycle.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};
use serde::Serialize;

use crate::error::{CompileError, CompileResult};
use crate::hardware::HlsConfig;
use crate::program::{Program, Value};

/// One scheduling decision, in the order the scheduler made it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScheduleEvent {
    /// The value started computing
    Started { value: Value, time: u32 },
    /// The value reached its production time
    Completed { value: Value, time: u32 },
}

impl std::fmt::Display for ScheduleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleEvent::Started { value, time } => {
                write!(f, "[{:>3}] start    {}", time, value)
            }
            ScheduleEvent::Completed { value, time } => {
                write!(f, "[{:>3}] complete {}", time, value)
            }
        }
    }
}

/// Start and production cycle of every scheduled value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    start_time: BTreeMap<Value, u32>,
    end_time: BTreeMap<Value, u32>,
    #[serde(skip)]
    trace: Vec<ScheduleEvent>,
}

impl Schedule {
    /// Cycle at which the value starts computing
    pub fn start_time(&self, value: Value) -> Option<u32> {
        self.start_time.get(&value).copied()
    }

    /// Cycle at which the value is available to consumers
    pub fn production_time(&self, value: Value) -> Option<u32> {
        self.end_time.get(&value).copied()
    }

    pub fn start_times(&self) -> &BTreeMap<Value, u32> {
        &self.start_time
    }

    pub fn end_times(&self) -> &BTreeMap<Value, u32> {
        &self.end_time
    }

    /// Scheduling decisions in the order they were made
    pub fn trace(&self) -> &[ScheduleEvent] {
        &self.trace
    }

    /// Pipeline depth: one stage per cycle up to the last production
    pub fn num_stages(&self) -> u32 {
        self.end_time.values().copied().max().unwrap_or(0) + 1
    }

    /// Latest start time among the instructions that consume `value`
    pub fn last_use_time(&self, program: &Program, value: Value) -> CompileResult<u32> {
        program
            .users(value)
            .filter_map(|user| self.start_time(user.value()))
            .max()
            .ok_or_else(|| CompileError::unused(program.value_name(value)))
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:<8} {:>6} {:>6}", "value", "start", "end")?;
        for (value, start) in &self.start_time {
            match self.end_time.get(value) {
                Some(end) => writeln!(f, "{:<8} {:>6} {:>6}", value.to_string(), start, end)?,
                None => writeln!(f, "{:<8} {:>6} {:>6}", value.to_string(), start, "-")?,
            }
        }
        writeln!(f, "stages: {}", self.num_stages())
    }
}

/// As-soon-as-possible list scheduler
pub struct AsapScheduler {
    config: HlsConfig,
    start_time: BTreeMap<Value, u32>,
    end_time: BTreeMap<Value, u32>,
    trace: Vec<ScheduleEvent>,
}

impl AsapScheduler {
    pub fn new(config: HlsConfig) -> Self {
        Self {
            config,
            start_time: BTreeMap::new(),
            end_time: BTreeMap::new(),
            trace: Vec::new(),
        }
    }

    fn start(&mut self, value: Value, time: u32) {
        trace!("starting {} at {}", value, time);
        self.start_time.insert(value, time);
        self.trace.push(ScheduleEvent::Started { value, time });
    }

    fn complete(&mut self, value: Value, time: u32, done: &mut BTreeSet<Value>) {
        trace!("{} completes at {}", value, time);
        self.end_time.insert(value, time);
        self.trace.push(ScheduleEvent::Completed { value, time });
        done.insert(value);
    }

    /// Schedule a complete program
    pub fn schedule(mut self, program: &Program) -> CompileResult<Schedule> {
        self.config.validate()?;
        debug!(
            "scheduling `{}`: {} arguments, {} instructions",
            program.name,
            program.args().len(),
            program.instrs().len()
        );

        // In-flight values and the cycle each one completes
        let mut active: Vec<(Value, u32)> = Vec::new();
        let mut done: BTreeSet<Value> = program.outputs().map(|(v, _)| v).collect();
        let mut unscheduled: Vec<usize> = (0..program.instrs().len()).collect();

        for (value, _) in program.inputs() {
            self.start(value, 0);
            active.push((value, program.latency(value)));
        }

        let mut time: u32 = 1;
        while !unscheduled.is_empty() {
            if time > self.config.max_cycles {
                return Err(self.stuck(program, &unscheduled));
            }

            let mut still_active = Vec::with_capacity(active.len());
            for (value, end) in active.drain(..) {
                if end == time {
                    self.complete(value, time, &mut done);
                } else {
                    still_active.push((value, end));
                }
            }
            active = still_active;

            // Fixed point within this time step
            let mut progressed = false;
            while let Some(pos) = unscheduled.iter().position(|&id| {
                program.instrs()[id]
                    .operands
                    .iter()
                    .all(|operand| done.contains(operand))
            }) {
                let instr = &program.instrs()[unscheduled[pos]];
                let end = match time.checked_add(instr.latency) {
                    Some(end) if end <= self.config.max_cycles => end,
                    _ => return Err(self.stuck(program, &unscheduled[pos..=pos])),
                };
                unscheduled.remove(pos);

                let value = instr.value();
                self.start(value, time);
                if end == time {
                    self.complete(value, time, &mut done);
                } else {
                    active.push((value, end));
                }
                progressed = true;
            }

            if !progressed && active.is_empty() && !unscheduled.is_empty() {
                return Err(self.stuck(program, &unscheduled));
            }

            if unscheduled.is_empty() {
                break;
            }
            time = match time.checked_add(1) {
                Some(next) => next,
                None => return Err(self.stuck(program, &unscheduled)),
            };
        }

        for (value, end) in active {
            self.complete(value, end, &mut done);
        }

        let schedule = Schedule {
            start_time: self.start_time,
            end_time: self.end_time,
            trace: self.trace,
        };
        debug!("scheduled `{}` into {} stages", program.name, schedule.num_stages());
        Ok(schedule)
    }

    fn stuck(&self, program: &Program, unscheduled: &[usize]) -> CompileError {
        CompileError::UnschedulableProgram {
            pending: unscheduled
                .iter()
                .map(|&id| program.value_name(Value::Instr(id)))
                .collect(),
        }
    }
}

/// Schedule a program with the default configuration
pub fn asap_schedule(program: &Program) -> CompileResult<Schedule> {
    AsapScheduler::new(HlsConfig::default()).schedule(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Opcode;
    use pretty_assertions::assert_eq;

    fn pipelined_mul() -> (Program, [Value; 6]) {
        let mut prog = Program::new("pipelined_mul");
        let a = prog.add_input("a", 32).unwrap();
        let b = prog.add_input("b", 32).unwrap();
        let f = prog.add_input("f", 32).unwrap();
        let c = prog.add_output("c", 32).unwrap();
        let m = prog.add_instr(Opcode::MulPipelined, &[a, b]).unwrap();
        prog.set_latency(m, 1).unwrap();
        let s = prog.add_instr(Opcode::Add, &[m, f]).unwrap();
        prog.add_instr(Opcode::Write, &[c, s]).unwrap();
        (prog, [a, b, f, c, m, s])
    }

    #[test]
    fn test_passthrough() {
        let mut prog = Program::new("inout_test");
        let x = prog.add_input("input_val", 1).unwrap();
        let y = prog.add_output("out", 1).unwrap();
        let wr = prog.add_instr(Opcode::Write, &[y, x]).unwrap();

        let sched = asap_schedule(&prog).unwrap();
        assert_eq!(sched.start_time(x), Some(0));
        assert_eq!(sched.production_time(x), Some(1));
        assert_eq!(sched.start_time(wr), Some(1));
        assert_eq!(sched.num_stages(), 2);
        assert_eq!(sched.start_time(y), None);
    }

    #[test]
    fn test_pipelined_mul_times() {
        let (prog, [a, b, f, _, m, s]) = pipelined_mul();
        let sched = asap_schedule(&prog).unwrap();

        assert_eq!(sched.production_time(a), Some(1));
        assert_eq!(sched.production_time(b), Some(1));
        assert_eq!(sched.start_time(m), Some(1));
        assert_eq!(sched.production_time(m), Some(2));
        assert_eq!(sched.start_time(s), Some(2));
        assert_eq!(sched.production_time(s), Some(2));
        assert_eq!(sched.num_stages(), 3);

        assert_eq!(sched.last_use_time(&prog, f).unwrap(), 2);
        assert_eq!(sched.last_use_time(&prog, a).unwrap(), 1);
        assert_eq!(sched.last_use_time(&prog, s).unwrap(), 2);
    }

    #[test]
    fn test_dependency_soundness() {
        let (prog, _) = pipelined_mul();
        let sched = asap_schedule(&prog).unwrap();

        for instr in prog.instrs() {
            let start = sched.start_time(instr.value()).unwrap();
            let end = sched.production_time(instr.value()).unwrap();
            assert_eq!(end, start + instr.latency);
            for operand in instr.operands.iter().filter(|v| prog.produces(**v)) {
                assert!(start >= sched.production_time(*operand).unwrap());
            }
        }
    }

    #[test]
    fn test_zero_latency_chain_same_cycle() {
        let mut prog = Program::new("chain");
        let a = prog.add_input("a", 8).unwrap();
        let b = prog.add_input("b", 8).unwrap();
        let out = prog.add_output("out", 8).unwrap();
        let mut acc = prog.add_instr(Opcode::Add, &[a, b]).unwrap();
        let mut chain = vec![acc];
        for _ in 0..4 {
            acc = prog.add_instr(Opcode::Xor, &[acc, b]).unwrap();
            chain.push(acc);
        }
        prog.add_instr(Opcode::Write, &[out, acc]).unwrap();

        let sched = asap_schedule(&prog).unwrap();
        for value in chain {
            assert_eq!(sched.start_time(value), Some(1));
            assert_eq!(sched.production_time(value), Some(1));
        }
        assert_eq!(sched.num_stages(), 2);
    }

    #[test]
    fn test_deterministic() {
        let (prog, _) = pipelined_mul();
        let first = asap_schedule(&prog).unwrap();
        let second = asap_schedule(&prog).unwrap();
        assert_eq!(first.start_times(), second.start_times());
        assert_eq!(first.end_times(), second.end_times());
        assert_eq!(first.trace(), second.trace());
    }

    #[test]
    fn test_trace_follows_program_order() {
        let (prog, [a, b, f, _, m, s]) = pipelined_mul();
        let sched = asap_schedule(&prog).unwrap();
        let wr = Value::Instr(2);

        assert_eq!(
            sched.trace(),
            &[
                ScheduleEvent::Started { value: a, time: 0 },
                ScheduleEvent::Started { value: b, time: 0 },
                ScheduleEvent::Started { value: f, time: 0 },
                ScheduleEvent::Completed { value: a, time: 1 },
                ScheduleEvent::Completed { value: b, time: 1 },
                ScheduleEvent::Completed { value: f, time: 1 },
                ScheduleEvent::Started { value: m, time: 1 },
                ScheduleEvent::Completed { value: m, time: 2 },
                ScheduleEvent::Started { value: s, time: 2 },
                ScheduleEvent::Completed { value: s, time: 2 },
                ScheduleEvent::Started { value: wr, time: 2 },
                ScheduleEvent::Completed { value: wr, time: 2 },
            ]
        );
    }

    #[test]
    fn test_unused_value() {
        let mut prog = Program::new("dangling");
        let a = prog.add_input("a", 8).unwrap();
        let b = prog.add_input("b", 8).unwrap();
        let out = prog.add_output("out", 8).unwrap();
        let sum = prog.add_instr(Opcode::Add, &[a, b]).unwrap();
        prog.add_instr(Opcode::Write, &[out, a]).unwrap();

        let sched = asap_schedule(&prog).unwrap();
        let err = sched.last_use_time(&prog, sum).unwrap_err();
        assert_eq!(err, CompileError::unused("i0 (add)"));
    }

    #[test]
    fn test_cycle_rejected_on_load() {
        let json = r#"{
            "name": "cyclic",
            "args": [{ "name": "x", "width": 8, "direction": "input" }],
            "instrs": [
                { "id": 0, "opcode": "add", "operands": ["a0", "i1"], "latency": 0, "width": 8 },
                { "id": 1, "opcode": "add", "operands": ["i0", "a0"], "latency": 0, "width": 8 }
            ],
            "trip_count": 1
        }"#;
        let err = serde_json::from_str::<Program>(json).unwrap_err();
        assert!(err.to_string().contains("Undefined value: i1"));
    }

    #[test]
    fn test_output_operand_rejected_on_load() {
        let json = r#"{
            "name": "reads_output",
            "args": [
                { "name": "a", "width": 8, "direction": "input" },
                { "name": "b", "width": 8, "direction": "output" }
            ],
            "instrs": [
                { "id": 0, "opcode": "add", "operands": ["a0", "a1"], "latency": 0, "width": 8 },
                { "id": 1, "opcode": "write", "operands": ["a1", "i0"], "latency": 0, "width": 8 }
            ],
            "trip_count": 1
        }"#;
        let err = serde_json::from_str::<Program>(json).unwrap_err();
        assert!(err.to_string().contains("Invalid operands for i0 (add)"));
    }

    #[test]
    fn test_huge_latency_is_unschedulable() {
        let mut prog = Program::new("huge");
        let a = prog.add_input("a", 8).unwrap();
        let out = prog.add_output("out", 8).unwrap();
        let m = prog.add_instr(Opcode::MulPipelined, &[a, a]).unwrap();
        prog.set_latency(m, u32::MAX).unwrap();
        prog.add_instr(Opcode::Write, &[out, m]).unwrap();

        let err = asap_schedule(&prog).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnschedulableProgram {
                pending: vec!["i0 (mul_pipelined)".to_string()],
            }
        );

        // Overflow is caught even without a cycle bound
        let config = HlsConfig {
            max_cycles: u32::MAX,
            ..HlsConfig::default()
        };
        let err = AsapScheduler::new(config).schedule(&prog).unwrap_err();
        assert!(matches!(err, CompileError::UnschedulableProgram { .. }));
    }

    #[test]
    fn test_max_cycles_exceeded() {
        let (mut prog, [_, _, _, _, m, _]) = pipelined_mul();
        prog.set_latency(m, 100).unwrap();

        let config = HlsConfig {
            max_cycles: 10,
            ..HlsConfig::default()
        };
        let err = AsapScheduler::new(config).schedule(&prog).unwrap_err();
        assert!(matches!(err, CompileError::UnschedulableProgram { .. }));

        // The same program fits under the default bound
        let sched = asap_schedule(&prog).unwrap();
        assert_eq!(sched.production_time(m), Some(101));
    }

    #[test]
    fn test_multi_cycle_tail() {
        // The last instruction is still in flight when the work list empties
        let mut prog = Program::new("tail");
        let a = prog.add_input("a", 16).unwrap();
        let out = prog.add_output("out", 16).unwrap();
        let m = prog.add_instr(Opcode::MulPipelined, &[a, a]).unwrap();
        prog.set_latency(m, 3).unwrap();
        prog.add_instr(Opcode::Write, &[out, m]).unwrap();

        let sched = asap_schedule(&prog).unwrap();
        assert_eq!(sched.start_time(m), Some(1));
        assert_eq!(sched.production_time(m), Some(4));
        assert_eq!(sched.start_time(Value::Instr(1)), Some(4));
        assert_eq!(sched.num_stages(), 5);
    }
}
