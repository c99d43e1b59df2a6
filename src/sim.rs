//! Cycle-stepped evaluator for generated plans
//!
//! Drives a [`Microarchitecture`] the way a testbench drives the emitted
//! circuit: set inputs and `start`, step the clock, read outputs and `done`.
//! Registers power up at zero.

use std::collections::{HashMap, VecDeque};

use crate::catalog::{mask, FunctionalUnitCatalog};
use crate::hardware::{Microarchitecture, SignalId, SignalKind};

pub struct Simulator<'a> {
    arch: &'a Microarchitecture,
    catalog: &'a FunctionalUnitCatalog,
    start: bool,
    inputs: HashMap<String, u64>,
    registers: HashMap<SignalId, u64>,
    /// In-flight results of multi-cycle units, newest first
    unit_pipes: HashMap<usize, VecDeque<u64>>,
    cycle: u64,
}

impl<'a> Simulator<'a> {
    pub fn new(arch: &'a Microarchitecture, catalog: &'a FunctionalUnitCatalog) -> Self {
        let unit_pipes = arch
            .units()
            .filter(|u| u.latency > 0)
            .map(|u| (u.instr, VecDeque::from(vec![0; u.latency as usize])))
            .collect();

        Self {
            arch,
            catalog,
            start: false,
            inputs: HashMap::new(),
            registers: HashMap::new(),
            unit_pipes,
            cycle: 0,
        }
    }

    pub fn set_start(&mut self, start: bool) {
        self.start = start;
    }

    pub fn set_input(&mut self, port: &str, value: u64) {
        self.inputs.insert(port.to_string(), value);
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn done(&self) -> bool {
        self.eval(self.arch.done) != 0
    }

    pub fn output(&self, port: &str) -> u64 {
        let binding = self
            .arch
            .output(port)
            .unwrap_or_else(|| panic!("no output port `{}`", port));
        mask(self.eval(binding.driver), binding.width)
    }

    /// Combinational value of a signal in the current cycle
    pub fn eval(&self, id: SignalId) -> u64 {
        let signal = self.arch.signal(id).expect("dangling signal");
        match &signal.kind {
            SignalKind::Start => u64::from(self.start),
            SignalKind::Input { port } => {
                mask(self.inputs.get(port).copied().unwrap_or(0), signal.width)
            }
            SignalKind::Register { .. } => self.registers.get(&id).copied().unwrap_or(0),
            SignalKind::UnitOutput { instr } => match self.unit_pipes.get(instr) {
                Some(pipe) => pipe.back().copied().unwrap_or(0),
                None => self.compute_unit(*instr),
            },
        }
    }

    fn compute_unit(&self, instr: usize) -> u64 {
        let unit = self.arch.unit(instr).expect("unbound unit");
        let contract = self.catalog.lookup(unit.opcode).expect("unit not in catalog");
        assert_eq!(unit.inputs.len(), 2, "unit i{} is not fully wired", instr);

        let a = self.eval(unit.inputs[0]);
        let b = self.eval(unit.inputs[1]);
        contract.evaluate(a, b, unit.width)
    }

    /// One rising clock edge
    pub fn step(&mut self) {
        let mut next_registers = HashMap::new();
        for signal in self.arch.signals() {
            if let SignalKind::Register { d, enable, .. } = &signal.kind {
                let load = enable.map_or(true, |en| self.eval(en) != 0);
                let value = if load {
                    mask(self.eval(*d), signal.width)
                } else {
                    self.eval(signal.id)
                };
                next_registers.insert(signal.id, value);
            }
        }

        let mut next_pipes = Vec::new();
        for instr in self.unit_pipes.keys() {
            next_pipes.push((*instr, self.compute_unit(*instr)));
        }

        self.registers = next_registers;
        for (instr, value) in next_pipes {
            if let Some(pipe) = self.unit_pipes.get_mut(&instr) {
                pipe.push_front(value);
                pipe.pop_back();
            }
        }
        self.cycle += 1;
    }

    pub fn step_n(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }
}
