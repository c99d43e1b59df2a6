//! Functional unit catalog
//!
//! Maps each opcode to the contract of the hardware operator that
//! implements it: latency, port shape and the pure function it computes.
//! Adding an operation only needs a new entry here plus a concrete unit in
//! whatever backend emits the netlist.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::program::Opcode;

/// Pure evaluation function: `(a, b, width) -> result`, already masked to `width`
pub type UnitFn = fn(u64, u64, u32) -> u64;

/// Contract of a functional unit kind
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UnitContract {
    /// Cycles from operands to result; 0 means combinational
    pub latency: u32,
    pub input_arity: usize,
    pub output_arity: usize,
    #[serde(skip)]
    pub semantics: UnitFn,
}

impl UnitContract {
    /// Binary, single-output unit
    pub fn binary(latency: u32, semantics: UnitFn) -> Self {
        Self {
            latency,
            input_arity: 2,
            output_arity: 1,
            semantics,
        }
    }

    pub fn evaluate(&self, a: u64, b: u64, width: u32) -> u64 {
        (self.semantics)(a, b, width)
    }
}

/// Keep the low `width` bits
pub fn mask(value: u64, width: u32) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

fn add(a: u64, b: u64, width: u32) -> u64 {
    mask(a.wrapping_add(b), width)
}

fn sub(a: u64, b: u64, width: u32) -> u64 {
    mask(a.wrapping_sub(b), width)
}

fn and(a: u64, b: u64, width: u32) -> u64 {
    mask(a & b, width)
}

fn or(a: u64, b: u64, width: u32) -> u64 {
    mask(a | b, width)
}

fn xor(a: u64, b: u64, width: u32) -> u64 {
    mask(a ^ b, width)
}

fn mul(a: u64, b: u64, width: u32) -> u64 {
    mask(a.wrapping_mul(b), width)
}

/// Opcode to unit contract table
#[derive(Debug, Clone, Default, Serialize)]
pub struct FunctionalUnitCatalog {
    units: BTreeMap<Opcode, UnitContract>,
}

impl FunctionalUnitCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in operator set
    pub fn standard() -> Self {
        Self::new()
            .with_unit(Opcode::Add, UnitContract::binary(0, add))
            .with_unit(Opcode::Sub, UnitContract::binary(0, sub))
            .with_unit(Opcode::And, UnitContract::binary(0, and))
            .with_unit(Opcode::Or, UnitContract::binary(0, or))
            .with_unit(Opcode::Xor, UnitContract::binary(0, xor))
            .with_unit(Opcode::Mul, UnitContract::binary(0, mul))
            .with_unit(Opcode::MulPipelined, UnitContract::binary(1, mul))
    }

    /// Register (or replace) the unit for an opcode
    pub fn with_unit(mut self, opcode: Opcode, contract: UnitContract) -> Self {
        self.units.insert(opcode, contract);
        self
    }

    pub fn lookup(&self, opcode: Opcode) -> Option<&UnitContract> {
        self.units.get(&opcode)
    }
}
