//! Opcode property tables.
//!
//! The scheduler steers ALU operations onto execution units based on a
//! static per-opcode table: most arithmetic is tied to the adder or
//! multiplier pipes, transcendentals only run on the lookup unit, and moves
//! go anywhere but the lookup unit.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::instruction::Unit;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AluOp {
    Fadd,
    Fmul,
    Fmin,
    Fmax,
    Fmov,
    Iadd,
    Isub,
    Imul,
    Imov,
    Iand,
    Ior,
    Ixor,
    Ishl,
    Iushr,
    Frcp,
    Frsqrt,
    Fexp2,
    Flog2,
    Fsin,
    Fcos,
}

#[derive(Clone, Copy, Debug)]
pub struct AluProps {
    /// Units this opcode may issue on, before the scalar-pipe extension.
    pub units: u8,

    /// Whether a single-component op may be steered onto SADD/SMUL.
    pub scalar_capable: bool,
}

pub const UNITS_ADD: u8 = Unit::Vadd.bit();
pub const UNITS_MUL: u8 = Unit::Vmul.bit();
pub const UNITS_MOST: u8 = UNITS_ADD | UNITS_MUL;
pub const UNITS_LUT: u8 = Unit::Vlut.bit();

lazy_static! {
    static ref ALU_PROPS: HashMap<AluOp, AluProps> = {
        use AluOp::*;

        let adder = AluProps { units: UNITS_ADD, scalar_capable: true };
        let multiplier = AluProps { units: UNITS_MUL, scalar_capable: true };
        let most = AluProps { units: UNITS_MOST, scalar_capable: true };
        let lut = AluProps { units: UNITS_LUT, scalar_capable: false };

        HashMap::from([
            (Fadd, adder),
            (Fmin, adder),
            (Fmax, adder),
            (Iadd, adder),
            (Isub, adder),
            (Ishl, adder),
            (Iushr, adder),
            (Fmul, multiplier),
            (Imul, multiplier),
            (Fmov, most),
            (Imov, most),
            (Iand, most),
            (Ior, most),
            (Ixor, most),
            (Frcp, lut),
            (Frsqrt, lut),
            (Fexp2, lut),
            (Flog2, lut),
            (Fsin, lut),
            (Fcos, lut),
        ])
    };
}

impl AluOp {
    pub fn props(self) -> AluProps {
        *ALU_PROPS.get(&self).unwrap()
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LdstOp {
    Load,
    Store,
    LoadUniform,
    LoadAttribute,
    LoadVarying,
}

impl LdstOp {
    pub fn is_store(self) -> bool {
        matches!(self, LdstOp::Store)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TexOp {
    Normal,
    Lod,
    Fetch,
}
