//! The MIR instruction representation.
//!
//! Instructions are a mutable, tagged form, distinct from the bit-exact
//! machine encoding: the packed words are only materialized by the emitter,
//! after scheduling and register allocation have filled in `unit` and
//! rewritten the operands to fixed registers.

use crate::mask::{bytemask_of_swizzled, identity_swizzle, to_bytemask, Size};
use crate::ops::{AluOp, LdstOp, TexOp};
use crate::program::BlockId;

/// A virtual register index. Indices at or above [`FIXED_MINIMUM`] denote
/// fixed physical registers and are not subject to allocation.
pub type Temp = u32;

/// Sentinel for an absent source or destination.
pub const UNUSED: Temp = u32::MAX;

pub const FIXED_MINIMUM: Temp = 1 << 24;

/// The ALU register select that reads the bundle-embedded constant pool.
pub const CONSTANT_REGISTER: u32 = 26;

pub const MAX_SRCS: usize = 3;

pub fn fixed_register(reg: u32) -> Temp {
    debug_assert!(reg < 32);
    FIXED_MINIMUM + reg
}

pub fn is_fixed(temp: Temp) -> bool {
    temp != UNUSED && temp >= FIXED_MINIMUM
}

pub fn unfix(temp: Temp) -> u32 {
    debug_assert!(is_fixed(temp));
    temp - FIXED_MINIMUM
}

/// One of the execution pipes an instruction can issue on. The first two
/// issue in the early row of a bundle, the rest in the late row; `Branch` is
/// the dedicated slot at the very end of an ALU word.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Unit {
    Vmul,
    Sadd,
    Vadd,
    Smul,
    Vlut,
    Branch,
}

impl Unit {
    pub const fn bit(self) -> u8 {
        1 << self.order()
    }

    /// Total issue order within a bundle. Units must be claimed in strictly
    /// increasing order.
    pub const fn order(self) -> u8 {
        match self {
            Unit::Vmul => 0,
            Unit::Sadd => 1,
            Unit::Vadd => 2,
            Unit::Smul => 3,
            Unit::Vlut => 4,
            Unit::Branch => 5,
        }
    }

    /// Issue row: VMUL/SADD fire together, then VADD/SMUL/VLUT.
    pub const fn row(self) -> u8 {
        match self {
            Unit::Vmul | Unit::Sadd => 0,
            _ => 1,
        }
    }

    pub fn is_scalar(self) -> bool {
        matches!(self, Unit::Sadd | Unit::Smul)
    }
}

/// Coarse instruction class; determines the bundle format an instruction
/// participates in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KindClass {
    Alu,
    LoadStore,
    Texture,
    Branch,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BranchTarget {
    None,
    Block(BlockId),
    Discard,
}

#[derive(Clone, Copy, Debug)]
pub enum Kind {
    Alu {
        op: AluOp,
    },

    LoadStore {
        op: LdstOp,
        /// Immediate byte offset folded into the access.
        offset: i32,
    },

    Texture {
        op: TexOp,
        /// How many of the following bundles may overlap this texture
        /// operation. Filled in after scheduling, capped at 3.
        out_of_order: u8,
    },

    Branch {
        target: BranchTarget,
        /// Fragment writeout: sources are the color (and optionally depth
        /// and stencil) values flushed to the tilebuffer.
        writeout: bool,
        compact: bool,
    },
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub kind: Kind,

    pub dest: Temp,
    pub src: [Temp; MAX_SRCS],

    /// Per-source lane selection, indexed by destination lane.
    pub swizzle: [[u8; 16]; MAX_SRCS],

    /// Component write mask at `size` granularity.
    pub mask: u16,
    pub size: Size,

    /// Execution unit, assigned by the scheduler.
    pub unit: Option<Unit>,

    /// Inline constants, read through [`CONSTANT_REGISTER`].
    pub constants: [u32; 4],
    pub has_constants: bool,
    pub has_blend_constant: bool,

    /// Set on spill/fill glue; spilling these would never terminate.
    pub no_spill: bool,

    /// Scratch flag for pass-local bookkeeping (e.g. load/store pairing).
    pub hint: bool,
}

impl Instruction {
    fn new(kind: Kind, dest: Temp) -> Self {
        Self {
            kind,
            dest,
            src: [UNUSED; MAX_SRCS],
            swizzle: [identity_swizzle(); MAX_SRCS],
            mask: 0xf,
            size: Size::Bits32,
            unit: None,
            constants: [0; 4],
            has_constants: false,
            has_blend_constant: false,
            no_spill: false,
            hint: false,
        }
    }

    pub fn alu(op: AluOp, dest: Temp, src0: Temp, src1: Temp) -> Self {
        let mut ins = Self::new(Kind::Alu { op }, dest);
        ins.src[0] = src0;
        ins.src[1] = src1;
        ins
    }

    pub fn mov(dest: Temp, src: Temp) -> Self {
        let mut ins = Self::new(Kind::Alu { op: AluOp::Fmov }, dest);
        ins.src[0] = src;
        ins
    }

    pub fn load(op: LdstOp, dest: Temp, address: Temp, offset: i32) -> Self {
        debug_assert!(!op.is_store());
        let mut ins = Self::new(Kind::LoadStore { op, offset }, dest);
        ins.src[1] = address;
        ins
    }

    pub fn store(value: Temp, address: Temp, offset: i32) -> Self {
        let mut ins = Self::new(
            Kind::LoadStore {
                op: LdstOp::Store,
                offset,
            },
            UNUSED,
        );
        ins.src[0] = value;
        ins.src[1] = address;
        ins
    }

    pub fn texture(op: TexOp, dest: Temp, coordinate: Temp) -> Self {
        let mut ins = Self::new(
            Kind::Texture {
                op,
                out_of_order: 0,
            },
            dest,
        );
        ins.src[0] = coordinate;
        ins
    }

    pub fn branch(target: BranchTarget) -> Self {
        let mut ins = Self::new(
            Kind::Branch {
                target,
                writeout: false,
                compact: true,
            },
            UNUSED,
        );
        ins.mask = 0;
        ins
    }

    pub fn writeout(color: Temp) -> Self {
        let mut ins = Self::branch(BranchTarget::None);
        if let Kind::Branch { writeout, .. } = &mut ins.kind {
            *writeout = true;
        }
        ins.src[0] = color;
        ins
    }

    pub fn class(&self) -> KindClass {
        match self.kind {
            Kind::Alu { .. } => KindClass::Alu,
            Kind::LoadStore { .. } => KindClass::LoadStore,
            Kind::Texture { .. } => KindClass::Texture,
            Kind::Branch { .. } => KindClass::Branch,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.kind, Kind::Branch { .. })
    }

    pub fn is_writeout(&self) -> bool {
        matches!(self.kind, Kind::Branch { writeout: true, .. })
    }

    pub fn writes_register(&self) -> bool {
        self.dest != UNUSED && self.mask != 0
    }

    /// Byte mask written by this instruction into its destination register.
    pub fn bytemask(&self) -> u16 {
        to_bytemask(self.mask, self.size)
    }

    /// Component mask read of source slot `slot` before swizzling.
    pub fn read_mask(&self, slot: usize) -> u16 {
        match self.kind {
            // Writeout flushes the full vec4 regardless of the branch mask.
            Kind::Branch { writeout, .. } => {
                if writeout {
                    0xf
                } else {
                    0
                }
            }

            // The address operand is a scalar pointer.
            Kind::LoadStore { .. } if slot >= 1 => 0x1,

            _ => self.mask,
        }
    }

    /// Exact byte mask of `temp` consumed by this instruction, across all
    /// source slots, accounting for swizzles.
    pub fn bytemask_of_read_components(&self, temp: Temp) -> u16 {
        let mut out = 0;

        for (slot, src) in self.src.iter().enumerate() {
            if *src != temp || *src == UNUSED {
                continue;
            }

            out |= bytemask_of_swizzled(self.read_mask(slot), &self.swizzle[slot], self.size);
        }

        out
    }

    /// Replace `old` with `new` in this instruction's source slots.
    pub fn rewrite_src(&mut self, old: Temp, new: Temp) {
        for src in self.src.iter_mut() {
            if *src == old {
                *src = new;
            }
        }
    }

    pub fn reads(&self, temp: Temp) -> bool {
        temp != UNUSED && self.src.contains(&temp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_register_roundtrip() {
        let r5 = fixed_register(5);
        assert!(is_fixed(r5));
        assert_eq!(unfix(r5), 5);
        assert!(!is_fixed(17));
        assert!(!is_fixed(UNUSED));
    }

    #[test]
    fn unit_rows_partition_order() {
        // Every unit in the late row orders after every unit in the early
        // row, which is what lets the scheduler linearize issue.
        for a in [Unit::Vmul, Unit::Sadd] {
            for b in [Unit::Vadd, Unit::Smul, Unit::Vlut, Unit::Branch] {
                assert!(a.order() < b.order());
            }
        }
    }

    #[test]
    fn read_bytemask_tracks_swizzle() {
        let mut ins = Instruction::alu(AluOp::Fadd, 0, 1, 2);
        ins.mask = 0b0011;
        ins.swizzle[0][0] = 2;
        ins.swizzle[0][1] = 2;

        // Source 1 is read only through lane 2.
        assert_eq!(ins.bytemask_of_read_components(1), 0x0f00);
        // Source 2 keeps the identity swizzle.
        assert_eq!(ins.bytemask_of_read_components(2), 0x00ff);
        // An unrelated temp is not read at all.
        assert_eq!(ins.bytemask_of_read_components(3), 0);
    }

    #[test]
    fn store_reads_its_value_not_its_dest() {
        let st = Instruction::store(7, 8, 0);
        assert!(!st.writes_register());
        assert_ne!(st.bytemask_of_read_components(7), 0);
        // Address operands read a single lane.
        assert_eq!(st.bytemask_of_read_components(8), 0x000f);
    }
}
