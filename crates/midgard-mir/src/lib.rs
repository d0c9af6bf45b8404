//! Mid-level IR for a Midgard-class VLIW shader core.
//!
//! This crate holds the program representation shared by the backend
//! passes: instructions grouped into basic blocks, scheduled bundles, byte
//! precise masks, and liveness. The instruction selector producing MIR and
//! the binary word packer consuming it both live elsewhere.

pub use block::{Block, Bundle, InsRef, Tag};
pub use check::check;
pub use instruction::{
    fixed_register, is_fixed, unfix, BranchTarget, Instruction, Kind, KindClass, Temp, Unit,
    CONSTANT_REGISTER, FIXED_MINIMUM, MAX_SRCS, UNUSED,
};
pub use liveness::{liveness, update as liveness_update, Liveness};
pub use mask::{bytemask_of_swizzled, from_bytemask, identity_swizzle, to_bytemask, Size};
pub use pretty::Prettier;
pub use program::{BlockId, Program, Quirks, Stage};

mod block;
mod check;
mod instruction;
mod liveness;
mod mask;
pub mod ops;
mod pretty;
mod program;
