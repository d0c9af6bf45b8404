//! Fragment writeout preconditions.
//!
//! A writeout branch flushes its source register to the tilebuffer as the
//! bundle retires, reading the value produced *within* the bundle. That
//! imposes three conditions on the bundle containing the branch:
//!
//! 1. all four channels of the source are written by bundle members,
//! 2. none of those writes ran on the lookup unit (its results are not
//!    available to the writeout path), and
//! 3. the writing members take no same-bundle inputs themselves; only one
//!    level of pipeline forwarding exists.
//!
//! When the conditions fail, the scheduler breaks the hazard with a move
//! that must open its own bundle.

use midgard_mir::{Block, InsRef, Instruction, Unit, UNUSED};

pub fn can_writeout_fragment(block: &Block, members: &[InsRef], branch: &Instruction) -> bool {
    let source = branch.src[0];
    if source == UNUSED {
        return false;
    }

    let mut written = 0u16;

    for member in members {
        let ins = block.get(*member);

        if ins.dest != source {
            continue;
        }

        if ins.unit == Some(Unit::Vlut) {
            return false;
        }

        written |= ins.mask;

        // A producer of the writeout value cannot itself consume another
        // member's result in the same cycle.
        for other in members {
            if other == member {
                continue;
            }

            let other = block.get(*other);
            if other.dest != UNUSED && ins.bytemask_of_read_components(other.dest) != 0 {
                return false;
            }
        }
    }

    written & 0xf == 0xf
}
