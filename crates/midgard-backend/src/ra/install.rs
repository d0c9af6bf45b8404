//! Physical register install.
//!
//! Turns the solver's byte offsets back into instruction operands: each
//! allocated temporary becomes a fixed register index, and its sub-register
//! byte offset is folded into the operand encodings. Source offsets shift
//! swizzle entries; a destination offset shifts the write mask and
//! re-indexes every source swizzle to match the moved output lanes.

use log::debug;
use midgard_mir::{fixed_register, is_fixed, Program, Size, Temp, UNUSED};

use crate::Metadata;

/// Registers in the general-purpose region; anything placed below this
/// counts toward occupancy, including quirk-aliased texture operands.
const WORK_REGION: u32 = 16;

pub fn install(program: &mut Program, solutions: &[u32], meta: &mut Metadata) {
    let mut work_registers = 0u32;

    program.for_each_instruction_mut(|_, _, ins| {
        let size = ins.size;

        let dest_shift = match placement(ins.dest, solutions, size) {
            Some((register, shift)) => {
                if register < WORK_REGION {
                    work_registers = work_registers.max(register + 1);
                }

                ins.dest = fixed_register(register);
                shift
            }
            None => 0,
        };

        for slot in 0..ins.src.len() {
            let src_shift = match placement(ins.src[slot], solutions, size) {
                Some((register, shift)) => {
                    if register < WORK_REGION {
                        work_registers = work_registers.max(register + 1);
                    }

                    ins.src[slot] = fixed_register(register);
                    shift
                }
                None => 0,
            };

            if dest_shift == 0 && src_shift == 0 {
                continue;
            }

            // Lane `l` of the value is now produced at lane `l + dest_shift`
            // and must select source lane `old + src_shift`.
            let old = ins.swizzle[slot];
            let lanes = size.lanes() as usize;
            let mut new = [0u8; 16];

            for lane in 0..lanes {
                if lane + dest_shift < lanes {
                    new[lane + dest_shift] = old[lane] + src_shift as u8;
                }
            }

            ins.swizzle[slot] = new;
        }

        if dest_shift > 0 {
            ins.mask <<= dest_shift;
        }
    });

    meta.work_register_count = work_registers as u8;
    debug!("installed; {} work register(s)", work_registers);
}

/// Register index and sub-register lane shift for an allocated temporary.
/// Fixed and absent operands have no placement.
fn placement(temp: Temp, solutions: &[u32], size: Size) -> Option<(u32, usize)> {
    if temp == UNUSED || is_fixed(temp) {
        return None;
    }

    let offset = solutions[temp as usize];
    let register = offset / 16;
    let shift = (offset % 16) / size.bytes();

    Some((register, shift as usize))
}
