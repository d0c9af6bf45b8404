//! Out-of-order execution hints for texture operations.
//!
//! A texture bundle may let the following bundles issue before its result
//! lands, as long as none of them touch the destination register. The hint
//! is a 2-bit field, so at most three bundles of slack can be expressed.
//! Runs after scheduling, once bundle boundaries are final.

use log::trace;
use midgard_mir::{Kind, Program, Tag, UNUSED};

const MAX_OOO_DISTANCE: u8 = 3;

pub fn set_texture_ooo_hints(program: &mut Program) {
    if program.quirks.no_ooo_texture {
        return;
    }

    for id in program.block_ids().collect::<Vec<_>>() {
        let block = program.block_mut(id);

        for at in 0..block.bundles.len() {
            if block.bundles[at].tag != Tag::Texture {
                continue;
            }

            let texture = block.bundles[at].instructions[0];
            let dest = block.get(texture).dest;

            let mut distance = 0u8;

            'scan: for later in block.bundles[at + 1..].iter() {
                if distance == MAX_OOO_DISTANCE {
                    break;
                }

                for r in &later.instructions {
                    let ins = block.get(*r);

                    // Any touch of the pending result ends the window, as
                    // does another texture op (results land in order).
                    if matches!(ins.kind, Kind::Texture { .. })
                        || (dest != UNUSED
                            && (ins.bytemask_of_read_components(dest) != 0 || ins.dest == dest))
                    {
                        break 'scan;
                    }
                }

                distance += 1;
            }

            if let Kind::Texture { out_of_order, .. } = &mut block.get_mut(texture).kind {
                *out_of_order = distance;
            }

            if distance > 0 {
                trace!("texture op may overlap {} bundle(s)", distance);
            }
        }
    }
}
