//! Load/store pairing.
//!
//! A load/store bundle issues two memory operations per cycle, but the
//! scheduler only packs instructions that are adjacent in program order.
//! This pass hoists a second memory operation next to an unpaired one when
//! nothing in between depends on it, doubling memory throughput on
//! straight-line access runs.

use log::trace;
use midgard_mir::{Block, InsRef, KindClass, Program, UNUSED};

/// How far ahead to look for a partner, in instructions.
const SEARCH_WINDOW: usize = 8;

pub fn pair_load_store(program: &mut Program) {
    let mut paired = 0u32;

    for id in program.block_ids().collect::<Vec<_>>() {
        let block = program.block_mut(id);
        let mut order = block.order();
        let mut i = 0;

        while i < order.len() {
            let first = order[i];

            let wants_partner = {
                let ins = block.get(first);
                ins.class() == KindClass::LoadStore && !ins.hint
            };

            if !wants_partner {
                i += 1;
                continue;
            }

            let limit = (i + 1 + SEARCH_WINDOW).min(order.len());

            for j in i + 1..limit {
                let second = order[j];
                let candidate = block.get(second);

                if candidate.class() != KindClass::LoadStore || candidate.hint {
                    continue;
                }

                if !can_hoist(block, &order[i + 1..j], second) {
                    continue;
                }

                block.move_after(first, second);
                block.get_mut(first).hint = true;
                block.get_mut(second).hint = true;
                paired += 1;

                order = block.order();
                break;
            }

            i += 1;
        }
    }

    if paired > 0 {
        trace!("paired {} load/store(s)", paired);
    }
}

/// Whether `moved` can be hoisted above every instruction in `over` without
/// changing observable behavior. Memory operations in between block the
/// hoist outright; otherwise it is a pure register dependency check.
fn can_hoist(block: &Block, over: &[InsRef], moved: InsRef) -> bool {
    let moved = block.get(moved);

    for r in over {
        let between = block.get(*r);

        if between.class() == KindClass::LoadStore {
            return false;
        }

        if between.dest != UNUSED {
            // The hoisted op must not consume a value defined in between.
            if moved.bytemask_of_read_components(between.dest) != 0 {
                return false;
            }

            if moved.dest == between.dest && moved.bytemask() & between.bytemask() != 0 {
                return false;
            }
        }

        // Nor may it clobber an input of something it jumps over.
        if moved.dest != UNUSED && between.bytemask_of_read_components(moved.dest) != 0 {
            return false;
        }
    }

    true
}
