//! Pre-schedule cleanup passes.

use log::trace;
use midgard_mir::{is_fixed, liveness, liveness_update, from_bytemask, KindClass, Program, UNUSED};

/// Remove instructions whose results are never observed, and narrow write
/// masks where only part of a definition is live. Runs to a fixed point via
/// the caller; returns `true` if anything changed.
///
/// Branches, stores and writes to fixed registers are always observable and
/// never touched.
pub fn dead_code_eliminate(program: &mut Program) -> bool {
    let l = liveness(program);
    let mut progress = false;

    for id in program.block_ids().collect::<Vec<_>>() {
        let mut live = l.live_out(id).to_vec();
        let order = program.block(id).order();
        let mut dead = Vec::new();

        for r in order.into_iter().rev() {
            let block = program.block_mut(id);
            let ins = block.get(r);

            let removable = matches!(ins.class(), KindClass::Alu | KindClass::LoadStore)
                && ins.dest != UNUSED
                && !is_fixed(ins.dest);

            if removable {
                let live_bytes = live[ins.dest as usize] & ins.bytemask();

                if live_bytes == 0 {
                    dead.push(r);
                    continue;
                }

                // Rounding back up to components can leave the mask as it
                // was; only a real change counts as progress.
                let narrowed = from_bytemask(live_bytes, ins.size);
                if narrowed != ins.mask {
                    block.get_mut(r).mask = narrowed;
                    progress = true;
                }
            }

            liveness_update(&mut live, program.block(id).get(r));
        }

        let block = program.block_mut(id);
        for r in dead {
            block.remove(r);
            progress = true;
        }
    }

    if progress {
        trace!("dce made progress");
    }

    progress
}
