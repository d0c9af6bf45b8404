//! Backward liveness analysis over byte masks.
//!
//! One worklist pass to a fixed point, recomputed from scratch whenever the
//! MIR changes; there is deliberately no incremental or per-query API. Masks
//! are byte-precise so that two temporaries sharing a physical register at
//! different offsets do not appear to conflict.

use crate::instruction::{is_fixed, Instruction, UNUSED};
use crate::program::{BlockId, Program};

#[derive(Debug)]
pub struct Liveness {
    /// Per block, per temporary: bytes live on entry.
    pub live_in: Vec<Vec<u16>>,

    /// Per block, per temporary: bytes live on exit.
    pub live_out: Vec<Vec<u16>>,
}

impl Liveness {
    pub fn live_out(&self, block: BlockId) -> &[u16] {
        &self.live_out[block.0 as usize]
    }

    pub fn live_in(&self, block: BlockId) -> &[u16] {
        &self.live_in[block.0 as usize]
    }
}

/// Apply one instruction, in reverse: kill the bytes it overwrites, then
/// gen the bytes it reads. Shared with interference construction, which
/// replays the same walk.
pub fn update(live: &mut [u16], ins: &Instruction) {
    if ins.dest != UNUSED && !is_fixed(ins.dest) {
        live[ins.dest as usize] &= !ins.bytemask();
    }

    for src in ins.src {
        if src != UNUSED && !is_fixed(src) {
            live[src as usize] |= ins.bytemask_of_read_components(src);
        }
    }
}

pub fn liveness(program: &Program) -> Liveness {
    let n = program.temp_count as usize;
    let block_count = program.blocks.len();

    let mut live_in = vec![vec![0u16; n]; block_count];
    let mut live_out = vec![vec![0u16; n]; block_count];

    // Seed with every block, exits first; predecessors re-enter the list
    // whenever a block's live-in grows.
    let mut worklist: Vec<BlockId> = program.block_ids().rev().collect();

    while let Some(id) = worklist.pop() {
        let idx = id.0 as usize;
        let block = program.block(id);

        let mut out = vec![0u16; n];
        for succ in block.successors.iter() {
            for (acc, bits) in out.iter_mut().zip(live_in[succ.0 as usize].iter()) {
                *acc |= bits;
            }
        }

        let mut live = out.clone();
        for r in block.order().into_iter().rev() {
            update(&mut live, block.get(r));
        }

        live_out[idx] = out;

        if live != live_in[idx] {
            live_in[idx] = live;
            for pred in block.predecessors.iter() {
                if !worklist.contains(pred) {
                    worklist.push(*pred);
                }
            }
        }
    }

    Liveness { live_in, live_out }
}
