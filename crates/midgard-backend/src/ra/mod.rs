//! Register allocation.
//!
//! Allocation is an iterate-until-feasible loop: renumber, recompute
//! liveness, classify, feed byte-precise interference into the
//! linear-constraint solver, and on failure spill one node and try again.
//! Every attempt starts from scratch; nothing is maintained incrementally
//! across iterations.

use std::error::Error;
use std::fmt;

use log::{debug, info};
use midgard_mir::{
    is_fixed, liveness, liveness_update, Liveness, Program, Stage, Temp, UNUSED,
};

use crate::Metadata;

pub mod classes;
pub mod install;
pub mod solve;
pub mod spill;
pub mod squeeze;

use classes::RegClass;
use solve::{Lcra, RegisterFile};

// One temporary is evicted per failed attempt, so the bound caps how many
// spills a shader may need. Heavy fragment shaders run into the hundreds.
const MAX_RA_ITERATIONS: u32 = 500;

/// Byte offsets pinned by fragment writeout: color in r0, depth in r1.z,
/// stencil in r1.w.
const WRITEOUT_OFFSETS: [u32; 3] = [0, 16 + 8, 16 + 12];

#[derive(Debug, Eq, PartialEq)]
pub enum RegAllocError {
    /// The spill loop failed to converge.
    IterationLimit { iterations: u32 },

    /// Allocation is infeasible and nothing is left to spill.
    NoSpillCandidate,
}

impl fmt::Display for RegAllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegAllocError::IterationLimit { iterations } => {
                write!(f, "no feasible allocation after {} attempts", iterations)
            }
            RegAllocError::NoSpillCandidate => {
                write!(f, "allocation infeasible with no spillable temporary")
            }
        }
    }
}

impl Error for RegAllocError {}

/// Allocate registers for a scheduled program, spilling as needed, and
/// install the physical operands. Fills in the allocation-related metadata.
pub fn run(program: &mut Program, meta: &mut Metadata) -> Result<(), RegAllocError> {
    let file = RegisterFile::new(program.quirks);

    for iteration in 0..MAX_RA_ITERATIONS {
        classes::lower_special_reads(program);

        let mut remap = squeeze::TempRemap::default();
        squeeze::squeeze(program, &mut remap);

        let live = liveness(program);
        let classes = classes::classify(program);
        let mut lcra = build_solver(program, &live, &classes);

        match lcra.solve(&file) {
            Ok(solutions) => {
                info!(
                    "allocated {} temporaries in {} attempt(s)",
                    program.temp_count,
                    iteration + 1
                );
                install::install(program, &solutions, meta);
                return Ok(());
            }

            Err(failed) => {
                let spill_class = classes[failed];
                debug!(
                    "attempt {}: no fit for t{} ({:?})",
                    iteration + 1,
                    failed,
                    spill_class
                );

                let victim = spill::choose_spill_node(program, &lcra, &classes, spill_class)?;
                meta.tls_size += spill::spill(program, victim, spill_class, meta);
            }
        }
    }

    Err(RegAllocError::IterationLimit {
        iterations: MAX_RA_ITERATIONS,
    })
}

/// Translate liveness and the schedule's co-issue commitments into solver
/// constraints, along with per-node alignment and span requirements.
fn build_solver(program: &Program, live: &Liveness, classes: &[RegClass]) -> Lcra {
    let mut lcra = Lcra::new(program.temp_count as usize);

    for (temp, class) in classes.iter().enumerate() {
        lcra.set_class(temp, *class);
    }

    // Placement requirements from every def and use.
    program.for_each_instruction(|_, _, ins| {
        let bytes = ins.size.bytes();

        if let Some(dest) = node(ins.dest) {
            lcra.restrict(dest, bytes, span_of(ins.bytemask()));
        }

        for src in ins.src {
            if let Some(node_index) = node(src) {
                lcra.restrict(node_index, bytes, span_of(ins.bytemask_of_read_components(src)));
            }
        }
    });

    pin_writeout(program, &mut lcra);

    // Liveness interference: a definition conflicts, byte against byte, with
    // everything live just after it.
    for id in program.block_ids() {
        let mut bytes_live: Vec<u16> = live.live_out(id).to_vec();
        let block = program.block(id);

        for r in block.order().into_iter().rev() {
            let ins = block.get(r);

            if let Some(dest) = node(ins.dest) {
                let dest_mask = ins.bytemask();

                for (other, live_bytes) in bytes_live.iter().enumerate() {
                    if *live_bytes != 0 && other != dest {
                        lcra.add_interference(dest, dest_mask, other, *live_bytes);
                    }
                }
            }

            liveness_update(&mut bytes_live, ins);
        }
    }

    // Co-issue constraints: within one issue row of a bundle, writes land
    // while the row's reads are in flight, so a written register may not
    // overlap a register read by a sibling.
    for id in program.block_ids() {
        let block = program.block(id);

        for bundle in block.bundles.iter().filter(|b| b.tag.is_alu()) {
            for (wi, writer) in bundle.instructions.iter().enumerate() {
                let writer = block.get(*writer);
                let Some(dest) = node(writer.dest) else {
                    continue;
                };
                let Some(row) = writer.unit.map(|u| u.row()) else {
                    continue;
                };

                for (ri, reader) in bundle.instructions.iter().enumerate() {
                    let reader = block.get(*reader);
                    if ri == wi || reader.unit.map(|u| u.row()) != Some(row) {
                        continue;
                    }

                    for src in reader.src {
                        if let Some(src) = node(src) {
                            if src != dest {
                                lcra.add_interference(
                                    dest,
                                    writer.bytemask(),
                                    src,
                                    reader.bytemask_of_read_components(src as Temp),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    lcra
}

fn node(temp: Temp) -> Option<usize> {
    if temp == UNUSED || is_fixed(temp) {
        None
    } else {
        Some(temp as usize)
    }
}

/// Bytes occupied from the node's base offset.
fn span_of(bytemask: u16) -> u32 {
    16 - bytemask.leading_zeros().min(16)
}

/// Fragment writeout operands have fixed homes in the register file; solve
/// them up front so everything else packs around them.
fn pin_writeout(program: &Program, lcra: &mut Lcra) {
    if program.stage != Stage::Fragment {
        return;
    }

    program.for_each_instruction(|_, _, ins| {
        if !ins.is_writeout() {
            return;
        }

        for (slot, offset) in WRITEOUT_OFFSETS.iter().enumerate() {
            if let Some(temp) = node(ins.src[slot]) {
                if !lcra.is_forced(temp) {
                    lcra.force(temp, *offset);
                }
            }
        }
    });
}
