//! Spill selection and rewriting.
//!
//! When the solver cannot place a node, one temporary of the failing class
//! is evicted and the program rewritten before the next attempt. Work
//! registers spill to thread-local storage: a store after every write, a
//! fresh single-use fill before every read. The special classes have no TLS
//! path; their values are demoted to a work register and copied into a fresh
//! special temporary at each consuming site instead.

use log::debug;
use midgard_mir::{BlockId, InsRef, Instruction, Program, Tag, Temp, UNUSED};

use crate::Metadata;

use super::classes::RegClass;
use super::solve::Lcra;
use super::RegAllocError;

/// Pick the temporary whose eviction frees the most constraints per unit of
/// inserted memory traffic. Spill glue and pinned nodes are never picked.
pub fn choose_spill_node(
    program: &Program,
    lcra: &Lcra,
    classes: &[RegClass],
    spill_class: RegClass,
) -> Result<Temp, RegAllocError> {
    let temp_count = program.temp_count as usize;
    let mut cost = vec![0u32; temp_count];
    let mut protected = vec![false; temp_count];

    program.for_each_instruction(|_, _, ins| {
        for temp in ins.src.iter().chain(std::iter::once(&ins.dest)) {
            let Some(slot) = node_index(*temp, temp_count) else {
                continue;
            };

            cost[slot] += 1;
            if ins.no_spill {
                protected[slot] = true;
            }
        }
    });

    let mut best: Option<(Temp, u32, u32)> = None;

    for temp in 0..temp_count {
        if classes[temp] != spill_class || protected[temp] || lcra.is_forced(temp) {
            continue;
        }

        if cost[temp] == 0 {
            continue;
        }

        let mass = lcra.constraint_mass(temp);

        // Highest mass-to-cost ratio wins, compared without division.
        let better = match best {
            None => true,
            Some((_, best_mass, best_cost)) => {
                mass as u64 * best_cost as u64 > best_mass as u64 * cost[temp] as u64
            }
        };

        if better {
            best = Some((temp as Temp, mass, cost[temp]));
        }
    }

    best.map(|(temp, _, _)| temp)
        .ok_or(RegAllocError::NoSpillCandidate)
}

fn node_index(temp: Temp, temp_count: usize) -> Option<usize> {
    if temp == UNUSED || midgard_mir::is_fixed(temp) || temp as usize >= temp_count {
        None
    } else {
        Some(temp as usize)
    }
}

fn sites_of(program: &Program, temp: Temp) -> (Vec<(BlockId, InsRef)>, Vec<(BlockId, InsRef)>) {
    let mut defs = Vec::new();
    let mut uses = Vec::new();

    program.for_each_instruction(|id, r, ins| {
        if ins.dest == temp {
            defs.push((id, r));
        }
        if ins.reads(temp) {
            uses.push((id, r));
        }
    });

    (defs, uses)
}

/// Evict `temp` from the register file. Returns the TLS bytes consumed.
pub fn spill(program: &mut Program, temp: Temp, class: RegClass, meta: &mut Metadata) -> u32 {
    debug!("spilling t{} ({:?})", temp, class);

    if class == RegClass::Work {
        spill_to_tls(program, temp, meta)
    } else {
        demote(program, temp);
        0
    }
}

/// TLS spill: the value is flushed right after each definition and refilled
/// into a throwaway temporary right before each read. The defining
/// instructions are marked `no_spill`, leaving only the tiny def-to-store
/// ranges in the register file.
fn spill_to_tls(program: &mut Program, temp: Temp, meta: &mut Metadata) -> u32 {
    let offset = meta.tls_size as i32;
    let (defs, uses) = sites_of(program, temp);

    for (id, r) in defs {
        let def_mask = program.block(id).get(r).mask;

        let mut store = Instruction::store(temp, UNUSED, offset);
        store.mask = def_mask;
        store.no_spill = true;

        let block = program.block_mut(id);
        block.insert_after_scheduled(r, store, Tag::LoadStore);
        block.get_mut(r).no_spill = true;
        meta.spill_count += 1;
    }

    for (id, r) in uses {
        let fill = program.alloc_temp();

        let mut load = Instruction::load(midgard_mir::ops::LdstOp::Load, fill, UNUSED, offset);
        load.no_spill = true;

        let block = program.block_mut(id);
        block.insert_before_scheduled(r, load, Tag::LoadStore);
        block.get_mut(r).rewrite_src(temp, fill);
        meta.fill_count += 1;
    }

    16
}

/// Special-class eviction: keep the value in a work register and copy it
/// into a fresh, unspillable special temporary at each consuming site.
fn demote(program: &mut Program, temp: Temp) {
    let work = program.alloc_temp();
    program.rewrite_dest(temp, work);

    let (_, uses) = sites_of(program, temp);

    for (id, r) in uses {
        let special = program.alloc_temp();

        let mut copy = Instruction::mov(special, work);
        copy.no_spill = true;

        let block = program.block_mut(id);
        if block.is_scheduled() {
            copy.unit = Some(midgard_mir::Unit::Vmul);
            block.insert_before_scheduled(r, copy, Tag::Alu4);
        } else {
            block.insert_before(r, copy);
        }

        block.get_mut(r).rewrite_src(temp, special);
    }
}
