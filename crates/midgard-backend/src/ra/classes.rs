//! Register classes and special-read lowering.
//!
//! The register file is segmented: general work registers, the load/store
//! pipe's operand registers, and the texture pipe's read and write
//! registers. A temporary lives in exactly one segment, decided by who reads
//! it; a value read from more than one pipe first gets split with copies so
//! each class sees its own temporary.

use log::trace;
use midgard_mir::{is_fixed, Instruction, KindClass, Program, Tag, Temp, Unit, UNUSED};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RegClass {
    Work,
    LoadStore,
    TexR,
    TexW,
}

const ALU_READ: u8 = 1 << 0;
const LDST_READ: u8 = 1 << 1;
const TEX_READ: u8 = 1 << 2;
const TEX_WRITE: u8 = 1 << 3;

fn collect_uses(program: &Program) -> Vec<u8> {
    let mut uses = vec![0u8; program.temp_count as usize];

    program.for_each_instruction(|_, _, ins| {
        let read_bit = match ins.class() {
            // Branch reads happen on the ALU datapath.
            KindClass::Alu | KindClass::Branch => ALU_READ,
            KindClass::LoadStore => LDST_READ,
            KindClass::Texture => TEX_READ,
        };

        for src in ins.src {
            if src != UNUSED && !is_fixed(src) {
                uses[src as usize] |= read_bit;
            }
        }

        if ins.class() == KindClass::Texture && ins.dest != UNUSED && !is_fixed(ins.dest) {
            uses[ins.dest as usize] |= TEX_WRITE;
        }
    });

    uses
}

/// Split temporaries read from more than one pipe. Load/store and texture
/// reads of a shared value are each routed through a fresh copy, inserted as
/// its own bundle just before the consumer; only that consumer's source slot
/// is rewritten. Idempotent once every temp has a single read class.
pub fn lower_special_reads(program: &mut Program) {
    let uses = collect_uses(program);

    for temp in 0..program.temp_count {
        let mask = uses[temp as usize];

        let ldst = mask & LDST_READ != 0;
        let texr = mask & TEX_READ != 0;
        let alur = mask & ALU_READ != 0;

        if ldst && (alur || texr) {
            split_reads(program, temp, KindClass::LoadStore);
        }

        if texr && (alur || ldst) {
            split_reads(program, temp, KindClass::Texture);
        }
    }
}

fn split_reads(program: &mut Program, temp: Temp, class: KindClass) {
    let mut sites = Vec::new();
    program.for_each_instruction(|id, r, ins| {
        if ins.class() == class && ins.reads(temp) {
            sites.push((id, r));
        }
    });

    for (id, r) in sites {
        let copy_dest = program.alloc_temp();
        let mut copy = Instruction::mov(copy_dest, temp);

        let block = program.block_mut(id);
        if block.is_scheduled() {
            copy.unit = Some(Unit::Vmul);
            block.insert_before_scheduled(r, copy, Tag::Alu4);
        } else {
            block.insert_before(r, copy);
        }

        block.get_mut(r).rewrite_src(temp, copy_dest);
        trace!("split {:?} read of t{} through t{}", class, temp, copy_dest);
    }
}

/// Home class of every temporary. Must run after [`lower_special_reads`];
/// the classes are unambiguous by then.
pub fn classify(program: &Program) -> Vec<RegClass> {
    let uses = collect_uses(program);

    uses.iter()
        .map(|mask| {
            if mask & TEX_WRITE != 0 {
                RegClass::TexW
            } else if mask & TEX_READ != 0 {
                RegClass::TexR
            } else if mask & LDST_READ != 0 {
                RegClass::LoadStore
            } else {
                RegClass::Work
            }
        })
        .collect()
}
