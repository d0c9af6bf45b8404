//! VLIW bundle scheduling.
//!
//! Greedy in-order list scheduling: each block's instruction stream is
//! consumed front to back, packing as many consecutive instructions into a
//! bundle as the unit, hazard and constant-pool rules allow. ALU bundles
//! hold up to five ALU ops plus a branch, load/store bundles hold two memory
//! ops, texture bundles hold one.

use log::{debug, trace};
use midgard_mir::ops::AluOp;
use midgard_mir::{
    BlockId, Bundle, InsRef, Instruction, Kind, KindClass, Program, Tag, Unit,
};

pub mod constants;
pub mod hazard;
pub mod pair;
pub mod texture;
pub mod writeout;

pub use pair::pair_load_store;
pub use texture::set_texture_ooo_hints;

/// Unit claim order within a bundle. An instruction may only take a unit
/// strictly later in this sequence than the last one claimed.
const CLAIM_ORDER: [Unit; 5] = [Unit::Vmul, Unit::Sadd, Unit::Vadd, Unit::Smul, Unit::Vlut];

pub fn schedule_program(program: &mut Program) {
    for id in program.block_ids().collect::<Vec<_>>() {
        schedule_block(program, id);
    }

    set_texture_ooo_hints(program);

    let bundles: usize = program
        .block_ids()
        .map(|id| program.block(id).bundles.len())
        .sum();
    debug!("scheduled {} bundle(s)", bundles);
}

fn schedule_block(program: &mut Program, id: BlockId) {
    let body = program.block_mut(id).take_body();
    let mut bundles = Vec::new();
    let mut i = 0;

    while i < body.len() {
        let class = program.block(id).get(body[i]).class();

        let bundle = match class {
            KindClass::Texture => {
                i += 1;
                Bundle::single(Tag::Texture, body[i - 1])
            }

            KindClass::LoadStore => {
                let mut bundle = Bundle::single(Tag::LoadStore, body[i]);
                i += 1;

                // A second memory op co-issues if it is register-independent
                // of the first; memory order within the pair is preserved by
                // the pipe itself.
                if i < body.len() {
                    let block = program.block(id);
                    let first = block.get(body[i - 1]);
                    let second = block.get(body[i]);

                    if second.class() == KindClass::LoadStore
                        && hazard::can_run_concurrent_ssa(first, second)
                    {
                        bundle.instructions.push(body[i]);
                        i += 1;
                    }
                }

                bundle
            }

            KindClass::Alu | KindClass::Branch => {
                let (bundle, consumed) = schedule_alu_bundle(program, id, &body[i..]);
                i += consumed;
                bundle
            }
        };

        trace!(
            "bundle {:?} with {} instruction(s)",
            bundle.tag,
            bundle.instructions.len()
        );
        bundles.push(bundle);
    }

    let block = program.block_mut(id);
    block.quadword_count = bundles.iter().map(|b| b.tag.quadwords()).sum();
    block.bundles = bundles;
}

/// Pack a maximal ALU bundle from the front of `rest`. Consumes at least one
/// instruction. The returned bundle's members have their units assigned and
/// any inline constants folded into the shared pool.
fn schedule_alu_bundle(program: &mut Program, id: BlockId, rest: &[InsRef]) -> (Bundle, usize) {
    let mut bundle = Bundle::single(Tag::Alu4, rest[0]);
    bundle.instructions.clear();

    let mut used_units = 0u8;
    let mut last_order = -1i32;
    let mut consumed = 0;

    for &r in rest {
        let ins = program.block(id).get(r).clone();

        match ins.class() {
            KindClass::LoadStore | KindClass::Texture => break,

            KindClass::Branch => {
                if ins.is_writeout()
                    && !writeout::can_writeout_fragment(
                        program.block(id),
                        &bundle.instructions,
                        &ins,
                    )
                {
                    if !bundle.instructions.is_empty() {
                        // Close and retry the branch at the head of a fresh
                        // bundle, where a move can fix things up.
                        break;
                    }

                    inject_writeout_mov(program, id, r, &mut bundle);
                }

                program.block_mut(id).get_mut(r).unit = Some(Unit::Branch);
                bundle.instructions.push(r);
                consumed += 1;

                // The branch slot is last; nothing issues after it.
                break;
            }

            KindClass::Alu => {
                let Kind::Alu { op } = ins.kind else { unreachable!() };

                let Some(unit) = pick_unit(op, &ins, used_units, last_order) else {
                    break;
                };

                if conflicts(program.block(id), &bundle.instructions, &ins) {
                    break;
                }

                if !constants::try_embed_constants(&mut bundle, program.block_mut(id).get_mut(r)) {
                    break;
                }

                program.block_mut(id).get_mut(r).unit = Some(unit);
                bundle.instructions.push(r);
                used_units |= unit.bit();
                last_order = unit.order() as i32;
                consumed += 1;
            }
        }
    }

    bundle.tag = alu_tag(program.block(id), &bundle);
    (bundle, consumed)
}

/// Lowest free unit this op can issue on, respecting the strictly increasing
/// claim order. Single-component ops additionally qualify for the scalar
/// pipes.
fn pick_unit(op: AluOp, ins: &Instruction, used_units: u8, last_order: i32) -> Option<Unit> {
    let props = op.props();
    let scalar_bits = Unit::Sadd.bit() | Unit::Smul.bit();

    let mut allowed = props.units;
    if props.scalar_capable && ins.mask.count_ones() == 1 {
        allowed |= scalar_bits;
    } else {
        allowed &= !scalar_bits;
    }

    CLAIM_ORDER.into_iter().find(|unit| {
        allowed & unit.bit() != 0
            && used_units & unit.bit() == 0
            && (unit.order() as i32) > last_order
    })
}

fn conflicts(block: &midgard_mir::Block, members: &[InsRef], later: &Instruction) -> bool {
    members
        .iter()
        .any(|member| !hazard::can_run_concurrent_ssa(block.get(*member), later))
}

/// Break a writeout hazard by copying the color value through a fresh
/// temporary inside the branch's own bundle. The copy satisfies every
/// writeout condition: full mask, multiplier pipe, no same-bundle inputs.
fn inject_writeout_mov(program: &mut Program, id: BlockId, branch: InsRef, bundle: &mut Bundle) {
    let source = program.block(id).get(branch).src[0];
    let temp = program.alloc_temp();

    let mut copy = Instruction::mov(temp, source);
    copy.unit = Some(Unit::Vmul);
    copy.no_spill = true;

    let r = program.block_mut(id).alloc(copy);
    bundle.instructions.push(r);

    program.block_mut(id).get_mut(branch).rewrite_src(source, temp);
    trace!("injected writeout copy through t{}", temp);
}

/// Width class of a finished ALU bundle: a 4-byte control word, the member
/// encodings, and 16 bytes for the constant block if used, rounded up to
/// quadwords.
fn alu_tag(block: &midgard_mir::Block, bundle: &Bundle) -> Tag {
    let mut bytes = 4u32;

    for r in &bundle.instructions {
        let ins = block.get(*r);

        bytes += match ins.kind {
            Kind::Branch { compact, .. } => {
                if compact {
                    2
                } else {
                    6
                }
            }
            _ if ins.unit.map(Unit::is_scalar).unwrap_or(false) => 4,
            _ => 6,
        };
    }

    if bundle.has_embedded_constants() {
        bytes += 16;
    }

    match (bytes + 15) / 16 {
        1 => Tag::Alu4,
        2 => Tag::Alu8,
        3 => Tag::Alu12,
        _ => Tag::Alu16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midgard_mir::ops::{LdstOp, TexOp};
    use midgard_mir::{fixed_register, Stage, CONSTANT_REGISTER, UNUSED};

    fn compute_program() -> Program {
        let mut program = Program::new(Stage::Compute);
        program.temp_count = 64;
        program
    }

    fn scalar_fadd(dest: u32, a: u32, b: u32) -> Instruction {
        let mut ins = Instruction::alu(AluOp::Fadd, dest, a, b);
        ins.mask = 0b0001;
        ins
    }

    #[test]
    fn single_component_adds_fill_three_units() {
        let mut program = compute_program();
        let b = program.add_block();

        for dest in 0..6 {
            program.block_mut(b).push(scalar_fadd(dest, 10, 11));
        }

        schedule_program(&mut program);

        let block = program.block(b);
        assert_eq!(block.bundles.len(), 2);

        for bundle in &block.bundles {
            assert_eq!(bundle.instructions.len(), 3);

            // Units claimed in strictly increasing order, none reused.
            let orders: Vec<u8> = bundle
                .instructions
                .iter()
                .map(|r| block.get(*r).unit.unwrap().order())
                .collect();
            assert!(orders.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn dependent_vector_ops_never_share_a_bundle() {
        let mut program = compute_program();
        let b = program.add_block();

        program
            .block_mut(b)
            .push(Instruction::alu(AluOp::Fmul, 0, 1, 2));
        program
            .block_mut(b)
            .push(Instruction::alu(AluOp::Fadd, 3, 0, 2));

        schedule_program(&mut program);

        let block = program.block(b);
        assert_eq!(block.bundles.len(), 2);
        assert_eq!(block.bundles[0].instructions.len(), 1);
    }

    #[test]
    fn independent_mul_and_add_share_a_bundle() {
        let mut program = compute_program();
        let b = program.add_block();

        program
            .block_mut(b)
            .push(Instruction::alu(AluOp::Fmul, 0, 1, 2));
        program
            .block_mut(b)
            .push(Instruction::alu(AluOp::Fadd, 3, 4, 5));

        schedule_program(&mut program);

        let block = program.block(b);
        assert_eq!(block.bundles.len(), 1);
        assert_eq!(block.bundles[0].instructions.len(), 2);

        let units: Vec<Unit> = block.bundles[0]
            .instructions
            .iter()
            .map(|r| block.get(*r).unit.unwrap())
            .collect();
        assert_eq!(units, vec![Unit::Vmul, Unit::Vadd]);
    }

    #[test]
    fn adjacent_loads_pair_into_one_memory_bundle() {
        let mut program = compute_program();
        let b = program.add_block();

        program
            .block_mut(b)
            .push(Instruction::load(LdstOp::Load, 0, 10, 0));
        program
            .block_mut(b)
            .push(Instruction::load(LdstOp::Load, 1, 10, 16));

        schedule_program(&mut program);

        let block = program.block(b);
        assert_eq!(block.bundles.len(), 1);
        assert_eq!(block.bundles[0].tag, Tag::LoadStore);
        assert_eq!(block.bundles[0].instructions.len(), 2);
    }

    #[test]
    fn dependent_loads_do_not_pair() {
        let mut program = compute_program();
        let b = program.add_block();

        program
            .block_mut(b)
            .push(Instruction::load(LdstOp::Load, 0, 10, 0));
        // Address depends on the first load.
        program
            .block_mut(b)
            .push(Instruction::load(LdstOp::Load, 1, 0, 0));

        schedule_program(&mut program);
        assert_eq!(program.block(b).bundles.len(), 2);
    }

    #[test]
    fn textures_schedule_alone() {
        let mut program = compute_program();
        let b = program.add_block();

        program
            .block_mut(b)
            .push(Instruction::texture(TexOp::Normal, 0, 1));
        program
            .block_mut(b)
            .push(Instruction::texture(TexOp::Normal, 2, 3));

        schedule_program(&mut program);

        let block = program.block(b);
        assert_eq!(block.bundles.len(), 2);
        assert!(block.bundles.iter().all(|b| b.tag == Tag::Texture));
        assert_eq!(block.quadword_count, 2);
    }

    #[test]
    fn writeout_forwards_from_a_same_bundle_producer() {
        let mut program = Program::new(Stage::Fragment);
        program.temp_count = 64;
        let b = program.add_block();

        program
            .block_mut(b)
            .push(Instruction::alu(AluOp::Fadd, 0, 1, 2));
        program.block_mut(b).push(Instruction::writeout(0));

        schedule_program(&mut program);

        // Full write on a non-LUT unit: the branch rides along.
        let block = program.block(b);
        assert_eq!(block.bundles.len(), 1);
        assert_eq!(block.bundles[0].instructions.len(), 2);
    }

    #[test]
    fn writeout_of_a_lut_result_goes_through_a_copy() {
        let mut program = Program::new(Stage::Fragment);
        program.temp_count = 64;
        let b = program.add_block();

        let mut rcp = Instruction::alu(AluOp::Frcp, 0, 1, UNUSED);
        rcp.src[1] = UNUSED;
        program.block_mut(b).push(rcp);
        program.block_mut(b).push(Instruction::writeout(0));

        schedule_program(&mut program);

        let block = program.block(b);
        assert_eq!(block.bundles.len(), 2);

        // Second bundle is the injected copy plus the branch.
        let members = &block.bundles[1].instructions;
        assert_eq!(members.len(), 2);

        let copy = block.get(members[0]);
        assert_eq!(copy.unit, Some(Unit::Vmul));
        assert_eq!(copy.src[0], 0);

        let branch = block.get(members[1]);
        assert!(branch.is_writeout());
        assert_eq!(branch.src[0], copy.dest);
    }

    #[test]
    fn constant_pool_overflow_closes_the_bundle() {
        let mut program = compute_program();
        let b = program.add_block();

        let constant = fixed_register(CONSTANT_REGISTER);

        let mut a = Instruction::alu(AluOp::Fmul, 0, 1, constant);
        a.constants = [1, 2, 3, 4];
        a.has_constants = true;

        let mut c = Instruction::alu(AluOp::Fadd, 2, 3, constant);
        c.constants = [5, 6, 7, 8];
        c.has_constants = true;

        program.block_mut(b).push(a);
        program.block_mut(b).push(c);

        schedule_program(&mut program);

        let block = program.block(b);
        assert_eq!(block.bundles.len(), 2);
        assert_eq!(block.bundles[0].constants, [1, 2, 3, 4]);
        assert_eq!(block.bundles[1].constants[..4], [5, 6, 7, 8]);
    }

    #[test]
    fn bundle_tags_track_encoded_width() {
        let mut program = compute_program();
        let b = program.add_block();

        // One vector op: 4 + 6 bytes, one quadword.
        program
            .block_mut(b)
            .push(Instruction::alu(AluOp::Fmul, 0, 1, 2));
        schedule_program(&mut program);
        assert_eq!(program.block(b).bundles[0].tag, Tag::Alu4);
        assert_eq!(program.block(b).quadword_count, 1);
    }
}
