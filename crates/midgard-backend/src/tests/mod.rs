//! Whole-pipeline tests: build a small MIR program, run `compile`, and check
//! the scheduled, allocated output against the invariants the hardware
//! relies on.

use midgard_mir::ops::AluOp;
use midgard_mir::{
    check, fixed_register, BlockId, Instruction, Program, Stage, Temp, CONSTANT_REGISTER,
};

use crate::schedule::hazard::can_run_concurrent_ssa;
use crate::schedule::writeout::can_writeout_fragment;
use crate::{compile, BackendError, RegAllocError};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn single_block(stage: Stage) -> (Program, BlockId) {
    let mut program = Program::new(stage);
    let b = program.add_block();
    (program, b)
}

/// Invariants every scheduled ALU bundle must satisfy: units unique and
/// claimed in increasing order, no co-issue hazard between members, constant
/// budget respected, writeout preconditions met.
fn assert_bundles_valid(program: &Program) {
    for id in program.block_ids() {
        let block = program.block(id);

        for bundle in &block.bundles {
            if !bundle.tag.is_alu() {
                continue;
            }

            let members: Vec<&Instruction> = bundle
                .instructions
                .iter()
                .map(|r| block.get(*r))
                .collect();

            let mut seen = 0u8;
            let mut last = -1i32;
            for ins in &members {
                let unit = ins.unit.expect("scheduled instruction without a unit");
                assert_eq!(seen & unit.bit(), 0, "unit issued twice in one bundle");
                seen |= unit.bit();
                assert!((unit.order() as i32) > last, "units not claimed in order");
                last = unit.order() as i32;
            }

            for i in 0..members.len() {
                for j in i + 1..members.len() {
                    // Branch reads happen at writeout, checked separately.
                    if members[j].is_branch() {
                        continue;
                    }
                    assert!(
                        can_run_concurrent_ssa(members[i], members[j]),
                        "co-issue hazard survived scheduling"
                    );
                }
            }

            assert!(bundle.constant_count <= 4);
            if bundle.has_blend_constant {
                assert_eq!(bundle.constant_count, 0);
            }

            for ins in &members {
                if ins.is_writeout() {
                    assert!(can_writeout_fragment(block, &bundle.instructions, ins));
                }
            }
        }
    }
}

#[test]
fn scenario_independent_scalar_adds_pack_tightly() {
    init_logging();
    let (mut program, b) = single_block(Stage::Compute);
    let a = program.alloc_temp();
    let c = program.alloc_temp();

    for reg in 2..8 {
        let mut ins = Instruction::alu(AluOp::Fadd, fixed_register(reg), a, c);
        ins.mask = 0b0001;
        program.block_mut(b).push(ins);
    }

    let meta = compile(&mut program).unwrap();

    // Six independent single-lane adds share scalar and vector pipes; never
    // worse than two per bundle, and every bundle well-formed.
    assert!(meta.bundle_count <= 3);
    assert_bundles_valid(&program);
}

#[test]
fn scenario_raw_dependent_vector_ops_split_bundles() {
    init_logging();
    let (mut program, b) = single_block(Stage::Compute);
    let x = program.alloc_temp();
    let y = program.alloc_temp();
    let t = program.alloc_temp();

    program
        .block_mut(b)
        .push(Instruction::alu(AluOp::Fmul, t, x, y));
    program
        .block_mut(b)
        .push(Instruction::alu(AluOp::Fadd, fixed_register(2), t, y));

    compile(&mut program).unwrap();
    assert_bundles_valid(&program);

    let block = program.block(b);
    let mul_bundle = block
        .bundles
        .iter()
        .position(|bundle| {
            bundle.instructions.iter().any(|r| {
                matches!(block.get(*r).kind, midgard_mir::Kind::Alu { op: AluOp::Fmul })
            })
        })
        .unwrap();
    let add_bundle = block
        .bundles
        .iter()
        .position(|bundle| {
            bundle.instructions.iter().any(|r| {
                matches!(block.get(*r).kind, midgard_mir::Kind::Alu { op: AluOp::Fadd })
            })
        })
        .unwrap();

    assert_ne!(mul_bundle, add_bundle);
}

#[test]
fn scenario_register_pressure_forces_a_spill() {
    init_logging();
    let (mut program, b) = single_block(Stage::Compute);
    let base0 = program.alloc_temp();
    let base1 = program.alloc_temp();

    // Twenty simultaneously live vec4 values against sixteen work registers.
    let values: Vec<Temp> = (0..20)
        .map(|_| {
            let value = program.alloc_temp();
            program
                .block_mut(b)
                .push(Instruction::alu(AluOp::Fadd, value, base0, base1));
            value
        })
        .collect();

    let mut acc = values[0];
    for &value in &values[1..] {
        let next = program.alloc_temp();
        program
            .block_mut(b)
            .push(Instruction::alu(AluOp::Fadd, next, acc, value));
        acc = next;
    }
    program
        .block_mut(b)
        .push(Instruction::mov(fixed_register(2), acc));

    assert!(check(&program));
    let meta = compile(&mut program).unwrap();

    assert!(meta.spill_count >= 1, "expected at least one spill store");
    assert!(meta.fill_count >= 1, "expected at least one fill load");
    assert!(meta.tls_size > 0);
    assert!(meta.work_register_count <= 16);
    assert_bundles_valid(&program);
}

#[test]
fn scenario_deep_pressure_converges_through_many_spills() {
    init_logging();
    let (mut program, b) = single_block(Stage::Compute);
    let base0 = program.alloc_temp();
    let base1 = program.alloc_temp();

    // Forty simultaneously live vec4 values: well past what one round of
    // eviction can relieve, but comfortably allocatable with spilling.
    let values: Vec<Temp> = (0..40)
        .map(|_| {
            let value = program.alloc_temp();
            program
                .block_mut(b)
                .push(Instruction::alu(AluOp::Fadd, value, base0, base1));
            value
        })
        .collect();

    let mut acc = values[0];
    for &value in &values[1..] {
        let next = program.alloc_temp();
        program
            .block_mut(b)
            .push(Instruction::alu(AluOp::Fadd, next, acc, value));
        acc = next;
    }
    program
        .block_mut(b)
        .push(Instruction::mov(fixed_register(2), acc));

    assert!(check(&program));
    let meta = compile(&mut program).unwrap();

    assert!(meta.spill_count >= 1);
    assert!(meta.tls_size >= 16);
    assert!(meta.work_register_count <= 16);
    assert_bundles_valid(&program);
}

#[test]
fn scenario_unspillable_pressure_is_a_clean_error() {
    init_logging();
    let (mut program, b) = single_block(Stage::Compute);
    let base0 = program.alloc_temp();
    let base1 = program.alloc_temp();

    let values: Vec<Temp> = (0..20).map(|_| program.alloc_temp()).collect();

    for &value in &values {
        let mut ins = Instruction::alu(AluOp::Fadd, value, base0, base1);
        ins.no_spill = true;
        program.block_mut(b).push(ins);
    }

    let mut acc = values[0];
    for &value in &values[1..] {
        let next = program.alloc_temp();
        let mut ins = Instruction::alu(AluOp::Fadd, next, acc, value);
        ins.no_spill = true;
        program.block_mut(b).push(ins);
        acc = next;
    }
    let mut out = Instruction::mov(fixed_register(2), acc);
    out.no_spill = true;
    program.block_mut(b).push(out);

    match compile(&mut program) {
        Err(BackendError::RegAlloc(RegAllocError::NoSpillCandidate)) => {}
        other => panic!("expected a no-candidate failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn fragment_writeout_lands_in_the_output_register() {
    init_logging();
    let (mut program, b) = single_block(Stage::Fragment);
    let x = program.alloc_temp();
    let y = program.alloc_temp();
    let color = program.alloc_temp();

    program
        .block_mut(b)
        .push(Instruction::alu(AluOp::Fadd, color, x, y));
    program.block_mut(b).push(Instruction::writeout(color));

    let meta = compile(&mut program).unwrap();
    assert_bundles_valid(&program);

    // The color write is pinned to r0.
    let block = program.block(b);
    let writeout = block
        .order()
        .into_iter()
        .map(|r| block.get(r).clone())
        .find(|ins| ins.is_writeout())
        .unwrap();
    assert_eq!(writeout.src[0], fixed_register(0));
    assert!(meta.work_register_count >= 1);
}

#[test]
fn embedded_constants_stay_within_budget() {
    init_logging();
    let (mut program, b) = single_block(Stage::Compute);
    let x = program.alloc_temp();
    let constant = fixed_register(CONSTANT_REGISTER);

    for reg in 2..6 {
        let mut ins = Instruction::alu(AluOp::Fmul, fixed_register(reg), x, constant);
        ins.constants = [reg, reg + 1, 7, 7];
        ins.has_constants = true;
        program.block_mut(b).push(ins);
    }

    compile(&mut program).unwrap();
    assert_bundles_valid(&program);
}

#[test]
fn metadata_counts_match_the_schedule() {
    init_logging();
    let (mut program, b) = single_block(Stage::Compute);
    let x = program.alloc_temp();
    let y = program.alloc_temp();

    program
        .block_mut(b)
        .push(Instruction::alu(AluOp::Fmul, fixed_register(2), x, y));
    program
        .block_mut(b)
        .push(Instruction::alu(AluOp::Fadd, fixed_register(3), x, y));

    let meta = compile(&mut program).unwrap();

    let block = program.block(b);
    assert_eq!(meta.bundle_count as usize, block.bundles.len());
    assert_eq!(meta.quadword_count, block.quadword_count);
    assert_eq!(
        meta.quadword_count,
        block.bundles.iter().map(|b| b.tag.quadwords()).sum::<u32>()
    );
}

#[test]
fn compilation_is_deterministic() {
    init_logging();

    let build = || {
        let (mut program, b) = single_block(Stage::Compute);
        let base0 = program.alloc_temp();
        let base1 = program.alloc_temp();

        for _ in 0..6 {
            let value = program.alloc_temp();
            program
                .block_mut(b)
                .push(Instruction::alu(AluOp::Fadd, value, base0, base1));
            program
                .block_mut(b)
                .push(Instruction::mov(fixed_register(2), value));
        }

        program
    };

    let mut first = build();
    let mut second = build();

    let meta_first = compile(&mut first).unwrap();
    let meta_second = compile(&mut second).unwrap();
    assert_eq!(meta_first, meta_second);

    for id in first.block_ids() {
        let a = first.block(id);
        let b = second.block(id);
        assert_eq!(a.bundles.len(), b.bundles.len());

        for (x, y) in a.bundles.iter().zip(b.bundles.iter()) {
            assert_eq!(x.tag, y.tag);
            assert_eq!(x.instructions.len(), y.instructions.len());
        }
    }
}
