//! Embedded constant management for ALU bundles.
//!
//! A bundle carries a single 128-bit constant block. Distinct 32-bit values
//! from all member instructions are deduplicated into at most four slots,
//! with each member's constant-register swizzle remapped onto the slots it
//! landed in. The blend constant is a special decode mode that consumes the
//! whole block and cannot coexist with embedded values.

use midgard_mir::{fixed_register, Bundle, Instruction, Size, CONSTANT_REGISTER};

/// Try to fold `ins`'s inline constants into the bundle's pool, remapping
/// the instruction's constant-register swizzle on success. Returns `false`
/// (leaving both untouched) if the pool cannot take them, in which case the
/// caller closes the bundle and retries in a fresh one.
pub fn try_embed_constants(bundle: &mut Bundle, ins: &mut Instruction) -> bool {
    if ins.has_blend_constant {
        // Blend constant is exclusive with everything else.
        if bundle.constant_count > 0 {
            return false;
        }

        bundle.has_blend_constant = true;
        return true;
    }

    if !ins.has_constants {
        return true;
    }

    if bundle.has_blend_constant {
        return false;
    }

    // Sub-word constants are not split and deduplicated; they claim the
    // whole block.
    if ins.size != Size::Bits32 {
        if bundle.constant_count != 0 {
            return false;
        }

        bundle.constants = ins.constants;
        bundle.constant_count = 4;
        return true;
    }

    let mut trial = bundle.constants;
    let mut trial_count = bundle.constant_count;
    let mut remap = [None; 4];

    let constant_reg = fixed_register(CONSTANT_REGISTER);

    for slot in 0..ins.src.len() {
        if ins.src[slot] != constant_reg {
            continue;
        }

        let read = ins.read_mask(slot);
        for lane in 0..ins.size.lanes() {
            if read & (1 << lane) == 0 {
                continue;
            }

            let component = ins.swizzle[slot][lane as usize] as usize;
            debug_assert!(component < 4);

            if remap[component].is_some() {
                continue;
            }

            let word = ins.constants[component];
            let found = trial[..trial_count as usize]
                .iter()
                .position(|other| *other == word);

            let index = match found {
                Some(index) => index,
                None => {
                    if trial_count == 4 {
                        return false;
                    }
                    trial[trial_count as usize] = word;
                    trial_count += 1;
                    (trial_count - 1) as usize
                }
            };

            remap[component] = Some(index as u8);
        }
    }

    // Commit: pool first, then the swizzle rewrite.
    bundle.constants = trial;
    bundle.constant_count = trial_count;

    for slot in 0..ins.src.len() {
        if ins.src[slot] != constant_reg {
            continue;
        }

        for lane in 0..ins.size.lanes() as usize {
            let component = ins.swizzle[slot][lane] as usize;
            if let Some(new) = remap[component] {
                ins.swizzle[slot][lane] = new;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use midgard_mir::ops::AluOp;
    use midgard_mir::{Bundle, InsRef, Tag};

    fn empty_bundle() -> Bundle {
        let mut bundle = Bundle::single(Tag::Alu4, InsRef(0));
        bundle.instructions.clear();
        bundle
    }

    fn with_constants(words: [u32; 4]) -> Instruction {
        let mut ins = Instruction::alu(AluOp::Fadd, 0, 1, fixed_register(CONSTANT_REGISTER));
        ins.constants = words;
        ins.has_constants = true;
        ins
    }

    #[test]
    fn duplicate_values_share_slots() {
        let mut bundle = empty_bundle();

        let mut a = with_constants([7, 7, 7, 7]);
        assert!(try_embed_constants(&mut bundle, &mut a));
        assert_eq!(bundle.constant_count, 1);
        assert_eq!(a.swizzle[1][..4], [0, 0, 0, 0]);

        let mut b = with_constants([7, 9, 9, 7]);
        assert!(try_embed_constants(&mut bundle, &mut b));
        assert_eq!(bundle.constant_count, 2);
        assert_eq!(bundle.constants[..2], [7, 9]);
        assert_eq!(b.swizzle[1][..4], [0, 1, 1, 0]);
    }

    #[test]
    fn overflow_rejects_without_mutating() {
        let mut bundle = empty_bundle();

        let mut a = with_constants([1, 2, 3, 4]);
        assert!(try_embed_constants(&mut bundle, &mut a));
        assert_eq!(bundle.constant_count, 4);

        let mut b = with_constants([5, 6, 7, 8]);
        let before = b.swizzle;
        assert!(!try_embed_constants(&mut bundle, &mut b));
        assert_eq!(b.swizzle, before);
        assert_eq!(bundle.constants, [1, 2, 3, 4]);
    }

    #[test]
    fn blend_constant_is_exclusive() {
        let mut bundle = empty_bundle();

        let mut a = with_constants([1, 1, 1, 1]);
        assert!(try_embed_constants(&mut bundle, &mut a));

        let mut blend = Instruction::alu(AluOp::Fmul, 2, 3, 4);
        blend.has_blend_constant = true;
        assert!(!try_embed_constants(&mut bundle, &mut blend));

        let mut fresh = empty_bundle();
        assert!(try_embed_constants(&mut fresh, &mut blend));
        assert!(fresh.has_blend_constant);

        let mut c = with_constants([1, 1, 1, 1]);
        assert!(!try_embed_constants(&mut fresh, &mut c));
    }
}
