//! Dense temporary renumbering.
//!
//! Spilling and lowering leave gaps in the temporary namespace; the solver's
//! cost is quadratic in the node count, so every allocation attempt first
//! renumbers the live temporaries densely in first-appearance order.

use std::collections::HashMap;

use midgard_mir::{is_fixed, Program, Temp, UNUSED};

/// The old-to-new mapping built by [`squeeze`]. Kept by the caller so that
/// anything indexed by the old numbering can be carried across the rename.
#[derive(Debug, Default)]
pub struct TempRemap {
    map: HashMap<Temp, Temp>,
    next: Temp,
}

impl TempRemap {
    fn remap(&mut self, temp: Temp) -> Temp {
        if temp == UNUSED || is_fixed(temp) {
            return temp;
        }

        match self.map.get(&temp) {
            Some(new) => *new,
            None => {
                let new = self.next;
                self.next += 1;
                self.map.insert(temp, new);
                new
            }
        }
    }

    pub fn get(&self, temp: Temp) -> Option<Temp> {
        self.map.get(&temp).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Renumber every temporary in program order. New indices are assigned in
/// order of first appearance, so the result is deterministic and squeezing
/// an already-dense program is the identity.
pub fn squeeze(program: &mut Program, remap: &mut TempRemap) {
    program.for_each_instruction_mut(|_, _, ins| {
        if ins.dest != UNUSED {
            ins.dest = remap.remap(ins.dest);
        }

        for src in ins.src.iter_mut() {
            if *src != UNUSED {
                *src = remap.remap(*src);
            }
        }
    });

    program.temp_count = remap.next;
}
