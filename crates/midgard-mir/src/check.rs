//! Structural MIR consistency checking. Debug aid only: the front-end is
//! trusted, so this never runs in the normal pipeline.

use log::error;

use crate::instruction::{is_fixed, unfix, UNUSED};
use crate::program::Program;

/// Returns `true` if the program is structurally sound.
pub fn check(program: &Program) -> bool {
    let mut checker = MirChecker::new(program);
    checker.check();
    !checker.error
}

struct MirChecker<'a> {
    program: &'a Program,
    error: bool,
}

impl<'a> MirChecker<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self {
            program,
            error: false,
        }
    }

    pub fn check(&mut self) {
        for id in self.program.block_ids() {
            let block = self.program.block(id);

            if block.successors.len() > 2 {
                self.fail(format!(
                    "block{} has {} successors",
                    id.0,
                    block.successors.len()
                ));
            }

            for succ in block.successors.iter() {
                if succ.0 as usize >= self.program.blocks.len() {
                    self.fail(format!("block{} branches to missing block{}", id.0, succ.0));
                    continue;
                }

                if !self.program.block(*succ).predecessors.contains(&id) {
                    self.fail(format!(
                        "edge block{} -> block{} has no matching predecessor",
                        id.0, succ.0
                    ));
                }
            }

            for r in block.order() {
                let ins = block.get(r);

                self.check_temp(ins.dest);
                for src in ins.src {
                    self.check_temp(src);
                }

                if ins.dest != UNUSED && ins.mask == 0 && !ins.is_branch() {
                    self.fail("definition with an empty write mask".to_string());
                }
            }
        }
    }

    fn check_temp(&mut self, temp: u32) {
        if temp == UNUSED {
            return;
        }

        if is_fixed(temp) {
            if unfix(temp) >= 32 {
                self.fail(format!("fixed register r{} out of range", unfix(temp)));
            }
        } else if temp >= self.program.temp_count {
            self.fail(format!(
                "temporary t{} outside the namespace of {}",
                temp, self.program.temp_count
            ));
        }
    }

    fn fail(&mut self, message: String) {
        error!("mir check: {}", message);
        self.error = true;
    }
}
