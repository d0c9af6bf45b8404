use crate::block::{Block, InsRef};
use crate::instruction::{KindClass, Temp, UNUSED};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Vertex,
    Fragment,
    Compute,
}

/// Per-revision hardware quirks that gate scheduling and allocation
/// decisions.
#[derive(Clone, Copy, Debug, Default)]
pub struct Quirks {
    /// The texture pipe cannot overlap following bundles; suppress
    /// out-of-order hints.
    pub no_ooo_texture: bool,

    /// No dedicated texture registers: texture operands alias the low work
    /// registers instead.
    pub interpipe_aliasing: bool,
}

/// A whole shader in MIR form: blocks, CFG edges, and the temporary
/// namespace. Produced by the (external) instruction selector.
#[derive(Debug)]
pub struct Program {
    pub blocks: Vec<Block>,
    pub entry: BlockId,
    pub temp_count: u32,
    pub stage: Stage,
    pub quirks: Quirks,

    /// First uniform register not promoted into the register file; part of
    /// the shader metadata contract.
    pub uniform_cutoff: u8,
}

impl Program {
    pub fn new(stage: Stage) -> Self {
        Self {
            blocks: Vec::new(),
            entry: BlockId(0),
            temp_count: 0,
            stage,
            quirks: Quirks::default(),
            uniform_cutoff: 0,
        }
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new());
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        let block = self.block_mut(from);
        assert!(block.successors.len() < 2, "blocks have at most two exits");
        block.successors.push(to);
        self.block_mut(to).predecessors.push(from);
    }

    pub fn alloc_temp(&mut self) -> Temp {
        let temp = self.temp_count;
        self.temp_count += 1;
        temp
    }

    pub fn block_ids(&self) -> impl DoubleEndedIterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// Visit every instruction in the program, in program order.
    pub fn for_each_instruction(&self, mut f: impl FnMut(BlockId, InsRef, &crate::Instruction)) {
        for id in self.block_ids() {
            let block = self.block(id);
            for r in block.order() {
                f(id, r, block.get(r));
            }
        }
    }

    pub fn for_each_instruction_mut(
        &mut self,
        mut f: impl FnMut(BlockId, InsRef, &mut crate::Instruction),
    ) {
        for id in 0..self.blocks.len() {
            let id = BlockId(id as u32);
            let order = self.block(id).order();
            let block = self.block_mut(id);
            for r in order {
                f(id, r, block.get_mut(r));
            }
        }
    }

    /// Replace every read of `old` with `new`, program-wide.
    pub fn rewrite_source(&mut self, old: Temp, new: Temp) {
        if old == UNUSED {
            return;
        }

        self.for_each_instruction_mut(|_, _, ins| ins.rewrite_src(old, new));
    }

    /// Replace every write of `old` with `new`, program-wide.
    pub fn rewrite_dest(&mut self, old: Temp, new: Temp) {
        if old == UNUSED {
            return;
        }

        self.for_each_instruction_mut(|_, _, ins| {
            if ins.dest == old {
                ins.dest = new;
            }
        });
    }

    /// Replace reads of `old` with `new`, but only in instructions of the
    /// given class. Used when a temporary must be split across register
    /// files.
    pub fn rewrite_source_tagged(&mut self, old: Temp, new: Temp, class: KindClass) {
        if old == UNUSED {
            return;
        }

        self.for_each_instruction_mut(|_, _, ins| {
            if ins.class() == class {
                ins.rewrite_src(old, new);
            }
        });
    }
}
