//! Basic blocks and scheduled bundles.
//!
//! A block owns its instructions in an arena with stable indices. Before
//! scheduling, program order lives in `body`; the scheduler consumes `body`
//! and produces `bundles`, which reference the same arena. Splicing an
//! instruction in or out never moves storage, so bundle references stay
//! valid across spill rewrites.

use crate::instruction::Instruction;
use crate::program::BlockId;

/// A stable reference into a block's instruction arena.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InsRef(pub u32);

/// Bundle tag, encoding the width class of the emitted instruction word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tag {
    Alu4,
    Alu8,
    Alu12,
    Alu16,
    LoadStore,
    Texture,
}

impl Tag {
    pub fn quadwords(self) -> u32 {
        match self {
            Tag::Alu4 | Tag::LoadStore | Tag::Texture => 1,
            Tag::Alu8 => 2,
            Tag::Alu12 => 3,
            Tag::Alu16 => 4,
        }
    }

    pub fn is_alu(self) -> bool {
        matches!(self, Tag::Alu4 | Tag::Alu8 | Tag::Alu12 | Tag::Alu16)
    }
}

/// A VLIW co-issue group: up to five ALU ops plus a branch, two load/stores,
/// or a single texture op, sharing one instruction word.
#[derive(Clone, Debug)]
pub struct Bundle {
    pub tag: Tag,
    pub instructions: Vec<InsRef>,

    /// Embedded 128-bit constant pool shared by the whole bundle.
    pub constants: [u32; 4],
    pub constant_count: u8,
    pub has_blend_constant: bool,
}

impl Bundle {
    pub fn single(tag: Tag, ins: InsRef) -> Self {
        Self {
            tag,
            instructions: vec![ins],
            constants: [0; 4],
            constant_count: 0,
            has_blend_constant: false,
        }
    }

    pub fn has_embedded_constants(&self) -> bool {
        self.constant_count > 0 || self.has_blend_constant
    }
}

#[derive(Debug, Default)]
pub struct Block {
    arena: Vec<Instruction>,
    body: Vec<InsRef>,

    pub bundles: Vec<Bundle>,

    pub successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,

    /// Emitted size of this block, maintained by the scheduler. Branch
    /// offsets are resolved against it downstream.
    pub quadword_count: u32,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ins: Instruction) -> InsRef {
        let r = self.alloc(ins);
        self.body.push(r);
        r
    }

    /// Add an instruction to the arena without placing it in program order.
    pub fn alloc(&mut self, ins: Instruction) -> InsRef {
        let r = InsRef(self.arena.len() as u32);
        self.arena.push(ins);
        r
    }

    pub fn get(&self, r: InsRef) -> &Instruction {
        &self.arena[r.0 as usize]
    }

    pub fn get_mut(&mut self, r: InsRef) -> &mut Instruction {
        &mut self.arena[r.0 as usize]
    }

    pub fn is_scheduled(&self) -> bool {
        !self.bundles.is_empty()
    }

    pub fn body(&self) -> &[InsRef] {
        &self.body
    }

    pub fn take_body(&mut self) -> Vec<InsRef> {
        std::mem::take(&mut self.body)
    }

    /// Current program order: `body` before scheduling, flattened bundles
    /// after.
    pub fn order(&self) -> Vec<InsRef> {
        if self.is_scheduled() {
            self.bundles
                .iter()
                .flat_map(|bundle| bundle.instructions.iter().copied())
                .collect()
        } else {
            self.body.clone()
        }
    }

    pub fn instruction_count(&self) -> usize {
        if self.is_scheduled() {
            self.bundles.iter().map(|b| b.instructions.len()).sum()
        } else {
            self.body.len()
        }
    }

    /// Detach an instruction from program order. Only valid pre-scheduling;
    /// scheduled rewrites go through the bundle-aware helpers.
    pub fn remove(&mut self, r: InsRef) {
        assert!(!self.is_scheduled());
        self.body.retain(|other| *other != r);
    }

    /// Move an already-placed instruction to just after `anchor` in program
    /// order. Only valid pre-scheduling.
    pub fn move_after(&mut self, anchor: InsRef, r: InsRef) {
        assert!(!self.is_scheduled());
        self.body.retain(|other| *other != r);
        let at = self.position_of(anchor);
        self.body.insert(at + 1, r);
    }

    pub fn insert_before(&mut self, anchor: InsRef, ins: Instruction) -> InsRef {
        assert!(!self.is_scheduled());
        let at = self.position_of(anchor);
        let r = self.alloc(ins);
        self.body.insert(at, r);
        r
    }

    pub fn insert_after(&mut self, anchor: InsRef, ins: Instruction) -> InsRef {
        assert!(!self.is_scheduled());
        let at = self.position_of(anchor);
        let r = self.alloc(ins);
        self.body.insert(at + 1, r);
        r
    }

    /// Splice an instruction in before `anchor` post-scheduling, as its own
    /// single-instruction bundle just before the anchor's bundle.
    pub fn insert_before_scheduled(&mut self, anchor: InsRef, ins: Instruction, tag: Tag) -> InsRef {
        assert!(self.is_scheduled());
        let at = self.bundle_of(anchor);
        let r = self.alloc(ins);
        self.bundles.insert(at, Bundle::single(tag, r));
        self.quadword_count += tag.quadwords();
        r
    }

    /// Splice an instruction in after `anchor`'s bundle post-scheduling.
    pub fn insert_after_scheduled(&mut self, anchor: InsRef, ins: Instruction, tag: Tag) -> InsRef {
        assert!(self.is_scheduled());
        let at = self.bundle_of(anchor);
        let r = self.alloc(ins);
        self.bundles.insert(at + 1, Bundle::single(tag, r));
        self.quadword_count += tag.quadwords();
        r
    }

    fn position_of(&self, r: InsRef) -> usize {
        self.body
            .iter()
            .position(|other| *other == r)
            .expect("instruction not in block body")
    }

    fn bundle_of(&self, r: InsRef) -> usize {
        self.bundles
            .iter()
            .position(|bundle| bundle.instructions.contains(&r))
            .expect("instruction not in any bundle")
    }
}
