//! Human-readable MIR dumps, for pass debugging and allocation failure
//! diagnostics.

use pretty::{Arena, DocAllocator, DocBuilder};

use crate::block::{Block, Bundle};
use crate::instruction::{
    is_fixed, unfix, BranchTarget, Instruction, Kind, Temp, UNUSED,
};
use crate::mask::Size;
use crate::program::{BlockId, Program};

pub struct Prettier<'a> {
    allocator: Arena<'a>,
    width: usize,
}

impl<'a> Prettier<'a> {
    pub fn new() -> Self {
        Self {
            allocator: Arena::new(),
            width: 100,
        }
    }

    #[must_use]
    pub fn pretty_program(&'a self, program: &Program) -> String {
        let blocks = program
            .block_ids()
            .map(|id| self.doc_block(id, program.block(id)));

        let doc = self.allocator.intersperse(blocks, self.allocator.line());
        self.render(doc)
    }

    #[must_use]
    pub fn pretty_instruction(&'a self, ins: &Instruction) -> String {
        let doc = self.doc_instruction(ins);
        self.render(doc)
    }

    fn render(&'a self, doc: DocBuilder<'a, Arena<'a>>) -> String {
        let mut res = Vec::new();
        doc.render(self.width, &mut res).unwrap();
        String::from_utf8(res).unwrap()
    }

    fn doc_block(&'a self, id: BlockId, block: &Block) -> DocBuilder<'a, Arena<'a>> {
        let header = self
            .allocator
            .text(format!("block{}:", id.0))
            .append(self.allocator.line());

        if block.is_scheduled() {
            let bundles = block
                .bundles
                .iter()
                .map(|bundle| self.doc_bundle(block, bundle));
            header
                .append(self.allocator.intersperse(bundles, self.allocator.line()))
                .append(self.allocator.line())
        } else {
            let body = block
                .body()
                .iter()
                .map(|r| self.doc_instruction(block.get(*r)).indent(2));
            header
                .append(self.allocator.intersperse(body, self.allocator.line()))
                .append(self.allocator.line())
        }
    }

    fn doc_bundle(&'a self, block: &Block, bundle: &Bundle) -> DocBuilder<'a, Arena<'a>> {
        let mut doc = self
            .allocator
            .text(format!("  {{ {:?}", bundle.tag))
            .append(self.allocator.line());

        for r in bundle.instructions.iter() {
            doc = doc
                .append(self.doc_instruction(block.get(*r)).indent(4))
                .append(self.allocator.line());
        }

        if bundle.has_blend_constant {
            doc = doc
                .append(self.allocator.text("    blend constant").indent(0))
                .append(self.allocator.line());
        } else if bundle.constant_count > 0 {
            let words = &bundle.constants[..bundle.constant_count as usize];
            doc = doc
                .append(self.allocator.text(format!("    constants {:#x?}", words)))
                .append(self.allocator.line());
        }

        doc.append(self.allocator.text("  }"))
    }

    fn doc_instruction(&'a self, ins: &Instruction) -> DocBuilder<'a, Arena<'a>> {
        let unit = match ins.unit {
            Some(unit) => format!("{:?}.", unit).to_lowercase(),
            None => String::new(),
        };

        let op = match &ins.kind {
            Kind::Alu { op } => format!("{:?}", op).to_lowercase(),
            Kind::LoadStore { op, offset } => {
                format!("{:?}+{}", op, offset).to_lowercase()
            }
            Kind::Texture { op, out_of_order } => {
                format!("{:?}.ooo{}", op, out_of_order).to_lowercase()
            }
            Kind::Branch {
                target, writeout, ..
            } => {
                let target = match target {
                    BranchTarget::None => "writeout".to_string(),
                    BranchTarget::Block(id) => format!("block{}", id.0),
                    BranchTarget::Discard => "discard".to_string(),
                };
                if *writeout {
                    format!("br.writeout {}", target)
                } else {
                    format!("br {}", target)
                }
            }
        };

        let mut text = format!("{}{}", unit, op);

        if ins.dest != UNUSED {
            text.push_str(&format!(
                " {}.{}",
                temp_name(ins.dest),
                mask_name(ins.mask, ins.size)
            ));
        }

        for (slot, src) in ins.src.iter().enumerate() {
            if *src == UNUSED {
                continue;
            }

            text.push_str(&format!(
                ", {}.{}",
                temp_name(*src),
                swizzle_name(&ins.swizzle[slot], ins.size)
            ));
        }

        if ins.has_constants {
            text.push_str(&format!(" #{:x?}", ins.constants));
        }

        self.allocator.text(text)
    }
}

impl<'a> Default for Prettier<'a> {
    fn default() -> Self {
        Self::new()
    }
}

fn temp_name(temp: Temp) -> String {
    if is_fixed(temp) {
        format!("r{}", unfix(temp))
    } else {
        format!("t{}", temp)
    }
}

const LANES: [char; 16] = [
    'x', 'y', 'z', 'w', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p',
];

fn mask_name(mask: u16, size: Size) -> String {
    let mut out = String::new();
    for lane in 0..size.lanes() {
        if mask & (1 << lane) != 0 {
            out.push(LANES[lane as usize]);
        }
    }
    out
}

fn swizzle_name(swizzle: &[u8; 16], size: Size) -> String {
    let mut out = String::new();
    for lane in 0..size.lanes().min(4) {
        out.push(LANES[swizzle[lane as usize] as usize]);
    }
    out
}
