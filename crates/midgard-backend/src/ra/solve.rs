//! Linear-constraint register allocation.
//!
//! Each node (temporary) is assigned an absolute byte offset into the
//! register file; its class restricts the offset to a segment of the file.
//! Interference is not a boolean: two nodes constrain each other through a
//! set of *forbidden offset deltas*, derived from which bytes of each node
//! are actually live. Byte-precise deltas are what let several narrow values
//! pack into one 16-byte register.
//!
//! The solver itself is a greedy first-fit scan per node; failure reports
//! the node that could not be placed so the spiller can relieve its class.

use std::collections::HashMap;
use std::ops::Range;

use lazy_static::lazy_static;
use midgard_mir::Quirks;

use super::classes::RegClass;

lazy_static! {
    /// Byte ranges of each register class within the unified register space
    /// (register `r` owns bytes `16r..16r+16`). Work registers are r0..r15,
    /// the load/store pipe operands live in r26/r27, texture reads and
    /// writes in r28 and r29.
    static ref BASE_RANGES: HashMap<RegClass, Range<u32>> = HashMap::from([
        (RegClass::Work, 0..16 * 16),
        (RegClass::LoadStore, 26 * 16..28 * 16),
        (RegClass::TexR, 28 * 16..29 * 16),
        (RegClass::TexW, 29 * 16..30 * 16),
    ]);
}

/// The register file layout for one target revision.
pub struct RegisterFile {
    ranges: HashMap<RegClass, Range<u32>>,
}

impl RegisterFile {
    pub fn new(quirks: Quirks) -> Self {
        let mut ranges = BASE_RANGES.clone();

        // Without dedicated texture registers, texture operands alias the
        // first four work registers.
        if quirks.interpipe_aliasing {
            ranges.insert(RegClass::TexR, 0..64);
            ranges.insert(RegClass::TexW, 0..64);
        }

        Self { ranges }
    }

    pub fn range(&self, class: RegClass) -> Range<u32> {
        self.ranges[&class].clone()
    }
}

/// Bit index for a forbidden delta. Deltas live in `[-16, 16)`.
fn delta_bit(delta: i32) -> u32 {
    debug_assert!((-16..16).contains(&delta));
    1 << (delta + 16)
}

pub struct Lcra {
    node_count: usize,

    /// Pairwise constraint matrix: `linear[i * n + j]` holds one bit per
    /// forbidden value of `solution[j] - solution[i]`.
    linear: Vec<u32>,

    solutions: Vec<Option<u32>>,
    forced: Vec<bool>,

    class_of: Vec<RegClass>,
    alignment: Vec<u32>,
    span: Vec<u32>,
}

impl Lcra {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            linear: vec![0; node_count * node_count],
            solutions: vec![None; node_count],
            forced: vec![false; node_count],
            class_of: vec![RegClass::Work; node_count],
            // Alignment comes from element sizes via restrict; sub-word
            // values keep their natural 1/2-byte packing.
            alignment: vec![1; node_count],
            span: vec![4; node_count],
        }
    }

    pub fn set_class(&mut self, node: usize, class: RegClass) {
        self.class_of[node] = class;
    }

    pub fn class_of(&self, node: usize) -> RegClass {
        self.class_of[node]
    }

    /// Widen a node's placement requirements: `alignment` in bytes (a power
    /// of two) and `span`, the number of bytes the node occupies from its
    /// offset. Multiple calls keep the maximum of each.
    pub fn restrict(&mut self, node: usize, alignment: u32, span: u32) {
        debug_assert!(alignment.is_power_of_two());
        self.alignment[node] = self.alignment[node].max(alignment);
        self.span[node] = self.span[node].max(span);
    }

    /// Pin a node to a fixed offset, bypassing the search entirely.
    pub fn force(&mut self, node: usize, offset: u32) {
        self.solutions[node] = Some(offset);
        self.forced[node] = true;
    }

    pub fn is_forced(&self, node: usize) -> bool {
        self.forced[node]
    }

    /// Record that the live bytes `mask_i` of node `i` may not overlap the
    /// live bytes `mask_j` of node `j`, whatever offsets they end up at.
    pub fn add_interference(&mut self, i: usize, mask_i: u16, j: usize, mask_j: u16) {
        if i == j || mask_i == 0 || mask_j == 0 {
            return;
        }

        let n = self.node_count;

        // Bytes overlap iff solution[j] - solution[i] equals the distance
        // between a live byte of i and one of j.
        for delta in 0..16i32 {
            if mask_i as u32 & ((mask_j as u32) << delta) != 0 {
                self.linear[i * n + j] |= delta_bit(delta);
                self.linear[j * n + i] |= delta_bit(-delta);
            }

            if delta > 0 && mask_i as u32 & ((mask_j as u32) >> delta) != 0 {
                self.linear[i * n + j] |= delta_bit(-delta);
                self.linear[j * n + i] |= delta_bit(delta);
            }
        }
    }

    /// How constrained a node is; the spiller uses this as its benefit
    /// metric.
    pub fn constraint_mass(&self, node: usize) -> u32 {
        let n = self.node_count;
        self.linear[node * n..(node + 1) * n]
            .iter()
            .map(|row| row.count_ones())
            .sum()
    }

    fn fits(&self, node: usize, offset: u32) -> bool {
        let n = self.node_count;

        for other in 0..n {
            let constraints = self.linear[node * n + other];
            if constraints == 0 {
                continue;
            }

            let Some(solution) = self.solutions[other] else {
                continue;
            };

            let delta = solution as i32 - offset as i32;
            if !(-16..16).contains(&delta) {
                continue;
            }

            if constraints & delta_bit(delta) != 0 {
                return false;
            }
        }

        true
    }

    /// Greedy first-fit assignment in node order. On failure returns the
    /// node that has no feasible offset.
    pub fn solve(&mut self, file: &RegisterFile) -> Result<Vec<u32>, usize> {
        for node in 0..self.node_count {
            if self.solutions[node].is_some() {
                continue;
            }

            let range = file.range(self.class_of[node]);
            let span = self.span[node];

            let mut offset = range.start;
            let mut found = None;

            while offset + span <= range.end {
                // A node never straddles a register boundary.
                if (offset & 15) + span <= 16 && self.fits(node, offset) {
                    found = Some(offset);
                    break;
                }

                offset += self.alignment[node];
            }

            match found {
                Some(offset) => self.solutions[node] = Some(offset),
                None => return Err(node),
            }
        }

        Ok(self.solutions.iter().map(|s| s.unwrap()).collect())
    }
}
