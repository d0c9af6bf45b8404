//! Backend passes for a Midgard-class VLIW shader core: dead code
//! elimination, VLIW bundle scheduling, linear-constraint register
//! allocation with iterative spilling, and physical register install.
//!
//! The pipeline is a fixed, single-threaded pass order over one shader at a
//! time, and is fully deterministic: identical input MIR produces identical
//! scheduled and allocated output, so shader binaries can be cached by hash.

use std::error::Error;
use std::fmt;

use log::{debug, info, trace};
use midgard_mir::{Prettier, Program};

pub mod opt;
pub mod ra;
pub mod schedule;

#[cfg(test)]
mod tests;

pub use ra::RegAllocError;

/// Shader metadata produced alongside the compiled program.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    /// Number of work registers used, for thread occupancy accounting.
    pub work_register_count: u8,

    /// First uniform register not promoted into the register file.
    pub uniform_cutoff: u8,

    /// Thread-local storage bytes needed for spilled temporaries.
    pub tls_size: u32,

    pub spill_count: u32,
    pub fill_count: u32,

    pub bundle_count: u32,
    pub quadword_count: u32,
}

#[derive(Debug)]
pub enum BackendError {
    RegAlloc(RegAllocError),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::RegAlloc(e) => write!(f, "register allocation failed: {}", e),
        }
    }
}

impl Error for BackendError {}

impl From<RegAllocError> for BackendError {
    fn from(e: RegAllocError) -> Self {
        BackendError::RegAlloc(e)
    }
}

/// Run the whole backend over a MIR program: schedule every block into
/// bundles, then allocate registers (spilling as needed) and install the
/// physical encodings.
pub fn compile(program: &mut Program) -> Result<Metadata, BackendError> {
    info!(
        "compiling {} block(s), {} temporaries",
        program.blocks.len(),
        program.temp_count
    );

    while opt::dead_code_eliminate(program) {}

    schedule::pair_load_store(program);
    schedule::schedule_program(program);

    let mut meta = Metadata {
        uniform_cutoff: program.uniform_cutoff,
        ..Metadata::default()
    };

    for id in program.block_ids() {
        let block = program.block(id);
        meta.bundle_count += block.bundles.len() as u32;
        meta.quadword_count += block.quadword_count;
    }

    if let Err(e) = ra::run(program, &mut meta) {
        debug!("MIR at failure:\n{}", Prettier::new().pretty_program(program));
        return Err(e.into());
    }

    // Spilling grows the schedule.
    meta.bundle_count = 0;
    meta.quadword_count = 0;
    for id in program.block_ids() {
        let block = program.block(id);
        meta.bundle_count += block.bundles.len() as u32;
        meta.quadword_count += block.quadword_count;
    }

    trace!("done: {:?}", meta);

    Ok(meta)
}
