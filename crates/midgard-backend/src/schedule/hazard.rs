//! Co-issue hazard rules.
//!
//! Instructions packed into one bundle execute against the register file
//! state from before the bundle, so a true dependency between two of them
//! silently reads stale data on hardware rather than faulting. These checks
//! are the load-bearing correctness rules of the scheduler.

use midgard_mir::{Instruction, UNUSED};

/// Whether `later` may issue in the same bundle as `earlier` (with `earlier`
/// preceding it in program order).
///
/// Forbidden:
/// - read-after-write: `later` reads bytes of `earlier`'s destination;
/// - write-after-write: both write overlapping bytes of the same register.
///
/// Write-after-read is always fine: co-issue makes `earlier` read the old
/// value, which is exactly what program order promised it.
pub fn can_run_concurrent_ssa(earlier: &Instruction, later: &Instruction) -> bool {
    if earlier.dest == UNUSED {
        return true;
    }

    // RAW on overlapping bytes.
    if later.bytemask_of_read_components(earlier.dest) & earlier.bytemask() != 0 {
        return false;
    }

    // WAW on overlapping bytes.
    if later.dest == earlier.dest && later.bytemask() & earlier.bytemask() != 0 {
        return false;
    }

    true
}
