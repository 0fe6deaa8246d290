//! Exit code logic for the annex-sync process.
//!
//! Single responsibility: map download counts to the process exit outcome.

use crate::ProcessExit;

/// Determines the process exit outcome from obtained and missing file counts.
///
/// Zero files obtained is a failure even when nothing was requested to fail,
/// since there is nothing to archive.
pub(crate) fn determine_exit_outcome(obtained: usize, missing: usize) -> ProcessExit {
    if obtained == 0 {
        ProcessExit::Failure
    } else if missing == 0 {
        ProcessExit::Success
    } else {
        ProcessExit::Partial
    }
}
