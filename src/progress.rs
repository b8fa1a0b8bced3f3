//! Per-frame completion reporting, carried from the teacher crate's own
//! `progress` module so callers (the CLI, or a GUI embedding this library)
//! can observe encode progress and abort early. This is ambient UX
//! plumbing the teacher always ships, not something spec.md calls for by
//! name, but the orchestrator (spec.md §4.7) needs some way to let a
//! caller observe per-frame completion.

/// Reports on the progress of an encode in progress.
pub trait ProgressReporter: Send {
    /// Called after each frame has been written. Returning `false` aborts
    /// the pipeline at the next opportunity.
    fn increase(&mut self) -> bool;

    /// Called once, when the encode finishes (successfully or not).
    fn done(&mut self, _msg: &str) {}
}

/// No-op progress reporter, used when the caller doesn't care.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn increase(&mut self) -> bool {
        true
    }
}
