//! Error taxonomy, spec.md §7.
//!
//! Only cases (iii)-(v) of §7 are modeled as errors here. Cases (i)
//! "not-ours" and (ii) "storage miss on expected record" are expected,
//! majority-case control flow and are represented with `Option`, the way
//! the teacher's `scan_block` treats a failed `Note::decrypt` as a silent
//! `if let` branch rather than an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserStateError {
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("rollup provider error: {0}")]
    Provider(#[source] anyhow::Error),

    /// spec.md §7(iii): an `interactionResult` lacks a matching `bridgeId`.
    /// A protocol violation — surfaced rather than silently corrupting
    /// state.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The block queue was closed (via `stop_sync(flush = false)`) while
    /// the drain task was suspended mid-wait.
    #[error("sync cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, UserStateError>;
