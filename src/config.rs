//! Configuration for a `UserState` instance.
//!
//! Not part of spec.md's interface (§6 scopes the CLI and its config
//! loading out entirely) but every ambient Rust service in the pack
//! threads a small config struct through its constructor rather than
//! hard-coding magic numbers — `craft-ec-cloakcraft`'s `IndexerConfig` is
//! the closest precedent. This crate has no file or env loading of its
//! own: the embedding application constructs one directly.

/// Tuning knobs for a single `UserState`. Defaults match what the teacher's
/// `ClientState` implicitly assumed (unbounded processing, no explicit
/// capacity).
#[derive(Debug, Clone)]
pub struct UserStateConfig {
    /// Capacity of the `BalanceEmitter`'s broadcast channel. A slow
    /// subscriber that falls behind by more than this many events sees
    /// `RecvError::Lagged`, per spec.md §9's "listeners must not block the
    /// block loop".
    pub event_channel_capacity: usize,
}

impl Default for UserStateConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 64,
        }
    }
}
