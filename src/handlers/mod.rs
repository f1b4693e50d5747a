//! Per-kind block handlers, spec.md §4.D. Dispatch lives in
//! `user_state::handle_blocks`; each module here applies one
//! `ClassifiedProof` variant against the collaborators.

pub mod account;
pub mod common;
pub mod defi_claim;
pub mod defi_deposit;
pub mod join_split;
