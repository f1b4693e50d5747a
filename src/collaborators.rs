//! External collaborator interfaces, spec.md §6.
//!
//! These are specified only at the interface level: transport, storage
//! engine, and curve/note-algorithms are all out of scope (spec.md §1).
//! Handlers take these as `&dyn Trait` so they don't carry the
//! `UserState<D, P, N>` type parameters; native `async fn` in traits isn't
//! object-safe, so `#[async_trait]` is used to make that possible.

use async_trait::async_trait;
use num_bigint::BigUint;

use crate::error::Result;
use crate::types::{
    AccountId, Block, Bytes32, Claim, Note, PendingTx, SigningKey, Timestamp, TreeNote,
    UserAccountTx, UserData, UserDefiTx, UserJoinSplitTx, UserUtilTx, ViewingKey,
};

/// The persistent note/tx/claim store, spec.md §6.
#[async_trait]
pub trait Database: Send + Sync {
    async fn get_user(&self, id: &AccountId) -> Result<Option<UserData>>;
    async fn update_user(&self, user: &UserData) -> Result<()>;
    async fn add_user_signing_key(&self, key: &SigningKey) -> Result<()>;

    async fn add_note(&self, note: &Note) -> Result<()>;
    /// Marks the note owning `nullifier` as nullified; returns it (so
    /// callers can recover its value for fee/amount bookkeeping). Returns
    /// `Ok(None)` if unknown — this is the expected majority case, not an
    /// error (spec.md §7(i)).
    async fn nullify_note(&self, nullifier: &Bytes32) -> Result<Option<Note>>;
    async fn remove_note(&self, nullifier: &Bytes32) -> Result<()>;
    async fn get_note_by_nullifier(&self, nullifier: &Bytes32) -> Result<Option<Note>>;
    /// Used to upgrade a pending note to confirmed by matching commitment
    /// (spec.md §3 Lifecycles).
    async fn get_note_by_commitment(&self, commitment: &Bytes32) -> Result<Option<Note>>;
    async fn get_user_notes(&self, id: &AccountId) -> Result<Vec<Note>>;
    async fn get_user_pending_notes(&self, id: &AccountId) -> Result<Vec<Note>>;

    async fn add_claim(&self, claim: &Claim) -> Result<()>;
    async fn get_claim(&self, nullifier: &Bytes32) -> Result<Option<Claim>>;

    async fn add_join_split_tx(&self, tx: &UserJoinSplitTx) -> Result<()>;
    async fn get_join_split_tx(
        &self,
        tx_hash: &Bytes32,
        user_id: &AccountId,
    ) -> Result<Option<UserJoinSplitTx>>;
    async fn settle_join_split_tx(
        &self,
        tx_hash: &Bytes32,
        user_id: &AccountId,
        settled: Timestamp,
    ) -> Result<()>;

    async fn add_account_tx(&self, tx: &UserAccountTx) -> Result<()>;
    async fn get_account_tx(&self, tx_hash: &Bytes32) -> Result<Option<UserAccountTx>>;
    async fn settle_account_tx(&self, tx_hash: &Bytes32, settled: Timestamp) -> Result<()>;

    async fn add_defi_tx(&self, tx: &UserDefiTx) -> Result<()>;
    async fn get_defi_tx(&self, tx_hash: &Bytes32) -> Result<Option<UserDefiTx>>;
    async fn update_defi_tx(
        &self,
        tx_hash: &Bytes32,
        output_value_a: BigUint,
        output_value_b: BigUint,
    ) -> Result<()>;
    async fn settle_defi_tx(&self, tx_hash: &Bytes32, settled: Timestamp) -> Result<()>;

    async fn add_util_tx(&self, tx: &UserUtilTx) -> Result<()>;
    async fn get_util_tx_by_link(&self, nullifier: &Bytes32) -> Result<Option<UserUtilTx>>;

    /// Tx hashes of all unsettled local tx records for a user, used by the
    /// Pending Reconciler (spec.md §4.E).
    async fn get_unsettled_user_txs(&self, user_id: &AccountId) -> Result<Vec<Bytes32>>;
    async fn remove_user_tx(&self, tx_id: &Bytes32, user_id: &AccountId) -> Result<()>;
}

/// The rollup provider transport, spec.md §6.
#[async_trait]
pub trait RollupProvider: Send + Sync {
    async fn get_blocks(&self, from_rollup_id: u32) -> Result<Vec<Block>>;
    async fn get_pending_txs(&self) -> Result<Vec<PendingTx>>;
    async fn get_pending_note_nullifiers(&self) -> Result<Vec<Bytes32>>;
}

/// Curve arithmetic and note-algorithms primitives, spec.md §6.
///
/// `note_commitment` is not explicitly enumerated in spec.md §6, but is
/// required to implement the round-trip verification property of §8:
/// trial-decrypted candidates must have their commitment recomputed and
/// checked against the on-chain commitment before being trusted.
#[async_trait]
pub trait NoteAlgorithms: Send + Sync {
    fn value_note_nullifier(&self, commitment: &Bytes32, private_key: &Bytes32) -> Bytes32;
    fn claim_note_nullifier(&self, commitment: &Bytes32) -> Bytes32;
    fn note_commitment(&self, note: &TreeNote) -> Bytes32;

    /// Derives a DeFi claim's partial state secret from the deposit
    /// proof's ephemeral public key and this user's private key (spec.md
    /// §4.D DefiDeposit handler). Not explicitly enumerated in spec.md §6,
    /// but required by the same handler — another curve-arithmetic
    /// primitive out of scope for this crate.
    fn derive_partial_state_secret(&self, eph_pub_key: &Bytes32, private_key: &Bytes32) -> Bytes32;

    /// Batched trial-decryption: one elliptic-curve operation amortized
    /// across the whole set of viewing keys gathered in a single
    /// `handle_blocks` call (spec.md §4.C). Output is aligned 1:1 with
    /// `viewing_keys`.
    async fn decrypt_batch(
        &self,
        private_key: &Bytes32,
        viewing_keys: &[ViewingKey],
    ) -> Vec<Option<TreeNote>>;
}
