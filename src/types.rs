//! Core data model: spec.md §3.
//!
//! These types are the shared vocabulary between the block-processing
//! pipeline (`block_queue`, `proof_classifier`, `batch_decryptor`,
//! `handlers`) and the external collaborators declared in `collaborators`.

use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A 32-byte opaque value: commitment, nullifier, secret, or public key
/// material. The curve it is drawn over is out of scope for this crate —
/// see `collaborators::NoteAlgorithms`.
pub type Bytes32 = [u8; 32];

/// Ciphertext buffer carrying an encrypted output-note payload.
pub type ViewingKey = Vec<u8>;

/// Opaque timestamp supplied by the provider. Per spec.md §9 it is unclear
/// whether this is an L1 timestamp or client receive time; we never
/// interpret it, only store and compare for ordering within a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

/// `AccountId = (publicKey, nonce)`, spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId {
    pub public_key: Bytes32,
    pub nonce: u32,
}

impl AccountId {
    pub fn new(public_key: Bytes32, nonce: u32) -> Self {
        Self { public_key, nonce }
    }
}

/// `UserData`, spec.md §3. `synced_to_rollup` starts at -1 (no block applied).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub id: AccountId,
    pub public_key: Bytes32,
    pub private_key: Bytes32,
    pub nonce: u32,
    pub alias_hash: Option<Bytes32>,
    pub synced_to_rollup: i64,
}

impl UserData {
    pub fn new(id: AccountId, public_key: Bytes32, private_key: Bytes32) -> Self {
        Self {
            nonce: id.nonce,
            id,
            public_key,
            private_key,
            alias_hash: None,
            synced_to_rollup: -1,
        }
    }
}

/// A signing key authorized for an account via an ACCOUNT proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    pub account_id: AccountId,
    pub key: Bytes32,
    pub tree_index: u64,
}

/// `Note`, spec.md §3.
///
/// Invariants enforced by callers, not by this type: `nullifier =
/// H_value(commitment, privateKey)`; a note with `value == 0` is never
/// persisted; `pending == true` implies `index == 0`; once `nullified ==
/// true` the note is excluded from `NotePicker`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub asset_id: u32,
    pub value: BigUint,
    pub commitment: Bytes32,
    pub secret: Bytes32,
    pub nullifier: Bytes32,
    pub nullified: bool,
    pub owner: AccountId,
    pub creator_pub_key: Bytes32,
    pub input_nullifier: Bytes32,
    pub index: u64,
    pub allow_chain: bool,
    pub pending: bool,
}

/// `Claim`, spec.md §3. Created at DEFI_DEPOSIT, consumed at DEFI_CLAIM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub tx_hash: Bytes32,
    pub secret: Bytes32,
    pub nullifier: Bytes32,
    pub owner: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserJoinSplitTx {
    pub tx_hash: Bytes32,
    pub user_id: AccountId,
    pub asset_id: u32,
    pub public_input: BigUint,
    pub public_output: BigUint,
    pub private_input: BigUint,
    pub private_output_recipient: BigUint,
    pub private_output_sender: BigUint,
    pub input_owner: Option<Bytes32>,
    pub output_owner: Option<Bytes32>,
    pub owned_by_me: bool,
    pub created: Timestamp,
    pub settled: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasId {
    pub alias_hash: Bytes32,
    pub nonce: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccountTx {
    pub tx_hash: Bytes32,
    pub user_id: AccountId,
    pub alias_hash: Bytes32,
    pub new_signing_key_1: Option<Bytes32>,
    pub new_signing_key_2: Option<Bytes32>,
    pub migrated: bool,
    pub created: Timestamp,
    pub settled: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDefiTx {
    pub tx_hash: Bytes32,
    pub user_id: AccountId,
    pub bridge_id: BridgeId,
    pub deposit_value: BigUint,
    pub partial_state_secret: Bytes32,
    pub tx_fee: BigInt,
    pub created: Timestamp,
    pub output_value_a: BigUint,
    pub output_value_b: BigUint,
    pub settled: Option<Timestamp>,
}

/// `UserUtilTx`, spec.md §3. A join-split that exists only to feed a
/// subsequent DeFi deposit. `forward_link` is the nullifier of its first
/// output note; a `UserDefiTx` later carries the same value as its
/// `nullifier1` to complete the chain (spec.md §4.D DefiDeposit handler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUtilTx {
    pub tx_hash: Bytes32,
    pub user_id: AccountId,
    pub asset_id: u32,
    pub tx_fee: BigInt,
    pub forward_link: Bytes32,
}

/// `SyncState`, spec.md §3. Strict transitions `Off -> Synching ->
/// Monitoring -> Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Off,
    Synching,
    Monitoring,
}

/// One interaction result entry in a block, keyed by `bridge_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionResult {
    pub bridge_id: BridgeId,
    pub total_input_value: BigUint,
    pub total_output_value_a: BigUint,
    pub total_output_value_b: BigUint,
    pub result: bool,
}

/// Identifies a DeFi bridge's input/output asset types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeId {
    pub input_asset_id: u32,
    pub output_asset_id_a: u32,
    pub output_asset_id_b: u32,
}

/// Raw rollup block as returned by the provider, spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub rollup_id: u32,
    pub rollup_proof_data: Vec<u8>,
    pub offchain_tx_data: Vec<Vec<u8>>,
    pub interaction_result: Vec<InteractionResult>,
    pub created: Timestamp,
}

/// `rollupProofData` decoded, spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupProofData {
    pub rollup_id: u32,
    pub data_start_index: u64,
    pub inner_proof_data: Vec<InnerProof>,
}

/// Inner-proof kind discriminant, spec.md §4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofId {
    Deposit,
    Withdraw,
    Send,
    Account,
    DefiDeposit,
    DefiClaim,
    Padding,
}

/// One user transaction within a rollup batch, spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerProof {
    pub proof_id: ProofId,
    pub note_commitment_1: Bytes32,
    pub note_commitment_2: Bytes32,
    pub nullifier_1: Bytes32,
    pub nullifier_2: Bytes32,
    pub public_value: BigUint,
    pub public_owner: Bytes32,
    /// 32-byte field; the asset id is the last 4 bytes, big-endian.
    pub asset_id: Bytes32,
    pub tx_id: Bytes32,
}

/// A decrypted, not-yet-verified note candidate recovered by trial
/// decryption. Verified against the on-chain commitment before it is
/// turned into a persisted `Note` (spec.md §4.C, §8 round-trip property).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNote {
    pub owner_pub_key: Bytes32,
    pub owner_nonce: u32,
    pub asset_id: u32,
    pub value: BigUint,
    pub note_secret: Bytes32,
    pub creator_pub_key: Bytes32,
    pub input_nullifier: Bytes32,
}

impl TreeNote {
    pub fn owner(&self) -> AccountId {
        AccountId::new(self.owner_pub_key, self.owner_nonce)
    }
}

/// A provider-side pending transaction hint, spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTx {
    pub tx_id: Bytes32,
    pub note_commitment_1: Bytes32,
    pub note_commitment_2: Bytes32,
}

/// Event emitted by the Balance Emitter, spec.md §4.H / §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserStateEvent {
    UpdatedUserState {
        user_id: AccountId,
        /// `None` on the trailing, no-asset-payload emission.
        balance: Option<BigUint>,
        diff: Option<BigInt>,
        asset_id: Option<u32>,
    },
}

pub type NullifierSet = HashSet<Bytes32>;

pub const ZERO_PUB_KEY: Bytes32 = [0u8; 32];
pub const ZERO_BYTES32: Bytes32 = [0u8; 32];

pub fn is_zero(b: &Bytes32) -> bool {
    b.iter().all(|&x| x == 0)
}
