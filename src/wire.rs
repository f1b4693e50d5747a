//! Wire decode for the block data the core consumes, spec.md §6.
//!
//! `rollupProofData` and the off-chain payload buffers are not external
//! collaborators — they are how this crate's own pipeline reads the
//! provider's bytes, so decoding them is in scope. `bytes::Buf` is the
//! teacher's own dependency (`crypto/Cargo.toml` carries `bytes = "1"`).

use bytes::Buf;
use num_bigint::BigUint;

use crate::error::{Result, UserStateError};
use crate::types::{AliasId, BridgeId, Bytes32, InnerProof, ProofId, RollupProofData, ViewingKey};

/// Length of an encrypted output-note viewing-key payload.
pub const VIEWING_KEY_SIZE: usize = 80;

const INNER_PROOF_WIDTH: usize =
    4 + 32 /* commitment1 */ + 32 /* commitment2 */ + 32 /* nullifier1 */ + 32 /* nullifier2 */
        + 32 /* public_value */ + 32 /* public_owner */ + 32 /* asset_id */ + 32 /* tx_id */;

fn too_short(what: &str) -> UserStateError {
    UserStateError::Protocol(format!("buffer too short while decoding {what}"))
}

fn take_bytes32(buf: &mut &[u8], what: &str) -> Result<Bytes32> {
    if buf.remaining() < 32 {
        return Err(too_short(what));
    }
    let mut out = [0u8; 32];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

fn take_u32(buf: &mut &[u8], what: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(too_short(what));
    }
    Ok(buf.get_u32())
}

fn proof_id_from_u32(raw: u32) -> ProofId {
    match raw {
        0 => ProofId::Deposit,
        1 => ProofId::Withdraw,
        2 => ProofId::Send,
        3 => ProofId::Account,
        4 => ProofId::DefiDeposit,
        5 => ProofId::DefiClaim,
        _ => ProofId::Padding,
    }
}

fn decode_inner_proof(buf: &mut &[u8]) -> Result<InnerProof> {
    if buf.remaining() < INNER_PROOF_WIDTH {
        return Err(too_short("inner proof"));
    }
    let proof_id = proof_id_from_u32(take_u32(buf, "proof id")?);
    let note_commitment_1 = take_bytes32(buf, "note commitment 1")?;
    let note_commitment_2 = take_bytes32(buf, "note commitment 2")?;
    let nullifier_1 = take_bytes32(buf, "nullifier 1")?;
    let nullifier_2 = take_bytes32(buf, "nullifier 2")?;
    let public_value = BigUint::from_bytes_be(&take_bytes32(buf, "public value")?);
    let public_owner = take_bytes32(buf, "public owner")?;
    let asset_id = take_bytes32(buf, "asset id")?;
    let tx_id = take_bytes32(buf, "tx id")?;

    Ok(InnerProof {
        proof_id,
        note_commitment_1,
        note_commitment_2,
        nullifier_1,
        nullifier_2,
        public_value,
        public_owner,
        asset_id,
        tx_id,
    })
}

/// Decodes `rollupProofData` into `{rollupId, dataStartIndex,
/// innerProofData}` (spec.md §6).
pub fn decode_rollup_proof_data(mut data: &[u8]) -> Result<RollupProofData> {
    let rollup_id = take_u32(&mut data, "rollup id")?;
    let data_start_index = take_u32(&mut data, "data start index")? as u64;
    let count = take_u32(&mut data, "inner proof count")? as usize;

    let mut inner_proof_data = Vec::with_capacity(count);
    for _ in 0..count {
        inner_proof_data.push(decode_inner_proof(&mut data)?);
    }

    Ok(RollupProofData {
        rollup_id,
        data_start_index,
        inner_proof_data,
    })
}

/// `assetId = read big-endian u32 from offset 28 of proof.assetId`
/// (spec.md §4.D JoinSplit handler recovery rules) — the low 4 bytes of
/// the 32-byte field, big-endian.
pub fn asset_id_from_field(raw: &Bytes32) -> u32 {
    u32::from_be_bytes(raw[28..32].try_into().expect("4-byte slice"))
}

pub struct JoinSplitOffchainData {
    pub viewing_key_1: ViewingKey,
    pub viewing_key_2: ViewingKey,
}

pub fn decode_join_split_offchain(mut data: &[u8]) -> Result<JoinSplitOffchainData> {
    if data.remaining() < VIEWING_KEY_SIZE * 2 {
        return Err(too_short("join-split off-chain payload"));
    }
    let mut viewing_key_1 = vec![0u8; VIEWING_KEY_SIZE];
    data.copy_to_slice(&mut viewing_key_1);
    let mut viewing_key_2 = vec![0u8; VIEWING_KEY_SIZE];
    data.copy_to_slice(&mut viewing_key_2);
    Ok(JoinSplitOffchainData {
        viewing_key_1,
        viewing_key_2,
    })
}

pub struct AccountOffchainData {
    pub account_public_key: Bytes32,
    pub account_alias_id: AliasId,
    pub spending_key_1: Bytes32,
    pub spending_key_2: Bytes32,
}

pub fn decode_account_offchain(mut data: &[u8]) -> Result<AccountOffchainData> {
    let account_public_key = take_bytes32(&mut data, "account public key")?;
    let alias_hash = take_bytes32(&mut data, "alias hash")?;
    let nonce = take_u32(&mut data, "alias nonce")?;
    let spending_key_1 = take_bytes32(&mut data, "spending key 1")?;
    let spending_key_2 = take_bytes32(&mut data, "spending key 2")?;
    Ok(AccountOffchainData {
        account_public_key,
        account_alias_id: AliasId { alias_hash, nonce },
        spending_key_1,
        spending_key_2,
    })
}

pub struct DefiDepositOffchainData {
    pub viewing_key: ViewingKey,
    pub bridge_id: BridgeId,
    pub deposit_value: BigUint,
    pub partial_state_secret_eph_pub_key: Bytes32,
}

pub fn decode_defi_deposit_offchain(mut data: &[u8]) -> Result<DefiDepositOffchainData> {
    if data.remaining() < VIEWING_KEY_SIZE {
        return Err(too_short("defi deposit off-chain payload"));
    }
    let mut viewing_key = vec![0u8; VIEWING_KEY_SIZE];
    data.copy_to_slice(&mut viewing_key);

    let input_asset_id = take_u32(&mut data, "bridge input asset id")?;
    let output_asset_id_a = take_u32(&mut data, "bridge output asset id a")?;
    let output_asset_id_b = take_u32(&mut data, "bridge output asset id b")?;
    let deposit_value = BigUint::from_bytes_be(&take_bytes32(&mut data, "deposit value")?);
    let partial_state_secret_eph_pub_key = take_bytes32(&mut data, "partial state eph pub key")?;

    Ok(DefiDepositOffchainData {
        viewing_key,
        bridge_id: BridgeId {
            input_asset_id,
            output_asset_id_a,
            output_asset_id_b,
        },
        deposit_value,
        partial_state_secret_eph_pub_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_id_reads_last_four_bytes_big_endian() {
        let mut raw = [0u8; 32];
        raw[28..32].copy_from_slice(&42u32.to_be_bytes());
        assert_eq!(asset_id_from_field(&raw), 42);
    }

    #[test]
    fn decode_rollup_proof_data_round_trips_a_single_padding_proof() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u32.to_be_bytes()); // rollup id
        buf.extend_from_slice(&0u32.to_be_bytes()); // data start index
        buf.extend_from_slice(&1u32.to_be_bytes()); // one inner proof
        buf.extend_from_slice(&6u32.to_be_bytes()); // proof id: padding
        buf.extend_from_slice(&[0u8; 32 * 7]); // remaining fixed-width fields

        let decoded = decode_rollup_proof_data(&buf).unwrap();
        assert_eq!(decoded.rollup_id, 7);
        assert_eq!(decoded.inner_proof_data.len(), 1);
        assert_eq!(decoded.inner_proof_data[0].proof_id, ProofId::Padding);
    }

    #[test]
    fn decode_rejects_truncated_buffers() {
        let buf = [0u8; 4];
        assert!(decode_rollup_proof_data(&buf).is_err());
    }
}
