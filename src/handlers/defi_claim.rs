//! DefiClaim handler (DEFI_CLAIM proofs), spec.md §4.D.
//!
//! Per spec.md §9's open question, the "both outputs zero" case is
//! mutually exclusive with the `outputValueA/B > 0` branches by protocol;
//! implemented here as an explicit if/else to avoid double-insertion.

use std::collections::HashSet;

use num_traits::Zero;

use crate::collaborators::{Database, NoteAlgorithms};
use crate::error::Result;
use crate::proof_classifier::DefiClaimProof;
use crate::types::{Bytes32, Note, Timestamp, UserData, ZERO_PUB_KEY};

#[derive(Debug, Default)]
pub struct DefiClaimOutcome {
    pub touched_assets: HashSet<u32>,
}

/// Applies a DEFI_CLAIM inner proof.
pub async fn handle(
    db: &dyn Database,
    algorithms: &dyn NoteAlgorithms,
    user: &UserData,
    proof: &DefiClaimProof,
    note_start_index: u64,
    created: Timestamp,
) -> Result<DefiClaimOutcome> {
    let owner = user.id;

    let claim = match db.get_claim(&proof.nullifier_1).await? {
        Some(c) if c.owner == owner => c,
        _ => return Ok(DefiClaimOutcome::default()),
    };

    let defi_tx = db.get_defi_tx(&claim.tx_hash).await?.ok_or_else(|| {
        crate::error::UserStateError::Protocol(format!(
            "claim for tx {:?} references an unknown defi tx",
            claim.tx_hash
        ))
    })?;

    let mut touched_assets = HashSet::new();

    if defi_tx.output_value_a.is_zero() && defi_tx.output_value_b.is_zero() {
        let note = claim_note(
            owner,
            defi_tx.bridge_id.input_asset_id,
            defi_tx.deposit_value.clone(),
            proof.note_commitment_1,
            proof.nullifier_1,
            note_start_index,
            algorithms,
            &user.private_key,
            &claim.secret,
        );
        db.add_note(&note).await?;
        touched_assets.insert(note.asset_id);
    } else {
        if !defi_tx.output_value_a.is_zero() {
            let note = claim_note(
                owner,
                defi_tx.bridge_id.output_asset_id_a,
                defi_tx.output_value_a.clone(),
                proof.note_commitment_1,
                proof.nullifier_1,
                note_start_index,
                algorithms,
                &user.private_key,
                &claim.secret,
            );
            db.add_note(&note).await?;
            touched_assets.insert(note.asset_id);
        }
        if !defi_tx.output_value_b.is_zero() {
            let note = claim_note(
                owner,
                defi_tx.bridge_id.output_asset_id_b,
                defi_tx.output_value_b.clone(),
                proof.note_commitment_2,
                proof.nullifier_2,
                note_start_index + 1,
                algorithms,
                &user.private_key,
                &claim.secret,
            );
            db.add_note(&note).await?;
            touched_assets.insert(note.asset_id);
        }
    }

    db.settle_defi_tx(&claim.tx_hash, created).await?;

    Ok(DefiClaimOutcome { touched_assets })
}

#[allow(clippy::too_many_arguments)]
fn claim_note(
    owner: crate::types::AccountId,
    asset_id: u32,
    value: num_bigint::BigUint,
    commitment: Bytes32,
    input_nullifier: Bytes32,
    index: u64,
    algorithms: &dyn NoteAlgorithms,
    private_key: &Bytes32,
    secret: &Bytes32,
) -> Note {
    Note {
        asset_id,
        value,
        commitment,
        secret: *secret,
        nullifier: algorithms.value_note_nullifier(&commitment, private_key),
        nullified: false,
        owner,
        // Claim notes are authored by the protocol on behalf of the user.
        creator_pub_key: ZERO_PUB_KEY,
        input_nullifier,
        index,
        allow_chain: false,
        pending: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDatabase, FakeNoteAlgorithms};
    use crate::types::{AccountId, BridgeId, Claim, UserData, UserDefiTx};
    use num_bigint::BigUint;

    fn user() -> UserData {
        UserData::new(AccountId::new([1u8; 32], 0), [1u8; 32], [2u8; 32])
    }

    #[tokio::test]
    async fn failed_defi_materializes_a_single_refund_note() {
        let db = FakeDatabase::default();
        let algos = FakeNoteAlgorithms::default();
        let u = user();

        let claim = Claim {
            tx_hash: [7u8; 32],
            secret: [8u8; 32],
            nullifier: [9u8; 32],
            owner: u.id,
        };
        db.add_claim(&claim).await.unwrap();
        db.add_defi_tx(&UserDefiTx {
            tx_hash: [7u8; 32],
            user_id: u.id,
            bridge_id: BridgeId {
                input_asset_id: 0,
                output_asset_id_a: 1,
                output_asset_id_b: 0,
            },
            deposit_value: BigUint::from(100u32),
            partial_state_secret: [8u8; 32],
            tx_fee: num_bigint::BigInt::from(0),
            created: Timestamp(1),
            output_value_a: BigUint::from(0u32),
            output_value_b: BigUint::from(0u32),
            settled: None,
        })
        .await
        .unwrap();

        let proof = DefiClaimProof {
            note_commitment_1: [3u8; 32],
            note_commitment_2: [4u8; 32],
            nullifier_1: [9u8; 32],
            nullifier_2: [10u8; 32],
            tx_id: [11u8; 32],
        };

        let outcome = handle(&db, &algos, &u, &proof, 10, Timestamp(2)).await.unwrap();
        assert_eq!(outcome.touched_assets, HashSet::from([0u32]));

        let notes = db.get_user_notes(&u.id).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].asset_id, 0);
        assert_eq!(notes[0].value, BigUint::from(100u32));
    }
}
