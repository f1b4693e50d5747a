//! JoinSplit handler (DEPOSIT/WITHDRAW/SEND), spec.md §4.D.

use std::collections::HashSet;

use num_bigint::BigUint;
use num_traits::Zero;

use super::common::{nullify_note, process_new_note};
use crate::collaborators::{Database, NoteAlgorithms};
use crate::error::Result;
use crate::proof_classifier::{JoinSplitKind, JoinSplitProof};
use crate::types::{Timestamp, TreeNote, UserData, UserJoinSplitTx, UserUtilTx};
use crate::wire;

#[derive(Debug, Default)]
pub struct JoinSplitOutcome {
    pub touched_assets: HashSet<u32>,
}

/// Applies a DEPOSIT/WITHDRAW/SEND inner proof. `decrypted` holds the
/// trial-decrypted candidates for (`note_commitment_1`, `note_commitment_2`)
/// in that order, already verified against their on-chain commitments by
/// the Batch Decryptor.
pub async fn handle(
    db: &dyn Database,
    algorithms: &dyn NoteAlgorithms,
    user: &UserData,
    proof: &JoinSplitProof,
    note_start_index: u64,
    decrypted: [Option<TreeNote>; 2],
    created: Timestamp,
) -> Result<JoinSplitOutcome> {
    let owner = user.id;
    let [candidate_1, candidate_2] = decrypted;

    let new_note = process_new_note(
        db,
        algorithms,
        &owner,
        &user.private_key,
        note_start_index,
        proof.note_commitment_1,
        candidate_1,
        false,
        false,
    )
    .await?;
    let change_note = process_new_note(
        db,
        algorithms,
        &owner,
        &user.private_key,
        note_start_index + 1,
        proof.note_commitment_2,
        candidate_2,
        false,
        false,
    )
    .await?;

    // Neither output note belongs to this user.
    if new_note.is_none() && change_note.is_none() {
        return Ok(JoinSplitOutcome::default());
    }

    let destroyed_1 = nullify_note(db, &owner, &proof.nullifier_1).await?;
    let destroyed_2 = nullify_note(db, &owner, &proof.nullifier_2).await?;

    let mut touched_assets = HashSet::new();
    for n in [&new_note, &change_note, &destroyed_1, &destroyed_2]
        .into_iter()
        .flatten()
    {
        touched_assets.insert(n.asset_id);
    }

    // send-to-self: a join-split serving only to produce an input for a
    // subsequent DeFi deposit.
    if proof.kind == JoinSplitKind::Send && new_note.is_some() && change_note.is_some() {
        let forward_link = algorithms.value_note_nullifier(&proof.note_commitment_1, &user.private_key);
        if db.get_util_tx_by_link(&forward_link).await?.is_none() {
            let private_input = sum_values(&destroyed_1, &destroyed_2);
            let private_output_recipient = new_note.as_ref().map(|n| n.value.clone()).unwrap_or_default();
            let private_output_sender = change_note.as_ref().map(|n| n.value.clone()).unwrap_or_default();
            let tx_fee = num_bigint::BigInt::from(private_input)
                - num_bigint::BigInt::from(private_output_recipient)
                - num_bigint::BigInt::from(private_output_sender);

            db.add_util_tx(&UserUtilTx {
                tx_hash: proof.tx_id,
                user_id: owner,
                asset_id: new_note.as_ref().map(|n| n.asset_id).unwrap_or(0),
                tx_fee,
                forward_link,
            })
            .await?;
        }
        return Ok(JoinSplitOutcome { touched_assets });
    }

    if db.get_join_split_tx(&proof.tx_id, &owner).await?.is_some() {
        db.settle_join_split_tx(&proof.tx_id, &owner, created).await?;
    } else {
        let asset_id = wire::asset_id_from_field(&proof.asset_id_raw);
        let public_value = proof.public_value.clone();
        let (public_input, public_output) = match proof.kind {
            JoinSplitKind::Deposit => (public_value, BigUint::zero()),
            JoinSplitKind::Withdraw => (BigUint::zero(), public_value),
            JoinSplitKind::Send => (BigUint::zero(), BigUint::zero()),
        };
        let input_owner = matches!(proof.kind, JoinSplitKind::Deposit).then_some(proof.public_owner);
        let output_owner = matches!(proof.kind, JoinSplitKind::Withdraw).then_some(proof.public_owner);

        db.add_join_split_tx(&UserJoinSplitTx {
            tx_hash: proof.tx_id,
            user_id: owner,
            asset_id,
            public_input,
            public_output,
            private_input: sum_values(&destroyed_1, &destroyed_2),
            private_output_recipient: new_note.as_ref().map(|n| n.value.clone()).unwrap_or_default(),
            private_output_sender: change_note.as_ref().map(|n| n.value.clone()).unwrap_or_default(),
            input_owner,
            output_owner,
            owned_by_me: change_note.is_some(),
            created,
            settled: Some(created),
        })
        .await?;
    }

    Ok(JoinSplitOutcome { touched_assets })
}

fn sum_values(a: &Option<crate::types::Note>, b: &Option<crate::types::Note>) -> BigUint {
    let mut total = BigUint::zero();
    if let Some(n) = a {
        total += &n.value;
    }
    if let Some(n) = b {
        total += &n.value;
    }
    total
}
