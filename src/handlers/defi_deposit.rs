//! DefiDeposit handler (DEFI_DEPOSIT proofs), spec.md §4.D.

use std::collections::HashSet;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;

use super::common::{nullify_note, process_new_note};
use crate::collaborators::{Database, NoteAlgorithms};
use crate::error::{Result, UserStateError};
use crate::proof_classifier::DefiDepositProof;
use crate::types::{Claim, InteractionResult, Timestamp, TreeNote, UserData, UserDefiTx};

#[derive(Debug, Default)]
pub struct DefiDepositOutcome {
    pub touched_assets: HashSet<u32>,
}

/// Applies a DEFI_DEPOSIT inner proof.
pub async fn handle(
    db: &dyn Database,
    algorithms: &dyn NoteAlgorithms,
    user: &UserData,
    proof: &DefiDepositProof,
    note_start_index: u64,
    decrypted_change: Option<TreeNote>,
    interaction_results: &[InteractionResult],
    created: Timestamp,
) -> Result<DefiDepositOutcome> {
    let owner = user.id;

    // By protocol both output notes of a DeFi deposit belong to the same
    // user; failure to decrypt the change note means this deposit isn't
    // ours.
    let change_note = process_new_note(
        db,
        algorithms,
        &owner,
        &user.private_key,
        note_start_index + 1,
        proof.note_commitment_2,
        decrypted_change,
        false,
        false,
    )
    .await?;
    let change_note = match change_note {
        Some(n) => n,
        None => return Ok(DefiDepositOutcome::default()),
    };

    let partial_state_secret =
        algorithms.derive_partial_state_secret(&proof.partial_state_secret_eph_pub_key, &user.private_key);

    let interaction = find_interaction_result(interaction_results, &proof.bridge_id)?;
    let (output_value_a, output_value_b) = if interaction.result {
        // Integer division; the ratio deposit_value / total_input_value
        // is always exact by protocol.
        let a = (&interaction.total_output_value_a * &proof.deposit_value) / &interaction.total_input_value;
        let b = (&interaction.total_output_value_b * &proof.deposit_value) / &interaction.total_input_value;
        (a, b)
    } else {
        (BigUint::zero(), BigUint::zero())
    };

    let claim_nullifier = algorithms.claim_note_nullifier(&proof.note_commitment_1);
    db.add_claim(&Claim {
        tx_hash: proof.tx_id,
        secret: partial_state_secret,
        nullifier: claim_nullifier,
        owner,
    })
    .await?;

    let destroyed_1 = nullify_note(db, &owner, &proof.nullifier_1).await?;
    let destroyed_2 = nullify_note(db, &owner, &proof.nullifier_2).await?;

    let mut touched_assets = HashSet::new();
    touched_assets.insert(change_note.asset_id);
    for n in [&destroyed_1, &destroyed_2].into_iter().flatten() {
        touched_assets.insert(n.asset_id);
    }

    if db.get_defi_tx(&proof.tx_id).await?.is_some() {
        db.update_defi_tx(&proof.tx_id, output_value_a, output_value_b).await?;
        // Idempotent: a no-op if this tx was already settled.
        db.settle_defi_tx(&proof.tx_id, created).await?;
    } else {
        let util_tx = db.get_util_tx_by_link(&proof.nullifier_1).await?;
        let util_fee = util_tx.map(|u| u.tx_fee).unwrap_or_else(BigInt::zero);

        let mut private_input = BigUint::zero();
        if let Some(n) = &destroyed_1 {
            private_input += &n.value;
        }
        if let Some(n) = &destroyed_2 {
            private_input += &n.value;
        }

        let tx_fee = BigInt::from(private_input)
            - BigInt::from(change_note.value.clone())
            - BigInt::from(proof.deposit_value.clone())
            + util_fee;

        db.add_defi_tx(&UserDefiTx {
            tx_hash: proof.tx_id,
            user_id: owner,
            bridge_id: proof.bridge_id,
            deposit_value: proof.deposit_value.clone(),
            partial_state_secret,
            tx_fee,
            created,
            output_value_a,
            output_value_b,
            settled: Some(created),
        })
        .await?;
    }

    Ok(DefiDepositOutcome { touched_assets })
}

fn find_interaction_result<'a>(
    results: &'a [InteractionResult],
    bridge_id: &crate::types::BridgeId,
) -> Result<&'a InteractionResult> {
    results.iter().find(|r| &r.bridge_id == bridge_id).ok_or_else(|| {
        UserStateError::Protocol(format!(
            "block has no interactionResult for bridgeId {bridge_id:?}"
        ))
    })
}
