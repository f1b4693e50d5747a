//! Account handler (ACCOUNT proofs), spec.md §4.D.

use crate::collaborators::Database;
use crate::error::Result;
use crate::proof_classifier::AccountProof;
use crate::types::{is_zero, AccountId, SigningKey, Timestamp, UserAccountTx, UserData};

/// Applies an ACCOUNT inner proof. No decryption is needed — all data is
/// plaintext in the off-chain payload.
pub async fn handle(
    db: &dyn Database,
    user: &UserData,
    proof: &AccountProof,
    note_start_index: u64,
    created: Timestamp,
) -> Result<()> {
    let account_id = AccountId::new(proof.account_public_key, proof.account_alias_id.nonce);
    if account_id != user.id {
        return Ok(());
    }

    if !is_zero(&proof.spending_key_1) {
        db.add_user_signing_key(&SigningKey {
            account_id,
            key: proof.spending_key_1,
            tree_index: note_start_index,
        })
        .await?;
    }
    if !is_zero(&proof.spending_key_2) {
        db.add_user_signing_key(&SigningKey {
            account_id,
            key: proof.spending_key_2,
            tree_index: note_start_index + 1,
        })
        .await?;
    }

    if user.alias_hash != Some(proof.account_alias_id.alias_hash) {
        let mut updated = user.clone();
        updated.alias_hash = Some(proof.account_alias_id.alias_hash);
        db.update_user(&updated).await?;
    }

    if db.get_account_tx(&proof.tx_id).await?.is_some() {
        db.settle_account_tx(&proof.tx_id, created).await?;
    } else {
        let migrated = !is_zero(&proof.nullifier_1);
        db.add_account_tx(&UserAccountTx {
            tx_hash: proof.tx_id,
            user_id: user.id,
            alias_hash: proof.account_alias_id.alias_hash,
            new_signing_key_1: (!is_zero(&proof.spending_key_1)).then_some(proof.spending_key_1),
            new_signing_key_2: (!is_zero(&proof.spending_key_2)).then_some(proof.spending_key_2),
            migrated,
            created,
            settled: Some(created),
        })
        .await?;
    }

    Ok(())
}
