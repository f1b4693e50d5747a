//! Pending Reconciler (`resetData`), spec.md §4.E.
//!
//! Run once, from `UserState::init`. Local pending state from a prior
//! session may have been abandoned or timed out; the provider's pending-tx
//! view is authoritative.

use std::collections::HashSet;

use crate::collaborators::{Database, RollupProvider};
use crate::error::Result;
use crate::types::AccountId;

pub async fn reconcile_pending(
    db: &dyn Database,
    provider: &dyn RollupProvider,
    user_id: &AccountId,
) -> Result<()> {
    let pending_txs = provider.get_pending_txs().await?;
    let pending_tx_ids: HashSet<_> = pending_txs.iter().map(|tx| tx.tx_id).collect();
    let referenced_commitments: HashSet<_> = pending_txs
        .iter()
        .flat_map(|tx| [tx.note_commitment_1, tx.note_commitment_2])
        .collect();

    for tx_id in db.get_unsettled_user_txs(user_id).await? {
        if !pending_tx_ids.contains(&tx_id) {
            db.remove_user_tx(&tx_id, user_id).await?;
        }
    }

    for note in db.get_user_pending_notes(user_id).await? {
        if !referenced_commitments.contains(&note.commitment) {
            db.remove_note(&note.nullifier).await?;
        }
    }

    Ok(())
}
