//! Common per-kind handler operations, spec.md §4.D "Common" section.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::collaborators::{Database, NoteAlgorithms};
use crate::error::Result;
use crate::types::{AccountId, Bytes32, Note, TreeNote};

/// If no candidate, returns nothing. If the candidate's owner isn't
/// `owner`, returns nothing. Otherwise computes the nullifier and persists
/// the note only when its value is non-zero (spec.md §3: a zero-value
/// note is never persisted). Always returns the would-be `Note` record
/// (even when not persisted) so callers can recover values for fee
/// computation.
///
/// A note is created either pending (by the Pending-Proof Ingestor) or
/// confirmed (by a block handler); `Database::add_note` is expected to
/// upgrade a matching pending note to confirmed by commitment rather than
/// duplicate it (spec.md §3 Lifecycles, §8 scenario 5).
#[allow(clippy::too_many_arguments)]
pub async fn process_new_note(
    db: &dyn Database,
    algorithms: &dyn NoteAlgorithms,
    owner: &AccountId,
    private_key: &Bytes32,
    index: u64,
    commitment: Bytes32,
    candidate: Option<TreeNote>,
    allow_chain: bool,
    pending: bool,
) -> Result<Option<Note>> {
    let candidate = match candidate {
        Some(c) => c,
        None => return Ok(None),
    };
    if candidate.owner() != *owner {
        return Ok(None);
    }

    let nullifier = algorithms.value_note_nullifier(&commitment, private_key);
    let note = Note {
        asset_id: candidate.asset_id,
        value: candidate.value,
        commitment,
        secret: candidate.note_secret,
        nullifier,
        nullified: false,
        owner: *owner,
        creator_pub_key: candidate.creator_pub_key,
        input_nullifier: candidate.input_nullifier,
        index,
        allow_chain,
        pending,
    };

    if !note.value.is_zero() {
        db.add_note(&note).await?;
    }

    Ok(Some(note))
}

/// Looks up a note by nullifier; if unknown or not owned by `owner`,
/// returns nothing. Otherwise marks it nullified in storage and returns
/// the pre-nullification note (used by callers to recover destroyed-input
/// values for fee/amount recovery).
pub async fn nullify_note(
    db: &dyn Database,
    owner: &AccountId,
    nullifier: &Bytes32,
) -> Result<Option<Note>> {
    match db.get_note_by_nullifier(nullifier).await? {
        Some(note) if note.owner == *owner && !note.nullified => {
            db.nullify_note(nullifier).await?;
            Ok(Some(note))
        }
        _ => Ok(None),
    }
}
