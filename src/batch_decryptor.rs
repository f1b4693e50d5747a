//! Batch Decryptor, spec.md §4.C.
//!
//! Gathers the concatenated viewing-key buffer across an entire
//! `handle_blocks` call and performs a single batched trial-decrypt. Each
//! recovered candidate is then verified by recomputing its commitment and
//! comparing against the on-chain value; only matching candidates survive
//! (spec.md §8 round-trip property). One batched elliptic-curve operation
//! amortizes setup cost across the whole block set; per-note verification
//! is cheap in comparison.

use crate::collaborators::NoteAlgorithms;
use crate::types::{Bytes32, TreeNote, ViewingKey};

/// One note awaiting trial-decryption, tagged with the on-chain commitment
/// it must match to be accepted.
#[derive(Debug, Clone)]
pub struct DecryptSlot {
    pub commitment: Bytes32,
    pub viewing_key: ViewingKey,
}

/// Runs the batch and discards any candidate whose recomputed commitment
/// doesn't match. Output is aligned 1:1 with `slots`.
pub async fn decrypt_and_verify(
    algorithms: &dyn NoteAlgorithms,
    private_key: &Bytes32,
    slots: &[DecryptSlot],
) -> Vec<Option<TreeNote>> {
    let viewing_keys: Vec<ViewingKey> = slots.iter().map(|s| s.viewing_key.clone()).collect();
    let candidates = algorithms.decrypt_batch(private_key, &viewing_keys).await;

    candidates
        .into_iter()
        .zip(slots.iter())
        .map(|(candidate, slot)| {
            candidate.filter(|note| {
                let recomputed = algorithms.note_commitment(note);
                if recomputed != slot.commitment {
                    tracing::warn!(
                        commitment = %hex::encode(slot.commitment),
                        recomputed = %hex::encode(recomputed),
                        "decrypted candidate's commitment does not match on-chain commitment, discarding"
                    );
                    false
                } else {
                    true
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeAlgorithms;

    #[async_trait]
    impl NoteAlgorithms for FakeAlgorithms {
        fn value_note_nullifier(&self, commitment: &Bytes32, _private_key: &Bytes32) -> Bytes32 {
            *commitment
        }
        fn claim_note_nullifier(&self, commitment: &Bytes32) -> Bytes32 {
            *commitment
        }
        fn note_commitment(&self, note: &TreeNote) -> Bytes32 {
            // Deterministic stand-in: commitment is the first byte of the
            // secret broadcast across all 32 bytes.
            [note.note_secret[0]; 32]
        }
        async fn decrypt_batch(
            &self,
            _private_key: &Bytes32,
            viewing_keys: &[ViewingKey],
        ) -> Vec<Option<TreeNote>> {
            viewing_keys
                .iter()
                .map(|vk| {
                    if vk.is_empty() {
                        None
                    } else {
                        Some(TreeNote {
                            owner_pub_key: [0u8; 32],
                            owner_nonce: 0,
                            asset_id: 0,
                            value: num_bigint::BigUint::from(1u32),
                            note_secret: [vk[0]; 32],
                            creator_pub_key: [0u8; 32],
                            input_nullifier: [0u8; 32],
                        })
                    }
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn mismatched_commitment_is_discarded() {
        let algos = FakeAlgorithms;
        let slots = vec![
            DecryptSlot {
                commitment: [9u8; 32],
                viewing_key: vec![9u8],
            },
            DecryptSlot {
                commitment: [1u8; 32],
                viewing_key: vec![],
            },
        ];
        let out = decrypt_and_verify(&algos, &[0u8; 32], &slots).await;
        assert!(out[0].is_some());
        assert!(out[1].is_none());
    }

    #[tokio::test]
    async fn commitment_mismatch_discards_even_a_decrypted_candidate() {
        let algos = FakeAlgorithms;
        let slots = vec![DecryptSlot {
            commitment: [5u8; 32],
            viewing_key: vec![9u8], // decrypts to secret [9;32] -> commitment [9;32] != [5;32]
        }];
        let out = decrypt_and_verify(&algos, &[0u8; 32], &slots).await;
        assert!(out[0].is_none());
    }
}
