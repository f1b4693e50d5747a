//! Pending-Proof Ingestor (`addProof`), spec.md §4.G.
//!
//! Accepts a locally-constructed `ProofOutput`, walks `parent_proof`
//! depth-first so ancestors persist before descendants, and writes pending
//! tx + pending note records into the same database the block pipeline
//! writes confirmed ones into.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::collaborators::{Database, NoteAlgorithms};
use crate::error::Result;
use crate::handlers::common::process_new_note;
use crate::proof_classifier::JoinSplitKind;
use crate::types::{
    BridgeId, Bytes32, Timestamp, TreeNote, UserAccountTx, UserData, UserDefiTx, UserJoinSplitTx,
    UserUtilTx,
};

/// Kind-specific data a locally-built proof carries, mirroring the fields
/// the block pipeline would have recovered from an on-chain inner proof
/// plus its off-chain payload (spec.md §4.D recovery rules), but supplied
/// directly by the transaction builder instead of decoded from bytes.
#[derive(Debug, Clone)]
pub enum ProofTx {
    JoinSplit {
        kind: JoinSplitKind,
        asset_id: u32,
        public_input: num_bigint::BigUint,
        public_output: num_bigint::BigUint,
        input_owner: Option<Bytes32>,
        output_owner: Option<Bytes32>,
    },
    Account {
        alias_hash: Bytes32,
        nonce: u32,
        new_signing_key_1: Option<Bytes32>,
        new_signing_key_2: Option<Bytes32>,
        migrated: bool,
    },
    DefiDeposit {
        bridge_id: BridgeId,
        deposit_value: num_bigint::BigUint,
        partial_state_secret: Bytes32,
    },
}

/// One output note of a locally-built proof, already in `TreeNote` form
/// (the transaction builder knows the plaintext, no decryption needed).
#[derive(Debug, Clone)]
pub struct ProofOutputNote {
    pub commitment: Bytes32,
    pub note: TreeNote,
    /// Whether this output note may be chained into as an input by a
    /// subsequent proof before its own settlement (spec.md §4.G).
    pub allow_chain: bool,
}

/// A locally-constructed proof awaiting submission, spec.md §4.G.
#[derive(Debug, Clone)]
pub struct ProofOutput {
    pub tx_hash: Bytes32,
    pub tx: ProofTx,
    /// Output notes in `(commitment1, note1)`-then-`(commitment2, note2)`
    /// order; `output_notes[0]` is always present, the second only when
    /// the proof kind produces two.
    pub output_notes: Vec<ProofOutputNote>,
    pub parent_proof: Option<Box<ProofOutput>>,
    /// Informational only for this component (spec.md §4.G) — excluding
    /// in-flight notes from selection is done via the provider's
    /// pending-nullifier set, not by tracking this link locally.
    pub backward_link: Option<Bytes32>,
}

#[derive(Debug, Default)]
pub struct AddProofOutcome {
    /// Whether the NotePicker should be refreshed because at least one
    /// non-zero-value pending note was added across the whole chain.
    pub notes_added: bool,
}

/// Persists `proof` and, depth-first, every ancestor reachable through
/// `parent_proof` before it, so ancestors are visible to later lookups
/// before descendants (spec.md §4.G).
pub async fn add_proof(
    db: &dyn Database,
    algorithms: &dyn NoteAlgorithms,
    user: &UserData,
    proof: ProofOutput,
    created: Timestamp,
) -> Result<AddProofOutcome> {
    let mut outcome = AddProofOutcome::default();
    add_proof_rec(db, algorithms, user, proof, created, &mut outcome).await?;
    Ok(outcome)
}

/// `parent_proof` recursion needs a boxed future since `async fn` can't be
/// directly self-referential; this is the standard pattern for recursive
/// async functions without pulling in a dedicated macro crate.
fn add_proof_rec<'a>(
    db: &'a dyn Database,
    algorithms: &'a dyn NoteAlgorithms,
    user: &'a UserData,
    proof: ProofOutput,
    created: Timestamp,
    outcome: &'a mut AddProofOutcome,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if let Some(parent) = proof.parent_proof {
            add_proof_rec(db, algorithms, user, *parent, created, outcome).await?;
        }

        persist_tx_record(db, algorithms, user, &proof, created).await?;

        let mut added_any = false;
        for output in &proof.output_notes {
            let persisted = process_new_note(
                db,
                algorithms,
                &user.id,
                &user.private_key,
                0,
                output.commitment,
                Some(output.note.clone()),
                output.allow_chain,
                true,
            )
            .await?;
            if matches!(&persisted, Some(n) if !n.value.is_zero()) {
                added_any = true;
            }
        }
        if added_any {
            outcome.notes_added = true;
        }

        Ok(())
    })
}

async fn persist_tx_record(
    db: &dyn Database,
    algorithms: &dyn NoteAlgorithms,
    user: &UserData,
    proof: &ProofOutput,
    created: Timestamp,
) -> Result<()> {
    let first_output = proof.output_notes.first();

    // A SEND whose first output is owned by this user (same pubkey and
    // nonce) is a util-tx: it exists only to feed a subsequent DeFi
    // deposit, spec.md §4.G step 1.
    if let ProofTx::JoinSplit {
        kind: JoinSplitKind::Send,
        ..
    } = &proof.tx
    {
        if let Some(out) = first_output {
            if out.note.owner() == user.id {
                let forward_link = algorithms.value_note_nullifier(&out.commitment, &user.private_key);
                let private_input = num_bigint::BigUint::zero(); // unknown for locally-built proofs with no input recovery here
                let private_output_recipient = out.note.value.clone();
                let private_output_sender = proof
                    .output_notes
                    .get(1)
                    .map(|n| n.note.value.clone())
                    .unwrap_or_default();
                let tx_fee = BigInt::from(private_input)
                    - BigInt::from(private_output_recipient)
                    - BigInt::from(private_output_sender);

                db.add_util_tx(&UserUtilTx {
                    tx_hash: proof.tx_hash,
                    user_id: user.id,
                    asset_id: out.note.asset_id,
                    tx_fee,
                    forward_link,
                })
                .await?;
                return Ok(());
            }
        }
    }

    match &proof.tx {
        ProofTx::JoinSplit {
            asset_id,
            public_input,
            public_output,
            input_owner,
            output_owner,
            ..
        } => {
            let recipient = first_output.map(|n| n.note.value.clone()).unwrap_or_default();
            let sender = proof
                .output_notes
                .get(1)
                .map(|n| n.note.value.clone())
                .unwrap_or_default();
            db.add_join_split_tx(&UserJoinSplitTx {
                tx_hash: proof.tx_hash,
                user_id: user.id,
                asset_id: *asset_id,
                public_input: public_input.clone(),
                public_output: public_output.clone(),
                private_input: num_bigint::BigUint::zero(),
                private_output_recipient: recipient,
                private_output_sender: sender.clone(),
                input_owner: *input_owner,
                output_owner: *output_owner,
                owned_by_me: proof.output_notes.len() > 1,
                created,
                settled: None,
            })
            .await?;
        }
        ProofTx::Account {
            alias_hash,
            new_signing_key_1,
            new_signing_key_2,
            migrated,
            ..
        } => {
            db.add_account_tx(&UserAccountTx {
                tx_hash: proof.tx_hash,
                user_id: user.id,
                alias_hash: *alias_hash,
                new_signing_key_1: *new_signing_key_1,
                new_signing_key_2: *new_signing_key_2,
                migrated: *migrated,
                created,
                settled: None,
            })
            .await?;
        }
        ProofTx::DefiDeposit {
            bridge_id,
            deposit_value,
            partial_state_secret,
        } => {
            db.add_defi_tx(&UserDefiTx {
                tx_hash: proof.tx_hash,
                user_id: user.id,
                bridge_id: *bridge_id,
                deposit_value: deposit_value.clone(),
                partial_state_secret: *partial_state_secret,
                tx_fee: BigInt::zero(),
                created,
                output_value_a: num_bigint::BigUint::zero(),
                output_value_b: num_bigint::BigUint::zero(),
                settled: None,
            })
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDatabase, FakeNoteAlgorithms};
    use crate::types::AccountId;
    use num_bigint::BigUint;

    fn user() -> UserData {
        UserData::new(AccountId::new([1u8; 32], 0), [1u8; 32], [2u8; 32])
    }

    fn note_for(owner: AccountId, value: u64) -> TreeNote {
        TreeNote {
            owner_pub_key: owner.public_key,
            owner_nonce: owner.nonce,
            asset_id: 0,
            value: BigUint::from(value),
            note_secret: [7u8; 32],
            creator_pub_key: [0u8; 32],
            input_nullifier: [0u8; 32],
        }
    }

    #[tokio::test]
    async fn send_to_self_is_recorded_as_util_tx_not_join_split() {
        let db = FakeDatabase::default();
        let algos = FakeNoteAlgorithms::default();
        let u = user();

        let proof = ProofOutput {
            tx_hash: [3u8; 32],
            tx: ProofTx::JoinSplit {
                kind: JoinSplitKind::Send,
                asset_id: 0,
                public_input: BigUint::from(0u32),
                public_output: BigUint::from(0u32),
                input_owner: None,
                output_owner: None,
            },
            output_notes: vec![
                ProofOutputNote {
                    commitment: [4u8; 32],
                    note: note_for(u.id, 100),
                    allow_chain: false,
                },
                ProofOutputNote {
                    commitment: [5u8; 32],
                    note: note_for(u.id, 50),
                    allow_chain: false,
                },
            ],
            parent_proof: None,
            backward_link: None,
        };

        let outcome = add_proof(&db, &algos, &u, proof, Timestamp(1)).await.unwrap();
        assert!(outcome.notes_added);
        assert!(db.get_join_split_tx(&[3u8; 32], &u.id).await.unwrap().is_none());
        assert!(db.get_util_tx_by_link(&algos.value_note_nullifier(&[4u8; 32], &u.private_key))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn ancestors_persist_before_descendants() {
        let db = FakeDatabase::default();
        let algos = FakeNoteAlgorithms::default();
        let u = user();

        let parent = ProofOutput {
            tx_hash: [1u8; 32],
            tx: ProofTx::JoinSplit {
                kind: JoinSplitKind::Deposit,
                asset_id: 0,
                public_input: BigUint::from(100u32),
                public_output: BigUint::from(0u32),
                input_owner: Some([9u8; 32]),
                output_owner: None,
            },
            output_notes: vec![ProofOutputNote {
                commitment: [2u8; 32],
                note: note_for(u.id, 100),
                allow_chain: true,
            }],
            parent_proof: None,
            backward_link: None,
        };
        let child = ProofOutput {
            tx_hash: [10u8; 32],
            tx: ProofTx::JoinSplit {
                kind: JoinSplitKind::Withdraw,
                asset_id: 0,
                public_input: BigUint::from(0u32),
                public_output: BigUint::from(100u32),
                input_owner: None,
                output_owner: Some([9u8; 32]),
            },
            output_notes: vec![],
            parent_proof: Some(Box::new(parent)),
            backward_link: None,
        };

        add_proof(&db, &algos, &u, child, Timestamp(2)).await.unwrap();

        assert!(db.get_join_split_tx(&[1u8; 32], &u.id).await.unwrap().is_some());
        assert!(db.get_join_split_tx(&[10u8; 32], &u.id).await.unwrap().is_some());
    }
}
