//! Scenario tests, spec.md §8 "Concrete scenarios" 1-5. Each test drives a
//! real `UserState` over fake collaborators through the raw wire format
//! `wire` decodes, so it exercises the same path a rollup provider
//! response would take rather than calling handler functions directly.
//!
//! Scenario 6 (pending reconciliation) is covered at the unit level in
//! `pending_reconciler`'s own tests; the others are end-to-end here.

mod support;

use std::sync::Arc;

use num_bigint::BigUint;
use shielded_user_state::collaborators::{Database, NoteAlgorithms};
use shielded_user_state::config::UserStateConfig;
use shielded_user_state::pending_ingestor::{ProofOutput, ProofOutputNote, ProofTx};
use shielded_user_state::proof_classifier::JoinSplitKind;
use shielded_user_state::test_support::{FakeDatabase, FakeNoteAlgorithms, FakeProvider};
use shielded_user_state::types::{
    AccountId, Block, BridgeId, InteractionResult, Timestamp, TreeNote, UserData, UserStateEvent,
};
use shielded_user_state::UserState;

use support::*;

fn test_user() -> UserData {
    UserData::new(AccountId::new([1u8; 32], 0), [1u8; 32], [0xaau8; 32])
}

fn tree_note(owner: AccountId, asset_id: u32, value: u64, secret: [u8; 32]) -> TreeNote {
    TreeNote {
        owner_pub_key: owner.public_key,
        owner_nonce: owner.nonce,
        asset_id,
        value: BigUint::from(value),
        note_secret: secret,
        creator_pub_key: [0u8; 32],
        input_nullifier: [0u8; 32],
    }
}

type TestState = UserState<FakeDatabase, FakeProvider, FakeNoteAlgorithms>;

fn make_state(user: UserData) -> (Arc<TestState>, Arc<FakeDatabase>, Arc<FakeProvider>, Arc<FakeNoteAlgorithms>) {
    let db = Arc::new(FakeDatabase::default());
    let provider = Arc::new(FakeProvider::default());
    let algorithms = Arc::new(FakeNoteAlgorithms::default());
    let state = Arc::new(UserState::new(
        user,
        Arc::clone(&db),
        Arc::clone(&provider),
        Arc::clone(&algorithms),
        UserStateConfig::default(),
    ));
    (state, db, provider, algorithms)
}

#[tokio::test]
async fn scenario_1_deposit_settlement() {
    let user = test_user();
    let (state, db, _provider, algorithms) = make_state(user.clone());

    let note = tree_note(user.id, 0, 1000, [10u8; 32]);
    algorithms.register(viewing_key(1), note.clone());

    let mut rx = state.subscribe();

    let proof = RawInnerProof {
        proof_id: PROOF_DEPOSIT,
        note_commitment_1: [10u8; 32],
        note_commitment_2: [20u8; 32],
        nullifier_1: [30u8; 32],
        nullifier_2: [31u8; 32],
        public_value: 1000,
        public_owner: [7u8; 32],
        asset_id: 0,
        tx_id: [99u8; 32],
    };
    let offchain = encode_join_split_offchain(&viewing_key(1), &viewing_key(2));
    let block = Block {
        rollup_id: 0,
        rollup_proof_data: encode_rollup_proof_data(0, 0, &[proof]),
        offchain_tx_data: vec![offchain],
        interaction_result: vec![],
        created: Timestamp(500),
    };

    state.handle_blocks(vec![block]).await.unwrap();

    assert_eq!(state.get_balance(0).await, BigUint::from(1000u32));
    assert_eq!(state.synced_to_rollup().await, 0);

    let tx = db.get_join_split_tx(&[99u8; 32], &user.id).await.unwrap().unwrap();
    assert_eq!(tx.public_input, BigUint::from(1000u32));
    assert_eq!(tx.private_output_recipient, BigUint::from(1000u32));
    assert!(tx.settled.is_some());

    let first = rx.recv().await.unwrap();
    match first {
        UserStateEvent::UpdatedUserState {
            asset_id: Some(0),
            balance,
            diff,
            ..
        } => {
            assert_eq!(balance, Some(BigUint::from(1000u32)));
            assert_eq!(diff, Some(num_bigint::BigInt::from(1000)));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    let trailing = rx.recv().await.unwrap();
    assert!(matches!(
        trailing,
        UserStateEvent::UpdatedUserState { asset_id: None, .. }
    ));
}

#[tokio::test]
async fn scenario_2_send_to_self_is_a_util_tx() {
    let user = test_user();
    let (state, db, _provider, algorithms) = make_state(user.clone());

    let note1 = tree_note(user.id, 0, 600, [11u8; 32]);
    let note2 = tree_note(user.id, 0, 400, [12u8; 32]);
    algorithms.register(viewing_key(1), note1);
    algorithms.register(viewing_key(2), note2);

    let proof = RawInnerProof {
        proof_id: PROOF_SEND,
        note_commitment_1: [11u8; 32],
        note_commitment_2: [12u8; 32],
        nullifier_1: [40u8; 32],
        nullifier_2: [41u8; 32],
        public_value: 0,
        public_owner: [0u8; 32],
        asset_id: 0,
        tx_id: [98u8; 32],
    };
    let offchain = encode_join_split_offchain(&viewing_key(1), &viewing_key(2));
    let block = Block {
        rollup_id: 0,
        rollup_proof_data: encode_rollup_proof_data(0, 0, &[proof]),
        offchain_tx_data: vec![offchain],
        interaction_result: vec![],
        created: Timestamp(1),
    };

    state.handle_blocks(vec![block]).await.unwrap();

    assert!(db.get_join_split_tx(&[98u8; 32], &user.id).await.unwrap().is_none());

    let forward_link = algorithms.value_note_nullifier(&[11u8; 32], &user.private_key);
    let util_tx = db.get_util_tx_by_link(&forward_link).await.unwrap();
    assert!(util_tx.is_some());
    assert_eq!(util_tx.unwrap().forward_link, forward_link);
}

#[tokio::test]
async fn scenario_3_defi_deposit_then_claim() {
    let user = test_user();
    let (state, db, _provider, algorithms) = make_state(user.clone());

    let bridge_id = BridgeId {
        input_asset_id: 0,
        output_asset_id_a: 5,
        output_asset_id_b: 0,
    };

    let change_note = tree_note(user.id, 0, 0, [21u8; 32]);
    algorithms.register(viewing_key(9), change_note);

    let deposit_proof = RawInnerProof {
        proof_id: PROOF_DEFI_DEPOSIT,
        note_commitment_1: [20u8; 32], // claim note, not decrypted
        note_commitment_2: [21u8; 32], // change note
        nullifier_1: [50u8; 32],
        nullifier_2: [51u8; 32],
        public_value: 0,
        public_owner: [0u8; 32],
        asset_id: 0,
        tx_id: [70u8; 32],
    };
    let deposit_offchain = encode_defi_deposit_offchain(
        &viewing_key(9),
        bridge_id.input_asset_id,
        bridge_id.output_asset_id_a,
        bridge_id.output_asset_id_b,
        100,
        [3u8; 32],
    );
    let block1 = Block {
        rollup_id: 0,
        rollup_proof_data: encode_rollup_proof_data(0, 0, &[deposit_proof]),
        offchain_tx_data: vec![deposit_offchain],
        interaction_result: vec![InteractionResult {
            bridge_id,
            total_input_value: BigUint::from(100u32),
            total_output_value_a: BigUint::from(300u32),
            total_output_value_b: BigUint::from(0u32),
            result: true,
        }],
        created: Timestamp(10),
    };

    state.handle_blocks(vec![block1]).await.unwrap();

    let claim_nullifier = algorithms.claim_note_nullifier(&[20u8; 32]);
    let claim = db.get_claim(&claim_nullifier).await.unwrap().unwrap();
    assert_eq!(claim.owner, user.id);

    let defi_tx = db.get_defi_tx(&[70u8; 32]).await.unwrap().unwrap();
    assert_eq!(defi_tx.output_value_a, BigUint::from(300u32));
    assert_eq!(defi_tx.output_value_b, BigUint::from(0u32));

    let claim_proof = RawInnerProof {
        proof_id: PROOF_DEFI_CLAIM,
        note_commitment_1: [22u8; 32],
        note_commitment_2: [23u8; 32],
        nullifier_1: claim_nullifier,
        nullifier_2: [52u8; 32],
        public_value: 0,
        public_owner: [0u8; 32],
        asset_id: 0,
        tx_id: [71u8; 32],
    };
    let block2 = Block {
        rollup_id: 1,
        rollup_proof_data: encode_rollup_proof_data(1, 2, &[claim_proof]),
        offchain_tx_data: vec![vec![]],
        interaction_result: vec![],
        created: Timestamp(20),
    };

    state.handle_blocks(vec![block2]).await.unwrap();

    assert_eq!(state.get_balance(5).await, BigUint::from(300u32));
    let defi_tx = db.get_defi_tx(&[70u8; 32]).await.unwrap().unwrap();
    assert!(defi_tx.settled.is_some());
}

#[tokio::test]
async fn scenario_4_failed_defi_materializes_refund() {
    let user = test_user();
    let (state, db, _provider, algorithms) = make_state(user.clone());

    let bridge_id = BridgeId {
        input_asset_id: 2,
        output_asset_id_a: 5,
        output_asset_id_b: 0,
    };

    let change_note = tree_note(user.id, 2, 0, [21u8; 32]);
    algorithms.register(viewing_key(9), change_note);

    let deposit_proof = RawInnerProof {
        proof_id: PROOF_DEFI_DEPOSIT,
        note_commitment_1: [20u8; 32],
        note_commitment_2: [21u8; 32],
        nullifier_1: [50u8; 32],
        nullifier_2: [51u8; 32],
        public_value: 0,
        public_owner: [0u8; 32],
        asset_id: 0,
        tx_id: [70u8; 32],
    };
    let deposit_offchain = encode_defi_deposit_offchain(
        &viewing_key(9),
        bridge_id.input_asset_id,
        bridge_id.output_asset_id_a,
        bridge_id.output_asset_id_b,
        100,
        [3u8; 32],
    );
    let block1 = Block {
        rollup_id: 0,
        rollup_proof_data: encode_rollup_proof_data(0, 0, &[deposit_proof]),
        offchain_tx_data: vec![deposit_offchain],
        interaction_result: vec![InteractionResult {
            bridge_id,
            total_input_value: BigUint::from(100u32),
            total_output_value_a: BigUint::from(300u32),
            total_output_value_b: BigUint::from(0u32),
            result: false,
        }],
        created: Timestamp(10),
    };
    state.handle_blocks(vec![block1]).await.unwrap();

    let defi_tx = db.get_defi_tx(&[70u8; 32]).await.unwrap().unwrap();
    assert_eq!(defi_tx.output_value_a, BigUint::from(0u32));
    assert_eq!(defi_tx.output_value_b, BigUint::from(0u32));

    let claim_nullifier = algorithms.claim_note_nullifier(&[20u8; 32]);
    let claim_proof = RawInnerProof {
        proof_id: PROOF_DEFI_CLAIM,
        note_commitment_1: [22u8; 32],
        note_commitment_2: [23u8; 32],
        nullifier_1: claim_nullifier,
        nullifier_2: [52u8; 32],
        public_value: 0,
        public_owner: [0u8; 32],
        asset_id: 0,
        tx_id: [71u8; 32],
    };
    let block2 = Block {
        rollup_id: 1,
        rollup_proof_data: encode_rollup_proof_data(1, 2, &[claim_proof]),
        offchain_tx_data: vec![vec![]],
        interaction_result: vec![],
        created: Timestamp(20),
    };
    state.handle_blocks(vec![block2]).await.unwrap();

    // refund note on the bridge's input asset, valued at the original deposit.
    assert_eq!(state.get_balance(2).await, BigUint::from(100u32));
    assert_eq!(state.get_balance(5).await, BigUint::from(0u32));
}

#[tokio::test]
async fn scenario_5_block_settles_a_locally_pending_withdraw_without_duplicating_notes() {
    let user = test_user();
    let (state, db, _provider, algorithms) = make_state(user.clone());

    let tx_hash = [55u8; 32];
    let change_note = tree_note(user.id, 0, 400, [33u8; 32]);

    // Locally build and submit the withdraw before it lands on-chain.
    state
        .add_proof(
            ProofOutput {
                tx_hash,
                tx: ProofTx::JoinSplit {
                    kind: JoinSplitKind::Withdraw,
                    asset_id: 0,
                    public_input: BigUint::from(0u32),
                    public_output: BigUint::from(600u32),
                    input_owner: None,
                    output_owner: Some([6u8; 32]),
                },
                output_notes: vec![ProofOutputNote {
                    commitment: [33u8; 32],
                    note: change_note.clone(),
                    allow_chain: false,
                }],
                parent_proof: None,
                backward_link: None,
            },
            Timestamp(1),
        )
        .await
        .unwrap();

    assert!(db
        .get_join_split_tx(&tx_hash, &user.id)
        .await
        .unwrap()
        .unwrap()
        .settled
        .is_none());
    assert_eq!(db.get_user_pending_notes(&user.id).await.unwrap().len(), 1);

    // Now the same transaction lands on-chain; the change note re-decrypts
    // to the identical commitment.
    algorithms.register(viewing_key(1), change_note);
    let proof = RawInnerProof {
        proof_id: PROOF_WITHDRAW,
        note_commitment_1: [34u8; 32], // not ours
        note_commitment_2: [33u8; 32], // same commitment as the pending note
        nullifier_1: [60u8; 32],
        nullifier_2: [61u8; 32],
        public_value: 600,
        public_owner: [6u8; 32],
        asset_id: 0,
        tx_id: tx_hash,
    };
    let offchain = encode_join_split_offchain(&viewing_key(2), &viewing_key(1));
    let block = Block {
        rollup_id: 0,
        rollup_proof_data: encode_rollup_proof_data(0, 0, &[proof]),
        offchain_tx_data: vec![offchain],
        interaction_result: vec![],
        created: Timestamp(2),
    };

    state.handle_blocks(vec![block]).await.unwrap();

    let tx = db.get_join_split_tx(&tx_hash, &user.id).await.unwrap().unwrap();
    assert_eq!(tx.settled, Some(Timestamp(2)));
    assert_eq!(db.get_user_notes(&user.id).await.unwrap().len(), 1);
    assert!(db.get_user_pending_notes(&user.id).await.unwrap().is_empty());
}
