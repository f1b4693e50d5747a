//! In-memory fakes of the §6 collaborators, used by unit tests across
//! this crate. `tests/` holds a second, slightly richer set used by the
//! scenario tests in spec.md §8 — kept separate because integration tests
//! compile against the public lib target and can't see `#[cfg(test)]`
//! items here.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::collaborators::{Database, NoteAlgorithms};
use crate::error::Result;
use crate::types::{
    AccountId, Block, Bytes32, Claim, Note, PendingTx, SigningKey, Timestamp, TreeNote,
    UserAccountTx, UserData, UserDefiTx, UserJoinSplitTx, UserUtilTx, ViewingKey,
};

fn xor32(a: &Bytes32, b: &Bytes32) -> Bytes32 {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

#[derive(Default)]
pub struct FakeNoteAlgorithms {
    registrations: Mutex<HashMap<Vec<u8>, TreeNote>>,
}

impl FakeNoteAlgorithms {
    pub fn register(&self, viewing_key: ViewingKey, note: TreeNote) {
        self.registrations.lock().unwrap().insert(viewing_key, note);
    }
}

#[async_trait]
impl NoteAlgorithms for FakeNoteAlgorithms {
    fn value_note_nullifier(&self, commitment: &Bytes32, private_key: &Bytes32) -> Bytes32 {
        xor32(commitment, private_key)
    }

    fn claim_note_nullifier(&self, commitment: &Bytes32) -> Bytes32 {
        let mut out = *commitment;
        out[0] ^= 0xff;
        out
    }

    fn note_commitment(&self, note: &TreeNote) -> Bytes32 {
        note.note_secret
    }

    fn derive_partial_state_secret(&self, eph_pub_key: &Bytes32, private_key: &Bytes32) -> Bytes32 {
        xor32(eph_pub_key, private_key)
    }

    async fn decrypt_batch(&self, _private_key: &Bytes32, viewing_keys: &[ViewingKey]) -> Vec<Option<TreeNote>> {
        let regs = self.registrations.lock().unwrap();
        viewing_keys.iter().map(|vk| regs.get(vk).cloned()).collect()
    }
}

#[derive(Default)]
pub struct FakeDatabase {
    users: Mutex<HashMap<AccountId, UserData>>,
    signing_keys: Mutex<Vec<SigningKey>>,
    notes_by_nullifier: Mutex<HashMap<Bytes32, Note>>,
    notes_by_commitment: Mutex<HashMap<Bytes32, Bytes32>>,
    claims: Mutex<HashMap<Bytes32, Claim>>,
    join_split_txs: Mutex<HashMap<(Bytes32, AccountId), UserJoinSplitTx>>,
    account_txs: Mutex<HashMap<Bytes32, UserAccountTx>>,
    defi_txs: Mutex<HashMap<Bytes32, UserDefiTx>>,
    util_txs_by_link: Mutex<HashMap<Bytes32, UserUtilTx>>,
}

#[async_trait]
impl Database for FakeDatabase {
    async fn get_user(&self, id: &AccountId) -> Result<Option<UserData>> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn update_user(&self, user: &UserData) -> Result<()> {
        self.users.lock().unwrap().insert(user.id, user.clone());
        Ok(())
    }

    async fn add_user_signing_key(&self, key: &SigningKey) -> Result<()> {
        self.signing_keys.lock().unwrap().push(key.clone());
        Ok(())
    }

    async fn add_note(&self, note: &Note) -> Result<()> {
        self.notes_by_commitment
            .lock()
            .unwrap()
            .insert(note.commitment, note.nullifier);
        self.notes_by_nullifier
            .lock()
            .unwrap()
            .insert(note.nullifier, note.clone());
        Ok(())
    }

    async fn nullify_note(&self, nullifier: &Bytes32) -> Result<Option<Note>> {
        let mut map = self.notes_by_nullifier.lock().unwrap();
        if let Some(n) = map.get_mut(nullifier) {
            n.nullified = true;
            Ok(Some(n.clone()))
        } else {
            Ok(None)
        }
    }

    async fn remove_note(&self, nullifier: &Bytes32) -> Result<()> {
        if let Some(note) = self.notes_by_nullifier.lock().unwrap().remove(nullifier) {
            self.notes_by_commitment.lock().unwrap().remove(&note.commitment);
        }
        Ok(())
    }

    async fn get_note_by_nullifier(&self, nullifier: &Bytes32) -> Result<Option<Note>> {
        Ok(self.notes_by_nullifier.lock().unwrap().get(nullifier).cloned())
    }

    async fn get_note_by_commitment(&self, commitment: &Bytes32) -> Result<Option<Note>> {
        let nullifier = self.notes_by_commitment.lock().unwrap().get(commitment).copied();
        Ok(nullifier.and_then(|n| self.notes_by_nullifier.lock().unwrap().get(&n).cloned()))
    }

    async fn get_user_notes(&self, id: &AccountId) -> Result<Vec<Note>> {
        Ok(self
            .notes_by_nullifier
            .lock()
            .unwrap()
            .values()
            .filter(|n| &n.owner == id && !n.pending)
            .cloned()
            .collect())
    }

    async fn get_user_pending_notes(&self, id: &AccountId) -> Result<Vec<Note>> {
        Ok(self
            .notes_by_nullifier
            .lock()
            .unwrap()
            .values()
            .filter(|n| &n.owner == id && n.pending)
            .cloned()
            .collect())
    }

    async fn add_claim(&self, claim: &Claim) -> Result<()> {
        self.claims.lock().unwrap().insert(claim.nullifier, claim.clone());
        Ok(())
    }

    async fn get_claim(&self, nullifier: &Bytes32) -> Result<Option<Claim>> {
        Ok(self.claims.lock().unwrap().get(nullifier).cloned())
    }

    async fn add_join_split_tx(&self, tx: &UserJoinSplitTx) -> Result<()> {
        self.join_split_txs
            .lock()
            .unwrap()
            .insert((tx.tx_hash, tx.user_id), tx.clone());
        Ok(())
    }

    async fn get_join_split_tx(
        &self,
        tx_hash: &Bytes32,
        user_id: &AccountId,
    ) -> Result<Option<UserJoinSplitTx>> {
        Ok(self
            .join_split_txs
            .lock()
            .unwrap()
            .get(&(*tx_hash, *user_id))
            .cloned())
    }

    async fn settle_join_split_tx(
        &self,
        tx_hash: &Bytes32,
        user_id: &AccountId,
        settled: Timestamp,
    ) -> Result<()> {
        if let Some(tx) = self.join_split_txs.lock().unwrap().get_mut(&(*tx_hash, *user_id)) {
            tx.settled.get_or_insert(settled);
        }
        Ok(())
    }

    async fn add_account_tx(&self, tx: &UserAccountTx) -> Result<()> {
        self.account_txs.lock().unwrap().insert(tx.tx_hash, tx.clone());
        Ok(())
    }

    async fn get_account_tx(&self, tx_hash: &Bytes32) -> Result<Option<UserAccountTx>> {
        Ok(self.account_txs.lock().unwrap().get(tx_hash).cloned())
    }

    async fn settle_account_tx(&self, tx_hash: &Bytes32, settled: Timestamp) -> Result<()> {
        if let Some(tx) = self.account_txs.lock().unwrap().get_mut(tx_hash) {
            tx.settled.get_or_insert(settled);
        }
        Ok(())
    }

    async fn add_defi_tx(&self, tx: &UserDefiTx) -> Result<()> {
        self.defi_txs.lock().unwrap().insert(tx.tx_hash, tx.clone());
        Ok(())
    }

    async fn get_defi_tx(&self, tx_hash: &Bytes32) -> Result<Option<UserDefiTx>> {
        Ok(self.defi_txs.lock().unwrap().get(tx_hash).cloned())
    }

    async fn update_defi_tx(
        &self,
        tx_hash: &Bytes32,
        output_value_a: num_bigint::BigUint,
        output_value_b: num_bigint::BigUint,
    ) -> Result<()> {
        if let Some(tx) = self.defi_txs.lock().unwrap().get_mut(tx_hash) {
            tx.output_value_a = output_value_a;
            tx.output_value_b = output_value_b;
        }
        Ok(())
    }

    async fn settle_defi_tx(&self, tx_hash: &Bytes32, settled: Timestamp) -> Result<()> {
        if let Some(tx) = self.defi_txs.lock().unwrap().get_mut(tx_hash) {
            tx.settled.get_or_insert(settled);
        }
        Ok(())
    }

    async fn add_util_tx(&self, tx: &UserUtilTx) -> Result<()> {
        self.util_txs_by_link
            .lock()
            .unwrap()
            .insert(tx.forward_link, tx.clone());
        Ok(())
    }

    async fn get_util_tx_by_link(&self, nullifier: &Bytes32) -> Result<Option<UserUtilTx>> {
        Ok(self.util_txs_by_link.lock().unwrap().get(nullifier).cloned())
    }

    async fn get_unsettled_user_txs(&self, user_id: &AccountId) -> Result<Vec<Bytes32>> {
        let mut out = Vec::new();
        out.extend(
            self.join_split_txs
                .lock()
                .unwrap()
                .values()
                .filter(|tx| &tx.user_id == user_id && tx.settled.is_none())
                .map(|tx| tx.tx_hash),
        );
        out.extend(
            self.account_txs
                .lock()
                .unwrap()
                .values()
                .filter(|tx| &tx.user_id == user_id && tx.settled.is_none())
                .map(|tx| tx.tx_hash),
        );
        out.extend(
            self.defi_txs
                .lock()
                .unwrap()
                .values()
                .filter(|tx| &tx.user_id == user_id && tx.settled.is_none())
                .map(|tx| tx.tx_hash),
        );
        Ok(out)
    }

    async fn remove_user_tx(&self, tx_id: &Bytes32, user_id: &AccountId) -> Result<()> {
        self.join_split_txs.lock().unwrap().remove(&(*tx_id, *user_id));
        let mut account_txs = self.account_txs.lock().unwrap();
        if account_txs.get(tx_id).map(|tx| tx.user_id) == Some(*user_id) {
            account_txs.remove(tx_id);
        }
        drop(account_txs);
        let mut defi_txs = self.defi_txs.lock().unwrap();
        if defi_txs.get(tx_id).map(|tx| tx.user_id) == Some(*user_id) {
            defi_txs.remove(tx_id);
        }
        Ok(())
    }
}

/// A `RollupProvider` fake returning canned blocks and pending state.
#[derive(Default)]
pub struct FakeProvider {
    pub blocks: Mutex<Vec<Block>>,
    pub pending_txs: Mutex<Vec<PendingTx>>,
    pub pending_nullifiers: Mutex<Vec<Bytes32>>,
}

#[async_trait]
impl crate::collaborators::RollupProvider for FakeProvider {
    async fn get_blocks(&self, from_rollup_id: u32) -> Result<Vec<Block>> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.rollup_id >= from_rollup_id)
            .cloned()
            .collect())
    }

    async fn get_pending_txs(&self) -> Result<Vec<PendingTx>> {
        Ok(self.pending_txs.lock().unwrap().clone())
    }

    async fn get_pending_note_nullifiers(&self) -> Result<Vec<Bytes32>> {
        Ok(self.pending_nullifiers.lock().unwrap().clone())
    }
}
