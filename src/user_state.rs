//! `UserState`, the top-level orchestrator, spec.md §2 and §4.F/§4.G.
//!
//! Wires together the Block Queue & Sync FSM, Batch Decryptor, Proof
//! Classifier, per-kind handlers, NotePicker, Pending Reconciler, Pending
//! Proof Ingestor and Balance Emitter into the single entry point an
//! embedding application drives: `init`, `start_sync`, `process_block`,
//! `stop_sync`, `add_proof`.

use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigUint;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::balance_emitter::BalanceEmitter;
use crate::batch_decryptor::{decrypt_and_verify, DecryptSlot};
use crate::block_queue::{can_transition, BlockQueue, BlockQueueReceiver, StopSignal};
use crate::collaborators::{Database, NoteAlgorithms, RollupProvider};
use crate::config::UserStateConfig;
use crate::error::Result;
use crate::handlers::{account, defi_claim, defi_deposit, join_split};
use crate::note_picker::NotePicker;
use crate::pending_ingestor::{self, AddProofOutcome, ProofOutput};
use crate::pending_reconciler;
use crate::proof_classifier::{self, ClassifiedProof};
use crate::types::{AccountId, Block, NullifierSet, SyncState, UserData, UserStateEvent};
use crate::wire;

/// Per-user state synchronizer. Generic over the three external
/// collaborators (spec.md §6) so tests can substitute in-memory fakes.
pub struct UserState<D, P, N> {
    db: Arc<D>,
    provider: Arc<P>,
    algorithms: Arc<N>,
    user: RwLock<UserData>,
    note_pickers: RwLock<HashMap<u32, NotePicker>>,
    emitter: BalanceEmitter,
    sync_state: watch::Sender<SyncState>,
    queue: Mutex<Option<BlockQueue>>,
    stop_signal: Mutex<Option<StopSignal>>,
    drain_task: Mutex<Option<JoinHandle<()>>>,
}

impl<D, P, N> UserState<D, P, N>
where
    D: Database + 'static,
    P: RollupProvider + 'static,
    N: NoteAlgorithms + 'static,
{
    pub fn new(user: UserData, db: Arc<D>, provider: Arc<P>, algorithms: Arc<N>, config: UserStateConfig) -> Self {
        let (sync_state, _) = watch::channel(SyncState::Off);
        Self {
            db,
            provider,
            algorithms,
            user: RwLock::new(user),
            note_pickers: RwLock::new(HashMap::new()),
            emitter: BalanceEmitter::new(config.event_channel_capacity),
            sync_state,
            queue: Mutex::new(None),
            stop_signal: Mutex::new(None),
            drain_task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserStateEvent> {
        self.emitter.subscribe()
    }

    pub async fn user_id(&self) -> AccountId {
        self.user.read().await.id
    }

    pub async fn synced_to_rollup(&self) -> i64 {
        self.user.read().await.synced_to_rollup
    }

    pub fn sync_state(&self) -> SyncState {
        *self.sync_state.borrow()
    }

    /// Loads persisted user state (falling back to the constructor's value
    /// if absent), runs the Pending Reconciler (spec.md §4.E), and
    /// refreshes the NotePicker from storage.
    #[instrument(skip(self))]
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        let id = self.user.read().await.id;
        if let Some(stored) = self.db.get_user(&id).await? {
            *self.user.write().await = stored;
        }

        pending_reconciler::reconcile_pending(self.db.as_ref(), self.provider.as_ref(), &id).await?;
        self.refresh_note_pickers().await?;
        Ok(())
    }

    /// `startSync`, spec.md §4.F: no-op unless currently `Off`. Fetches and
    /// applies all blocks since `synced_to_rollup`, then begins draining
    /// the live block queue and transitions to `Monitoring`.
    #[instrument(skip(self))]
    pub async fn start_sync(self: &Arc<Self>) -> Result<()> {
        if self.sync_state() != SyncState::Off {
            return Ok(());
        }
        self.transition(SyncState::Synching);

        let from = (self.user.read().await.synced_to_rollup + 1).max(0) as u32;
        let blocks = self.provider.get_blocks(from).await?;
        self.handle_blocks(blocks).await?;

        let (queue, receiver) = BlockQueue::channel();
        let stop_signal = StopSignal::new();
        *self.queue.lock().await = Some(queue);
        *self.stop_signal.lock().await = Some(stop_signal.clone());

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.drain(receiver, stop_signal).await;
        });
        *self.drain_task.lock().await = Some(handle);

        self.transition(SyncState::Monitoring);
        Ok(())
    }

    /// `processBlock`, spec.md §4.F: enqueues a block for serial
    /// processing by the drain task. A silent no-op once the queue has
    /// been torn down.
    pub async fn process_block(&self, block: Block) {
        if let Some(queue) = self.queue.lock().await.as_ref() {
            queue.push(block);
        }
    }

    /// `stopSync(flush)`, spec.md §4.F: closes the queue and waits for the
    /// drain task to terminate before transitioning to `Off`.
    #[instrument(skip(self))]
    pub async fn stop_sync(&self, flush: bool) -> Result<()> {
        if self.sync_state() == SyncState::Off {
            return Ok(());
        }
        let stop_signal = self.stop_signal.lock().await.take();
        *self.queue.lock().await = None;
        if let Some(signal) = stop_signal {
            signal.signal(flush);
        }
        if let Some(handle) = self.drain_task.lock().await.take() {
            let _ = handle.await;
        }
        self.transition(SyncState::Off);
        Ok(())
    }

    /// `awaitSynchronised`, spec.md §4.F: blocks until the state leaves
    /// `Synching`.
    pub async fn await_synchronised(&self) {
        let mut rx = self.sync_state.subscribe();
        while *rx.borrow() == SyncState::Synching {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    fn transition(&self, to: SyncState) {
        let from = *self.sync_state.borrow();
        debug_assert!(can_transition(from, to), "illegal sync transition {from:?} -> {to:?}");
        let _ = self.sync_state.send(to);
    }

    /// The drain task body: consumes blocks off `receiver` one at a time,
    /// applying each via `handle_blocks` before pulling the next, until
    /// `stop_signal` fires.
    async fn drain(self: Arc<Self>, mut receiver: BlockQueueReceiver, stop_signal: StopSignal) {
        loop {
            tokio::select! {
                biased;
                discard = stop_signal.wait() => {
                    if !discard {
                        while let Ok(block) = receiver.receiver.try_recv() {
                            if let Err(err) = self.handle_blocks(vec![block]).await {
                                tracing::error!(error = %err, "failed to apply block while flushing queue");
                                return;
                            }
                        }
                    }
                    return;
                }
                maybe_block = receiver.receiver.recv() => {
                    match maybe_block {
                        Some(block) => {
                            if let Err(err) = self.handle_blocks(vec![block]).await {
                                tracing::error!(error = %err, "failed to apply block, halting drain task");
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    }

    /// Applies a batch of blocks: decodes, batches trial-decryption across
    /// the whole set (spec.md §4.C), dispatches each inner proof to its
    /// handler in order, updates `synced_to_rollup`, refreshes the
    /// NotePicker, and emits balance-diff events (spec.md §4.H).
    #[instrument(skip(self, blocks), fields(count = blocks.len()))]
    pub async fn handle_blocks(self: &Arc<Self>, blocks: Vec<Block>) -> Result<()> {
        if blocks.is_empty() {
            return Ok(());
        }

        let before = self.snapshot_balances().await;

        let synced_to_rollup = self.user.read().await.synced_to_rollup;
        let mut blocks: Vec<Block> = blocks
            .into_iter()
            .filter(|b| i64::from(b.rollup_id) > synced_to_rollup)
            .collect();
        blocks.sort_by_key(|b| b.rollup_id);

        if blocks.is_empty() {
            return Ok(());
        }

        let mut plan = Vec::new();
        let mut slots = Vec::new();
        for block in &blocks {
            let decoded = wire::decode_rollup_proof_data(&block.rollup_proof_data)?;
            for (i, proof) in decoded.inner_proof_data.iter().enumerate() {
                let offchain = block.offchain_tx_data.get(i).map(Vec::as_slice).unwrap_or(&[]);
                let classified = proof_classifier::classify(proof, offchain)?;
                let note_start_index = decoded.data_start_index + (i as u64) * 2;
                let slot_start = slots.len();
                push_slots(&classified, &mut slots);
                plan.push(PlannedProof {
                    rollup_id: block.rollup_id,
                    note_start_index,
                    classified,
                    slot_start,
                });
            }
        }

        let decrypted = decrypt_and_verify(self.algorithms.as_ref(), &self.user.read().await.private_key, &slots).await;

        let mut last_rollup_id = synced_to_rollup;
        for block in &blocks {
            let created = block.created;
            for entry in plan.iter().filter(|p| p.rollup_id == block.rollup_id) {
                self.apply(entry, &decrypted, &block.interaction_result, created).await?;
            }
            last_rollup_id = i64::from(block.rollup_id);
        }

        {
            let mut user = self.user.write().await;
            user.synced_to_rollup = last_rollup_id;
            self.db.update_user(&user).await?;
        }

        self.refresh_note_pickers().await?;

        let after = self.snapshot_balances().await;
        let user_id = self.user.read().await.id;
        self.emitter.emit_diffs(user_id, &before, &after);

        Ok(())
    }

    async fn apply(
        self: &Arc<Self>,
        entry: &PlannedProof,
        decrypted: &[Option<crate::types::TreeNote>],
        interaction_results: &[crate::types::InteractionResult],
        created: crate::types::Timestamp,
    ) -> Result<()> {
        let user = self.user.read().await.clone();
        let slot = |offset: usize| decrypted.get(entry.slot_start + offset).cloned().flatten();

        match &entry.classified {
            ClassifiedProof::JoinSplit(proof) => {
                join_split::handle(
                    self.db.as_ref(),
                    self.algorithms.as_ref(),
                    &user,
                    proof,
                    entry.note_start_index,
                    [slot(0), slot(1)],
                    created,
                )
                .await?;
            }
            ClassifiedProof::Account(proof) => {
                account::handle(self.db.as_ref(), &user, proof, entry.note_start_index, created).await?;
            }
            ClassifiedProof::DefiDeposit(proof) => {
                defi_deposit::handle(
                    self.db.as_ref(),
                    self.algorithms.as_ref(),
                    &user,
                    proof,
                    entry.note_start_index,
                    slot(0),
                    interaction_results,
                    created,
                )
                .await?;
            }
            ClassifiedProof::DefiClaim(proof) => {
                defi_claim::handle(
                    self.db.as_ref(),
                    self.algorithms.as_ref(),
                    &user,
                    proof,
                    entry.note_start_index,
                    created,
                )
                .await?;
            }
            ClassifiedProof::Padding => {}
        }

        // `account::handle` may update the alias hash; reload so later
        // proofs in this same batch see it.
        if matches!(entry.classified, ClassifiedProof::Account(_)) {
            if let Some(reloaded) = self.db.get_user(&user.id).await? {
                *self.user.write().await = reloaded;
            }
        }

        Ok(())
    }

    /// Accepts a locally-constructed proof for pending submission, spec.md
    /// §4.G.
    #[instrument(skip(self, proof))]
    pub async fn add_proof(&self, proof: ProofOutput, created: crate::types::Timestamp) -> Result<()> {
        let user = self.user.read().await.clone();
        let AddProofOutcome { notes_added } =
            pending_ingestor::add_proof(self.db.as_ref(), self.algorithms.as_ref(), &user, proof, created).await?;
        if notes_added {
            self.refresh_note_pickers().await?;
        }
        Ok(())
    }

    async fn refresh_note_pickers(&self) -> Result<()> {
        let id = self.user.read().await.id;
        let notes = self.db.get_user_notes(&id).await?;
        let mut grouped: HashMap<u32, Vec<crate::types::Note>> = HashMap::new();
        for note in notes {
            grouped.entry(note.asset_id).or_default().push(note);
        }
        let mut pickers = HashMap::new();
        for (asset_id, notes) in grouped {
            pickers.insert(asset_id, NotePicker::new(notes));
        }
        *self.note_pickers.write().await = pickers;
        Ok(())
    }

    async fn snapshot_balances(&self) -> HashMap<u32, BigUint> {
        self.note_pickers
            .read()
            .await
            .iter()
            .map(|(asset_id, picker)| (*asset_id, picker.get_sum()))
            .collect()
    }

    /// Local balance for one asset, ignoring in-flight exclusions — the
    /// sum of all non-nullified confirmed notes (spec.md §8 invariant).
    pub async fn get_balance(&self, asset_id: u32) -> BigUint {
        self.note_pickers
            .read()
            .await
            .get(&asset_id)
            .map(|p| p.get_sum())
            .unwrap_or_else(BigUint::default)
    }

    /// Spendable notes for one asset, excluding the provider's current
    /// pending-nullifier set (spec.md §9 "Pending-note exclusion").
    pub async fn pick_notes(&self, asset_id: u32, target: &BigUint) -> Result<Option<(crate::types::Note, Option<crate::types::Note>)>> {
        let excluded = self.pending_nullifiers().await?;
        Ok(self
            .note_pickers
            .read()
            .await
            .get(&asset_id)
            .and_then(|p| p.pick(target, &excluded)))
    }

    async fn pending_nullifiers(&self) -> Result<NullifierSet> {
        Ok(self.provider.get_pending_note_nullifiers().await?.into_iter().collect())
    }
}

struct PlannedProof {
    rollup_id: u32,
    note_start_index: u64,
    classified: ClassifiedProof,
    slot_start: usize,
}

fn push_slots(classified: &ClassifiedProof, slots: &mut Vec<DecryptSlot>) {
    match classified {
        ClassifiedProof::JoinSplit(p) => {
            slots.push(DecryptSlot {
                commitment: p.note_commitment_1,
                viewing_key: p.viewing_key_1.clone(),
            });
            slots.push(DecryptSlot {
                commitment: p.note_commitment_2,
                viewing_key: p.viewing_key_2.clone(),
            });
        }
        ClassifiedProof::DefiDeposit(p) => {
            slots.push(DecryptSlot {
                commitment: p.note_commitment_2,
                viewing_key: p.viewing_key.clone(),
            });
        }
        ClassifiedProof::Account(_) | ClassifiedProof::DefiClaim(_) | ClassifiedProof::Padding => {}
    }
}
