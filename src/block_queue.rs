//! Block Queue & Sync FSM, spec.md §4.F.
//!
//! The queue itself is the `tokio::sync::mpsc` unbounded channel below — a
//! lock-free FIFO drained by a single background task, matching spec.md
//! §5's "serialization is achieved by enqueueing work rather than mutual
//! exclusion". The drain loop lives in `UserState::drain` since it needs
//! access to the collaborators and handlers to apply a block; this module
//! owns only the channel plumbing and the stop/flush signaling between
//! `stop_sync` and that loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use crate::types::{Block, SyncState};

/// Producer handle held by `UserState`; `process_block` pushes into it.
#[derive(Clone)]
pub struct BlockQueue {
    sender: mpsc::UnboundedSender<Block>,
}

pub struct BlockQueueReceiver {
    pub(crate) receiver: mpsc::UnboundedReceiver<Block>,
}

impl BlockQueue {
    pub fn channel() -> (BlockQueue, BlockQueueReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (BlockQueue { sender }, BlockQueueReceiver { receiver })
    }

    /// Enqueues a block for serial processing. A silent no-op if the drain
    /// task has already exited, mirroring `processBlock`'s fire-and-forget
    /// framing in spec.md §4.F — there is no caller-visible failure mode
    /// for enqueueing after `stopSync`.
    pub fn push(&self, block: Block) {
        let _ = self.sender.send(block);
    }
}

/// Coordinates `stop_sync(flush)` with the drain task.
#[derive(Clone)]
pub struct StopSignal {
    notify: Arc<Notify>,
    discard: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            discard: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `flush=false` tells the drain task to discard anything still
    /// buffered; `flush=true` lets it finish draining first.
    pub fn signal(&self, flush: bool) {
        self.discard.store(!flush, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Resolves once `signal` is called; the bool is whether to discard.
    pub async fn wait(&self) -> bool {
        self.notify.notified().await;
        self.discard.load(Ordering::SeqCst)
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates the strict `OFF -> SYNCHING -> MONITORING -> OFF` transitions
/// of spec.md §3.
pub fn can_transition(from: SyncState, to: SyncState) -> bool {
    matches!(
        (from, to),
        (SyncState::Off, SyncState::Synching)
            | (SyncState::Synching, SyncState::Monitoring)
            | (SyncState::Monitoring, SyncState::Off)
            | (SyncState::Synching, SyncState::Off)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_documented_transitions_are_legal() {
        assert!(can_transition(SyncState::Off, SyncState::Synching));
        assert!(can_transition(SyncState::Synching, SyncState::Monitoring));
        assert!(can_transition(SyncState::Monitoring, SyncState::Off));
        assert!(!can_transition(SyncState::Off, SyncState::Monitoring));
        assert!(!can_transition(SyncState::Monitoring, SyncState::Synching));
    }

    #[tokio::test]
    async fn pushed_blocks_are_received_in_order() {
        let (queue, mut receiver) = BlockQueue::channel();
        for id in 0..3u32 {
            queue.push(Block {
                rollup_id: id,
                rollup_proof_data: vec![],
                offchain_tx_data: vec![],
                interaction_result: vec![],
                created: crate::types::Timestamp(0),
            });
        }
        for expected in 0..3u32 {
            let block = receiver.receiver.recv().await.unwrap();
            assert_eq!(block.rollup_id, expected);
        }
    }
}
