//! Balance Emitter, spec.md §4.H.
//!
//! A `tokio::sync::broadcast` channel, per spec.md §9's "typed callback
//! list or a bounded channel... listeners must not block the block loop":
//! `send` never awaits and a lagging subscriber drops old events rather
//! than backpressuring the emitter.

use std::collections::HashMap;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use tokio::sync::broadcast;

use crate::types::{AccountId, UserStateEvent};

pub struct BalanceEmitter {
    sender: broadcast::Sender<UserStateEvent>,
}

impl BalanceEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserStateEvent> {
        self.sender.subscribe()
    }

    /// Diffs `before`/`after` per-asset balances and emits one event per
    /// changed asset, in ascending asset-id order for determinism, followed
    /// by one trailing no-payload event (spec.md §4.H).
    pub fn emit_diffs(
        &self,
        user_id: AccountId,
        before: &HashMap<u32, BigUint>,
        after: &HashMap<u32, BigUint>,
    ) {
        let mut asset_ids: Vec<u32> = before.keys().chain(after.keys()).copied().collect();
        asset_ids.sort_unstable();
        asset_ids.dedup();

        for asset_id in asset_ids {
            let b = before.get(&asset_id).cloned().unwrap_or_else(BigUint::zero);
            let a = after.get(&asset_id).cloned().unwrap_or_else(BigUint::zero);
            if a != b {
                let diff = BigInt::from(a.clone()) - BigInt::from(b);
                let _ = self.sender.send(UserStateEvent::UpdatedUserState {
                    user_id,
                    balance: Some(a),
                    diff: Some(diff),
                    asset_id: Some(asset_id),
                });
            }
        }

        let _ = self.sender.send(UserStateEvent::UpdatedUserState {
            user_id,
            balance: None,
            diff: None,
            asset_id: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;

    #[tokio::test]
    async fn emits_one_event_per_changed_asset_then_a_trailing_one() {
        let emitter = BalanceEmitter::new(16);
        let mut rx = emitter.subscribe();
        let user_id = AccountId::new([1u8; 32], 0);

        let mut before = HashMap::new();
        before.insert(0u32, BigUint::from(100u32));
        let mut after = HashMap::new();
        after.insert(0u32, BigUint::from(150u32));
        after.insert(1u32, BigUint::from(5u32));

        emitter.emit_diffs(user_id, &before, &after);

        let first = rx.recv().await.unwrap();
        match first {
            UserStateEvent::UpdatedUserState { asset_id: Some(0), balance, diff, .. } => {
                assert_eq!(balance, Some(BigUint::from(150u32)));
                assert_eq!(diff, Some(BigInt::from(50)));
            }
            other => panic!("unexpected first event: {other:?}"),
        }

        let second = rx.recv().await.unwrap();
        assert!(matches!(second, UserStateEvent::UpdatedUserState { asset_id: Some(1), .. }));

        let trailing = rx.recv().await.unwrap();
        assert!(matches!(
            trailing,
            UserStateEvent::UpdatedUserState { asset_id: None, balance: None, diff: None, .. }
        ));
    }
}
