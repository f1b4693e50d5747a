//! UserState Factory, spec.md §4.I.
//!
//! Injects the shared, read-only collaborators (database, rollup
//! provider, note algorithms) into per-user `UserState` instances. One
//! `UserState` exists per account (spec.md §1 Non-goals: no multi-user
//! coordination in one instance); the factory is the seam where those
//! singletons are handed out without each caller re-wiring them.

use std::sync::Arc;

use crate::collaborators::{Database, NoteAlgorithms, RollupProvider};
use crate::config::UserStateConfig;
use crate::types::UserData;
use crate::user_state::UserState;

/// Shared dependencies every `UserState` in this process is built from.
pub struct UserStateFactory<D, P, N> {
    db: Arc<D>,
    provider: Arc<P>,
    algorithms: Arc<N>,
    config: UserStateConfig,
}

impl<D, P, N> UserStateFactory<D, P, N>
where
    D: Database + 'static,
    P: RollupProvider + 'static,
    N: NoteAlgorithms + 'static,
{
    pub fn new(db: Arc<D>, provider: Arc<P>, algorithms: Arc<N>, config: UserStateConfig) -> Self {
        Self {
            db,
            provider,
            algorithms,
            config,
        }
    }

    /// Builds a `UserState` for `user` and runs `init` (pending
    /// reconciliation, initial NotePicker population) before handing it
    /// back, so callers never observe a half-initialized instance.
    pub async fn create(&self, user: UserData) -> crate::error::Result<Arc<UserState<D, P, N>>> {
        let state = Arc::new(UserState::new(
            user,
            Arc::clone(&self.db),
            Arc::clone(&self.provider),
            Arc::clone(&self.algorithms),
            self.config.clone(),
        ));
        state.init().await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDatabase, FakeNoteAlgorithms, FakeProvider};
    use crate::types::AccountId;

    #[tokio::test]
    async fn create_runs_init_before_returning() {
        let db = Arc::new(FakeDatabase::default());
        let provider = Arc::new(FakeProvider::default());
        let algorithms = Arc::new(FakeNoteAlgorithms::default());
        let factory = UserStateFactory::new(db, provider, algorithms, UserStateConfig::default());

        let user = UserData::new(AccountId::new([1u8; 32], 0), [1u8; 32], [2u8; 32]);
        let state = factory.create(user).await.unwrap();
        assert_eq!(state.synced_to_rollup().await, -1);
    }
}
