//! In-process store with the same observable semantics as the SQLite one.
//! Nothing survives the process; meant for tests and dry runs.
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, SinkError},
    interaction::InteractionRecord,
    store::{
        ensure_storable_height, BatchOutcome, BatchPolicy, CheckpointStore, InteractionLedger,
        RecordFailure,
    },
};

#[derive(Default)]
struct State {
    checkpoint: Option<u64>,
    interactions: BTreeMap<String, InteractionRecord>,
    fail_checkpoint_writes: bool,
}

/// Shared in-memory checkpoint and ledger. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Empty, unseeded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following [`advance_height`](CheckpointStore::advance_height)
    /// fail with [`SinkError::CheckpointWriteFailure`].
    pub fn fail_checkpoint_writes(&self, fail: bool) -> Result<()> {
        self.lock()?.fail_checkpoint_writes = fail;
        Ok(())
    }

    /// Looks up a stored interaction by id.
    pub fn interaction(&self, interaction_id: &str) -> Result<Option<InteractionRecord>> {
        Ok(self.lock()?.interactions.get(interaction_id).cloned())
    }

    /// Number of stored interactions.
    pub fn interaction_count(&self) -> Result<u64> {
        Ok(self.lock()?.interactions.len() as u64)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| SinkError::SessionPoisoned)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn read_height(&self) -> Result<u64> {
        self.lock()?.checkpoint.ok_or(SinkError::NotInitialized)
    }

    async fn seed_height(&self, height: u64) -> Result<bool> {
        ensure_storable_height(height)?;
        let mut st = self.lock()?;
        if st.checkpoint.is_some() {
            return Ok(false);
        }
        st.checkpoint = Some(height);
        info!(height, "checkpoint seeded");
        Ok(true)
    }

    async fn advance_height(&self, height: u64) -> Result<()> {
        let mut st = self.lock()?;
        if st.checkpoint.is_none() {
            return Err(SinkError::NotInitialized);
        }
        if st.fail_checkpoint_writes {
            return Err(SinkError::CheckpointWriteFailure {
                height,
                reason: "injected failure".into(),
            });
        }
        ensure_storable_height(height)?;
        st.checkpoint = Some(height);
        info!(height, "checkpoint advanced");
        Ok(())
    }
}

#[async_trait]
impl InteractionLedger for MemoryStore {
    async fn upsert_batch(
        &self,
        records: Vec<InteractionRecord>,
        policy: BatchPolicy,
    ) -> Result<BatchOutcome> {
        let mut st = self.lock()?;
        let mut outcome = BatchOutcome::default();

        match policy {
            BatchPolicy::PerRecord => {
                for r in records {
                    debug!(interaction_id = %r.interaction_id, "interaction to upsert");
                    match r.validate() {
                        Ok(()) => {
                            outcome.committed.push(r.interaction_id.clone());
                            st.interactions.insert(r.interaction_id.clone(), r);
                        }
                        Err(reason) => {
                            warn!(interaction_id = %r.interaction_id, %reason, "rollback");
                            outcome.failed.push(RecordFailure {
                                interaction_id: r.interaction_id,
                                reason,
                            });
                        }
                    }
                }
            }
            BatchPolicy::WholeBatch => {
                // stage first so a late failure leaves the map untouched
                if let Some((r, reason)) = records
                    .iter()
                    .find_map(|r| r.validate().err().map(|e| (r, e)))
                {
                    warn!(interaction_id = %r.interaction_id, %reason, "rollback batch");
                    return Err(SinkError::RecordWriteFailure {
                        interaction_id: r.interaction_id.clone(),
                        reason,
                    });
                }
                for r in records {
                    outcome.committed.push(r.interaction_id.clone());
                    st.interactions.insert(r.interaction_id.clone(), r);
                }
            }
        }

        info!(
            committed = outcome.committed.len(),
            failed = outcome.failed.len(),
            ?policy,
            "interaction batch written"
        );
        Ok(outcome)
    }
}
