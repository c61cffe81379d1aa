//! Persistence interfaces and implementations used by the sink:
//! the checkpoint (last fully processed height) and the interaction ledger.
use async_trait::async_trait;

use crate::{
    error::{Result, SinkError},
    interaction::InteractionRecord,
};

/// Single-value progress marker.
///
/// The store is a trusted writer: ordering against ledger commits is the
/// caller's job (see [`Sink`](crate::Sink)).
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Current `last_checked_height`.
    ///
    /// # Errors
    /// [`SinkError::NotInitialized`] when no checkpoint was ever seeded.
    async fn read_height(&self) -> Result<u64>;

    /// Create the checkpoint at `height` if it does not exist yet.
    /// Returns `false` and leaves the stored height alone otherwise.
    async fn seed_height(&self, height: u64) -> Result<bool>;

    /// Overwrite the checkpoint with `height`. No monotonicity check.
    ///
    /// # Errors
    /// [`SinkError::NotInitialized`] on an unseeded store,
    /// [`SinkError::CheckpointWriteFailure`] if the write did not land.
    async fn advance_height(&self, height: u64) -> Result<()>;

    /// Like [`advance_height`](Self::advance_height) but refuses to move
    /// backwards.
    async fn advance_height_checked(&self, height: u64) -> Result<()> {
        let current = self.read_height().await?;
        if height < current {
            return Err(SinkError::CheckpointRegression {
                current,
                requested: height,
            });
        }
        self.advance_height(height).await
    }
}

/// Heights are stored in a signed 64-bit column; anything above `i64::MAX`
/// is a failed checkpoint write.
pub(crate) fn ensure_storable_height(height: u64) -> Result<()> {
    i64::try_from(height)
        .map(|_| ())
        .map_err(|e| SinkError::CheckpointWriteFailure {
            height,
            reason: e.to_string(),
        })
}

/// Transaction scope used by [`InteractionLedger::upsert_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// One transaction per record; a bad record fails alone and the rest of
    /// the batch is still written.
    #[default]
    PerRecord,
    /// One transaction for the batch; any failure rolls all of it back.
    WholeBatch,
}

/// A record that did not make it into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Id of the rejected record.
    pub interaction_id: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Per-record result of a batch upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Ids committed, in submission order.
    pub committed: Vec<String>,
    /// Records that failed, in submission order.
    pub failed: Vec<RecordFailure>,
}

impl BatchOutcome {
    /// `true` when every submitted record was committed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of committed records, or the first failure as
    /// [`SinkError::RecordWriteFailure`].
    pub fn into_result(self) -> Result<usize> {
        match self.failed.into_iter().next() {
            None => Ok(self.committed.len()),
            Some(f) => Err(SinkError::RecordWriteFailure {
                interaction_id: f.interaction_id,
                reason: f.reason,
            }),
        }
    }
}

/// Idempotent, upsert-only store of interaction records keyed by
/// `interaction_id`.
#[async_trait]
pub trait InteractionLedger: Send + Sync {
    /// Insert each record, or overwrite every mutable field of an existing
    /// record with the same id. All records are attempted.
    ///
    /// Under [`BatchPolicy::PerRecord`] record failures are collected in the
    /// returned [`BatchOutcome`]; under [`BatchPolicy::WholeBatch`] the first
    /// failure rolls back the batch and is returned as
    /// [`SinkError::RecordWriteFailure`].
    async fn upsert_batch(
        &self,
        records: Vec<InteractionRecord>,
        policy: BatchPolicy,
    ) -> Result<BatchOutcome>;
}

// submodules / concrete stores live here
pub mod memory_store;
pub use memory_store::MemoryStore;

#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;
