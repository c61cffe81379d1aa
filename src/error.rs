//! Error taxonomy shared by every store and the [`Sink`](crate::Sink).
use thiserror::Error;

/// Errors surfaced by checkpoint and ledger operations.
///
/// Nothing in this crate retries; every variant reaches the caller, who decides
/// whether to rerun the whole fetch-commit-advance cycle.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The storage backend could not be opened or did not answer at bootstrap.
    #[error("cannot connect to storage at {target}: {reason}")]
    ConnectionFailure {
        /// Database location that was being opened.
        target: String,
        /// Backend message.
        reason: String,
    },

    /// The checkpoint row has not been seeded yet. Not the same as height 0.
    #[error("checkpoint not initialized; seed it before reading or advancing")]
    NotInitialized,

    /// A single record's upsert failed. Sibling records are unaffected under
    /// [`BatchPolicy::PerRecord`](crate::BatchPolicy::PerRecord).
    #[error("failed to write interaction {interaction_id}: {reason}")]
    RecordWriteFailure {
        /// Id of the rejected interaction.
        interaction_id: String,
        /// Backend or validation message.
        reason: String,
    },

    /// Advancing the checkpoint failed; the stored height is unchanged.
    #[error("failed to advance checkpoint to {height}: {reason}")]
    CheckpointWriteFailure {
        /// Height that was being written.
        height: u64,
        /// Backend message.
        reason: String,
    },

    /// A checked advance would have moved the checkpoint backwards.
    #[error("checkpoint regression: current {current}, requested {requested}")]
    CheckpointRegression {
        /// Height currently stored.
        current: u64,
        /// Height the caller asked for.
        requested: u64,
    },

    /// Backend error outside of a record or checkpoint write.
    #[error("storage: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Runtime(#[from] tokio::task::JoinError),

    /// A previous holder of the storage session panicked mid-operation.
    #[error("storage session poisoned")]
    SessionPoisoned,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SinkError>;
