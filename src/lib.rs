#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! interaction-sink: a checkpointed, idempotent ingestion sink for blockchain
//! event syncers.
//!
//! ## What you implement
//! - [`InteractionSource`]: hand over decoded interactions above a height.
//!
//! ## What the crate provides
//! - [`InteractionLedger`]: batch **upsert** keyed by `interaction_id`, with an
//!   explicit [`BatchPolicy`] (per-record or whole-batch transactions).
//! - [`CheckpointStore`]: the single **last checked height**, seeded once and
//!   advanced after every committed batch.
//! - [`SqliteStore`] (embedded, durable) and [`MemoryStore`] (tests) implement
//!   both.
//! - [`Sink`]: one fetch-commit-advance cycle, always writing the ledger
//!   before moving the checkpoint.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use interaction_sink::prelude::*;
//! use async_trait::async_trait;
//!
//! struct MyReader;
//! #[async_trait]
//! impl InteractionSource for MyReader {
//!     async fn fetch_after(&self, _h: u64) -> anyhow::Result<Option<FetchedRange>> {
//!         Ok(None)
//!     }
//! }
//!
//! async fn run() -> anyhow::Result<()> {
//!     let store = SqliteStore::connect(&ConnectionParams::new("syncer.sqlite"))?;
//!     store.seed_height(0).await?;
//!     let sink = Sink::new(store.clone(), store);
//!     sink.sync_once(&MyReader).await?;
//!     Ok(())
//! }
//! ```
/// Connection parameters supplied by the host's config loader.
pub mod config;

/// Error taxonomy.
pub mod error;

/// Interaction records and confirmation status.
pub mod interaction;

/// Fetch-commit-advance composition.
pub mod sink;

/// Upstream reader abstraction.
pub mod source;

/// Persistence layer (traits, SQLite and in-memory implementations).
pub mod store;

// Public re-exports
pub use config::ConnectionParams;
pub use error::{Result, SinkError};
pub use interaction::{ConfirmationStatus, InteractionRecord};
pub use sink::{CommitReport, Sink};
pub use source::{FetchedRange, InteractionSource};
#[cfg(feature = "store-sqlite")]
pub use store::SqliteStore;
pub use store::{
    BatchOutcome, BatchPolicy, CheckpointStore, InteractionLedger, MemoryStore, RecordFailure,
};

/// Convenience prelude for end users.
pub mod prelude {
    #[cfg(feature = "store-sqlite")]
    pub use crate::SqliteStore;
    pub use crate::{
        BatchPolicy, CheckpointStore, ConfirmationStatus, ConnectionParams, FetchedRange,
        InteractionLedger, InteractionRecord, InteractionSource, MemoryStore, Sink, SinkError,
    };
}
