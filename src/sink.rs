//! Composition of ledger and checkpoint for one fetch-commit-advance cycle.
//! The ledger batch always lands before the checkpoint moves, so a crash in
//! between only costs a re-fetch of the same range.
use anyhow::Context;
use tracing::{info, warn};

use crate::{
    error::Result,
    interaction::InteractionRecord,
    source::InteractionSource,
    store::{BatchPolicy, CheckpointStore, InteractionLedger},
};

/// What a successful commit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    /// Height the checkpoint now holds.
    pub through_height: u64,
    /// Records upserted in this cycle.
    pub written: usize,
}

/// Core sink. `C` = checkpoint store, `L` = interaction ledger.
pub struct Sink<C, L> {
    checkpoint: C,
    ledger: L,
    policy: BatchPolicy,
    monotonic: bool,
}

impl<C, L> Sink<C, L>
where
    C: CheckpointStore + 'static,
    L: InteractionLedger + 'static,
{
    /// Create a sink over a checkpoint store and a ledger. Per-record
    /// batches, unchecked checkpoint advances.
    pub fn new(checkpoint: C, ledger: L) -> Self {
        Self {
            checkpoint,
            ledger,
            policy: BatchPolicy::default(),
            monotonic: false,
        }
    }

    /// Transaction scope for ledger batches.
    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Refuse to move the checkpoint backwards.
    pub fn monotonic(mut self, yes: bool) -> Self {
        self.monotonic = yes;
        self
    }

    /// Height the next fetch should resume after.
    pub async fn resume_height(&self) -> Result<u64> {
        self.checkpoint.read_height().await
    }

    /// Upsert `records`, then move the checkpoint to `through_height`.
    ///
    /// # Errors
    /// If any record fails, returns its
    /// [`SinkError::RecordWriteFailure`](crate::SinkError::RecordWriteFailure)
    /// and leaves the checkpoint where it was; records that did commit stay
    /// committed and a retry of the same batch is safe.
    pub async fn commit(
        &self,
        records: Vec<InteractionRecord>,
        through_height: u64,
    ) -> Result<CommitReport> {
        let submitted = records.len();
        let outcome = self.ledger.upsert_batch(records, self.policy).await?;
        if !outcome.is_complete() {
            warn!(
                submitted,
                failed = outcome.failed.len(),
                through_height,
                "batch incomplete; checkpoint not advanced"
            );
        }
        let written = outcome.into_result()?;

        if self.monotonic {
            self.checkpoint.advance_height_checked(through_height).await?;
        } else {
            self.checkpoint.advance_height(through_height).await?;
        }

        Ok(CommitReport {
            through_height,
            written,
        })
    }

    /// Run one cycle: read the checkpoint, ask `source` for what lies above
    /// it, and commit that. `Ok(None)` when the source had nothing new.
    ///
    /// # Errors
    /// Returns an error if the checkpoint is unseeded or unreadable, the
    /// source fails, or [`commit`](Self::commit) fails.
    pub async fn sync_once<S>(&self, source: &S) -> anyhow::Result<Option<CommitReport>>
    where
        S: InteractionSource + ?Sized,
    {
        let from = self.resume_height().await.context("read checkpoint")?;

        let Some(range) = source
            .fetch_after(from)
            .await
            .with_context(|| format!("fetch_after({from})"))?
        else {
            return Ok(None);
        };

        let through = range.through_height;
        let report = self
            .commit(range.records, through)
            .await
            .with_context(|| format!("commit range {from}..={through}"))?;

        info!(
            from,
            through_height = report.through_height,
            written = report.written,
            "sync cycle committed"
        );
        Ok(Some(report))
    }
}
