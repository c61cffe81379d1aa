//! Abstraction over the upstream chain reader that discovers interactions.
use async_trait::async_trait;

use crate::interaction::InteractionRecord;

/// Interactions found in a contiguous height range.
pub struct FetchedRange {
    /// Every interaction with `block_height` in `(from, through_height]`.
    pub records: Vec<InteractionRecord>,
    /// Highest height the reader fully scanned. The checkpoint moves here.
    pub through_height: u64,
}

/// Upstream provider of decoded interactions.
#[async_trait]
pub trait InteractionSource: Send + Sync {
    /// Fetch everything above `height` that the reader is ready to hand over,
    /// or `None` when there is nothing new yet.
    async fn fetch_after(&self, height: u64) -> anyhow::Result<Option<FetchedRange>>;
}
