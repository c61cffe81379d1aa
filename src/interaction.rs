//! Interaction records as handed over by the upstream chain reader.
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Whether an interaction's chain data is trusted/complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    /// Seen on chain, not yet confirmed by peers.
    #[default]
    #[serde(alias = "pending")]
    NotProcessed,
    /// Confirmed by enough peers.
    Confirmed,
    /// Peers disagree with the recorded data.
    Corrupted,
    /// The containing block fell off the canonical chain.
    #[serde(alias = "forked")]
    Orphaned,
}

impl ConfirmationStatus {
    /// Lowercase name stored in the `confirmation_status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotProcessed => "not_processed",
            Self::Confirmed => "confirmed",
            Self::Corrupted => "corrupted",
            Self::Orphaned => "orphaned",
        }
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored status string is not one we know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown confirmation status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for ConfirmationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_processed" | "pending" => Ok(Self::NotProcessed),
            "confirmed" => Ok(Self::Confirmed),
            "corrupted" => Ok(Self::Corrupted),
            "orphaned" | "forked" => Ok(Self::Orphaned),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// One observed contract interaction, keyed by `interaction_id`.
///
/// `interaction` and `input` are opaque serialized payloads; the ledger only
/// requires `interaction` to be a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    /// Globally unique id; the conflict key.
    pub interaction_id: String,
    /// Full interaction as a JSON document.
    pub interaction: String,
    /// Height of the containing block.
    pub block_height: u64,
    /// Hash/id of the containing block.
    pub block_id: String,
    /// Contract the interaction targets.
    pub contract_id: String,
    /// Invoked entry point.
    pub function: String,
    /// Serialized call input.
    pub input: String,
    /// Trust state of the chain data.
    #[serde(default)]
    pub confirmation_status: ConfirmationStatus,
    /// Write-set tags, in order. May be empty.
    #[serde(default)]
    pub interact_write: Vec<String>,
}

impl InteractionRecord {
    /// Checks the constraints the storage schema enforces on every row:
    /// a non-empty id, a height that fits a signed 64-bit column, and a
    /// well-formed JSON `interaction`.
    pub fn validate(&self) -> Result<(), String> {
        if self.interaction_id.is_empty() {
            return Err("empty interaction id".into());
        }
        if i64::try_from(self.block_height).is_err() {
            return Err(format!("block height {} out of range", self.block_height));
        }
        serde_json::from_str::<serde::de::IgnoredAny>(&self.interaction)
            .map_err(|e| format!("interaction is not valid JSON: {e}"))?;
        Ok(())
    }

    /// `interact_write` encoded as a JSON array, the column representation.
    pub(crate) fn interact_write_json(&self) -> String {
        serde_json::Value::from(self.interact_write.clone()).to_string()
    }
}
