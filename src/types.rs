//! Core types for photo-dl

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::FetchError;

/// One record needing its photo fetched and stored locally
///
/// Retries reuse the same item; it is never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkItem {
    /// Unique identifier, also the storage key (`{id}.jpg`)
    pub id: String,
    /// Opaque reference to the remote photo (e.g. `places/ABC/photos/XYZ`)
    pub resource_ref: String,
    /// Human-readable name, used in reports and logs
    pub display_name: String,
}

impl WorkItem {
    /// Create a new WorkItem
    pub fn new(
        id: impl Into<String>,
        resource_ref: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            resource_ref: resource_ref.into(),
            display_name: display_name.into(),
        }
    }
}

/// A record as listed by a [`WorkItemSource`](crate::source::WorkItemSource)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceItem {
    /// Record identifier
    pub id: String,
    /// First photo reference (empty when the record has no photo)
    pub resource_ref: String,
    /// Human-readable name
    pub display_name: String,
    /// Whether the record references at least one photo
    pub has_photo: bool,
}

impl From<SourceItem> for WorkItem {
    fn from(item: SourceItem) -> Self {
        Self {
            id: item.id,
            resource_ref: item.resource_ref,
            display_name: item.display_name,
        }
    }
}

/// Terminal status of one item
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The body was fetched and written
    Success {
        /// Exact length of the response body
        bytes: u64,
    },
    /// Every attempt failed, or a non-retryable error stopped the item
    Failure {
        /// The final error
        error: FetchError,
    },
}

/// Result of processing one [`WorkItem`] after all attempts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// Item identifier
    pub id: String,
    /// Item display name
    pub display_name: String,
    /// Success or failure
    pub status: OutcomeStatus,
    /// Attempts made (always at least 1)
    pub attempts: u32,
}

impl Outcome {
    /// Successful outcome for `item`
    pub fn success(item: &WorkItem, bytes: u64, attempts: u32) -> Self {
        Self {
            id: item.id.clone(),
            display_name: item.display_name.clone(),
            status: OutcomeStatus::Success { bytes },
            attempts,
        }
    }

    /// Failed outcome for `item`
    pub fn failure(item: &WorkItem, error: FetchError, attempts: u32) -> Self {
        Self {
            id: item.id.clone(),
            display_name: item.display_name.clone(),
            status: OutcomeStatus::Failure { error },
            attempts,
        }
    }

    /// Whether the item was stored
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    /// Bytes written (0 for failures)
    pub fn bytes_transferred(&self) -> u64 {
        match self.status {
            OutcomeStatus::Success { bytes } => bytes,
            OutcomeStatus::Failure { .. } => 0,
        }
    }

    /// Error text for failures
    pub fn error_detail(&self) -> Option<String> {
        match &self.status {
            OutcomeStatus::Success { .. } => None,
            OutcomeStatus::Failure { error } => Some(error.to_string()),
        }
    }
}

/// How the batch engine dispatches items
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// All items feed one pool capped at the concurrency limit
    #[default]
    Unthrottled,
    /// Items run in consecutive chunks, with a pause between chunks
    Paced,
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchMode::Unthrottled => write!(f, "unthrottled"),
            DispatchMode::Paced => write!(f, "paced"),
        }
    }
}

impl std::str::FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unthrottled" => Ok(DispatchMode::Unthrottled),
            "paced" => Ok(DispatchMode::Paced),
            other => Err(format!("invalid dispatch mode: {other}")),
        }
    }
}

/// Events emitted by the batch engine
///
/// Subscribe with [`BatchEngine::subscribe`](crate::engine::BatchEngine::subscribe).
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A batch run started
    BatchStarted {
        /// Number of items submitted
        total: usize,
        /// Concurrency cap in effect
        concurrency: usize,
        /// Dispatch mode in effect
        mode: DispatchMode,
    },

    /// Paced mode dispatched a chunk
    ChunkStarted {
        /// Zero-based chunk index
        index: usize,
        /// Items in this chunk
        size: usize,
    },

    /// Periodic progress signal
    Progress {
        /// Items finished so far
        processed: usize,
        /// Items submitted
        total: usize,
    },

    /// An item hit HTTP 429 and is backing off
    RateLimited {
        /// Item identifier
        id: String,
        /// Attempt that was rate limited
        attempt: u32,
        /// Configured attempt cap
        max_attempts: u32,
        /// Wait before the next attempt
        delay: Duration,
    },

    /// A batch run finished
    BatchFinished {
        /// Items stored
        succeeded: usize,
        /// Items failed
        failed: usize,
    },
}
