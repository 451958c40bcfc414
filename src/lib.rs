//! # photo-dl
//!
//! Bulk downloader for the photos referenced by a record dataset.
//!
//! Records whose photo is already on disk are skipped; the rest are fetched
//! concurrently from the media API under a hard concurrency cap, retried with
//! exponential backoff when the API rate-limits, and written one file per
//! record. Every submitted record yields exactly one [`Outcome`], which a
//! [`Report`] then summarizes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use photo_dl::{
//!     ApiKey, BatchEngine, Config, HttpFetcher, JsonDatasetSource, OutputStore, Report,
//!     WorkItemSource, missing_items,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = OutputStore::new(&config.paths.output_dir, &config.paths.extension);
//!     let source = JsonDatasetSource::new(&config.paths.dataset, store.clone());
//!
//!     let items = source.list_all_items().await?;
//!     let existing = source.existing_ids().await?;
//!     let missing = missing_items(items, &existing);
//!
//!     store.ensure_dir().await?;
//!     let fetcher = HttpFetcher::new(&config.api, ApiKey::new("from-env"), store)?;
//!     let engine = BatchEngine::new(Arc::new(fetcher), config.batch.clone());
//!
//!     // Subscribe to events
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let outcomes = engine.run_batch(missing).await;
//!     print!("{}", Report::from_outcomes(&outcomes).render(10));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Batch fetch engine
pub mod engine;
/// Error types
pub mod error;
/// Single-attempt photo fetcher
pub mod fetcher;
/// Outcome aggregation and summary text
pub mod report;
/// Retry logic with exponential backoff
pub mod retry;
/// Dataset reading and missing-item selection
pub mod source;
/// Output directory and file writes
pub mod storage;
/// Core types (work items, outcomes, events)
pub mod types;

// Re-export commonly used types
pub use config::{ApiKey, BatchConfig, Config, RetryConfig, RetryPolicy};
pub use engine::BatchEngine;
pub use error::{Error, FetchError, Result};
pub use fetcher::{Fetcher, HttpFetcher};
pub use report::Report;
pub use retry::fetch_with_retry;
pub use source::{JsonDatasetSource, WorkItemSource, missing_items};
pub use storage::OutputStore;
pub use types::{DispatchMode, Event, Outcome, OutcomeStatus, SourceItem, WorkItem};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal
///
/// - **Unix:** SIGTERM or SIGINT, falling back to `ctrl_c()` if neither
///   handler can be registered.
/// - **Windows/other:** Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns without cancelling if `token` is cancelled by someone else first.
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = wait_for_signal() => {}
    }
    tracing::warn!("Cancelling batch; in-flight downloads will stop at their next wait");
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register every signal handler");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        // Never resolve, so a broken listener cannot cancel the batch
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C signal");
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_on_signal_returns_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let watcher = tokio::spawn(cancel_on_signal(token.clone()));

        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .expect("watcher should exit once the token is cancelled")
            .expect("watcher task should not panic");
    }
}
