//! Batch fetch engine: turns a work list into outcomes under a concurrency cap
//!
//! Two dispatch modes share the same guarantees:
//! - [`DispatchMode::Unthrottled`] streams every item through one pool of
//!   `concurrency_limit` slots and reports progress every `progress_interval`
//!   completions (and once at the end).
//! - [`DispatchMode::Paced`] splits the list into chunks of
//!   `concurrency_limit`, runs each chunk to completion, pauses for
//!   `inter_batch_delay` between chunks (never after the last) and reports
//!   progress once per chunk.
//!
//! Either way, at most `concurrency_limit` fetches are in flight, each item
//! yields exactly one [`Outcome`], and one item's failure (or panic) never
//! affects its siblings. Outcomes are returned in completion order.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::BatchConfig;
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::retry::fetch_with_retry;
use crate::types::{DispatchMode, Event, Outcome, WorkItem};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Runs batches of fetches (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct BatchEngine {
    /// Single-attempt fetcher shared by every task
    fetcher: Arc<dyn Fetcher>,
    /// Configuration, read-only for the engine's lifetime
    config: Arc<BatchConfig>,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
    /// Cancels every in-flight and pending item when triggered
    cancel_token: CancellationToken,
}

impl BatchEngine {
    /// Create an engine around `fetcher`
    pub fn new(fetcher: Arc<dyn Fetcher>, config: BatchConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            fetcher,
            config: Arc::new(config),
            event_tx,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Subscribe to progress and rate-limit events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that aborts the current batch when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Engine configuration
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process every item and return one outcome per item, in completion order
    pub async fn run_batch(&self, items: Vec<WorkItem>) -> Vec<Outcome> {
        let total = items.len();
        let limit = self.config.concurrency_limit.max(1);
        let mode = self.config.mode;

        tracing::info!(total, concurrency = limit, mode = %mode, "Starting batch");
        self.emit(Event::BatchStarted {
            total,
            concurrency: limit,
            mode,
        });

        let outcomes = match mode {
            DispatchMode::Unthrottled => self.run_unthrottled(items, limit).await,
            DispatchMode::Paced => self.run_paced(items, limit).await,
        };

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let failed = outcomes.len() - succeeded;
        tracing::info!(succeeded, failed, "Batch finished");
        self.emit(Event::BatchFinished { succeeded, failed });

        outcomes
    }

    /// One pool of `limit` slots fed from the whole list
    async fn run_unthrottled(&self, items: Vec<WorkItem>, limit: usize) -> Vec<Outcome> {
        let total = items.len();
        let interval = self.config.progress_interval.max(1);
        let mut outcomes = Vec::with_capacity(total);

        let mut completions = stream::iter(items)
            .map(|item| self.run_item(item))
            .buffer_unordered(limit);

        while let Some(outcome) = completions.next().await {
            outcomes.push(outcome);
            let processed = outcomes.len();
            if processed % interval == 0 || processed == total {
                self.report_progress(processed, total);
            }
        }

        outcomes
    }

    /// Consecutive chunks of `limit`, each run to completion before the next
    async fn run_paced(&self, items: Vec<WorkItem>, limit: usize) -> Vec<Outcome> {
        let total = items.len();
        let chunks: Vec<Vec<WorkItem>> = items.chunks(limit).map(<[_]>::to_vec).collect();
        let chunk_count = chunks.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, chunk) in chunks.into_iter().enumerate() {
            let size = chunk.len();
            tracing::debug!(chunk = index, size, "Dispatching chunk");
            self.emit(Event::ChunkStarted { index, size });

            let chunk_outcomes: Vec<Outcome> = stream::iter(chunk)
                .map(|item| self.run_item(item))
                .buffer_unordered(size)
                .collect()
                .await;
            outcomes.extend(chunk_outcomes);
            self.report_progress(outcomes.len(), total);

            let is_last = index + 1 == chunk_count;
            if !is_last {
                self.pause_between_chunks().await;
            }
        }

        outcomes
    }

    /// Sleep `inter_batch_delay`, cut short by cancellation
    async fn pause_between_chunks(&self) {
        let Some(delay) = self.config.inter_batch_delay else {
            return;
        };
        if delay.is_zero() || self.cancel_token.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = self.cancel_token.cancelled() => {
                tracing::debug!("Inter-batch delay interrupted by cancellation");
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    /// Future running one item in its own task
    ///
    /// The item runs under `tokio::spawn` so a panic inside the fetcher is
    /// caught here and reported as that item's failure.
    fn run_item(&self, item: WorkItem) -> impl Future<Output = Outcome> + Send + 'static {
        let fetcher = Arc::clone(&self.fetcher);
        let config = Arc::clone(&self.config);
        let cancel = self.cancel_token.clone();
        let event_tx = self.event_tx.clone();

        async move {
            let task_item = item.clone();
            let handle = tokio::spawn(async move {
                fetch_with_retry(
                    fetcher.as_ref(),
                    &task_item,
                    &config.retry,
                    &cancel,
                    Some(&event_tx),
                )
                .await
            });

            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(id = %item.id, error = %e, "Fetch task aborted");
                    Outcome::failure(&item, FetchError::TaskAborted(e.to_string()), 1)
                }
            }
        }
    }

    fn report_progress(&self, processed: usize, total: usize) {
        tracing::info!(processed, total, "Progress: {}/{} photos processed", processed, total);
        self.emit(Event::Progress { processed, total });
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
