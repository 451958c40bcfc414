//! Shared fixtures for photo-dl integration tests
//!
//! A [`Harness`] bundles a wiremock media API, a temp output directory and
//! the config needed to point an [`HttpFetcher`] at both.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use photo_dl::config::{ApiConfig, BatchConfig, RetryConfig};
use photo_dl::{ApiKey, BatchEngine, DispatchMode, HttpFetcher, OutputStore, WorkItem};
use tempfile::TempDir;
use walkdir::WalkDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Credential the mock server expects
pub const TEST_KEY: &str = "test-key-123";

/// Mock media API plus a scratch output directory
pub struct Harness {
    pub server: MockServer,
    pub dir: TempDir,
    pub store: OutputStore,
}

impl Harness {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().expect("create temp dir");
        let store = OutputStore::new(dir.path().join("images"), "jpg");
        store.ensure_dir().await.expect("create output dir");
        Self { server, dir, store }
    }

    /// API settings aimed at the mock server
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: format!("{}/v1", self.server.uri()),
            request_timeout: Duration::from_secs(5),
            ..ApiConfig::default()
        }
    }

    pub fn fetcher(&self) -> HttpFetcher {
        self.fetcher_with(self.api_config())
    }

    pub fn fetcher_with(&self, api: ApiConfig) -> HttpFetcher {
        HttpFetcher::new(&api, ApiKey::new(TEST_KEY), self.store.clone()).expect("build fetcher")
    }

    pub fn engine(&self, config: BatchConfig) -> BatchEngine {
        BatchEngine::new(Arc::new(self.fetcher()), config)
    }

    /// Stored file for `id`
    pub fn output_path(&self, id: &str) -> PathBuf {
        self.store.dir().join(format!("{id}.jpg"))
    }

    /// Leftover `.part` files anywhere under the temp dir
    pub fn partial_files(&self) -> Vec<PathBuf> {
        WalkDir::new(self.dir.path())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "part"))
            .map(|e| e.into_path())
            .collect()
    }

    /// Serve `body` for `item`, checking width and credential
    pub async fn serve_photo(&self, item: &WorkItem, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(media_path(item)))
            .and(query_param("maxWidthPx", "800"))
            .and(query_param("key", TEST_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    /// Answer `item` with `status` for the next `times` requests
    pub async fn serve_status(&self, item: &WorkItem, status: u16, times: u64) {
        Mock::given(method("GET"))
            .and(path(media_path(item)))
            .respond_with(ResponseTemplate::new(status))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }
}

/// Path the mock expects for `item`
pub fn media_path(item: &WorkItem) -> String {
    format!("/v1/{}/media", item.resource_ref)
}

pub fn work_item(i: usize) -> WorkItem {
    WorkItem::new(
        format!("clinic-{i}"),
        format!("places/P{i}/photos/R{i}"),
        format!("Clinic {i}"),
    )
}

/// Distinct body per item so byte totals are checkable
pub fn photo_bytes(i: usize) -> Vec<u8> {
    vec![0xFF; 1000 + i * 37]
}

/// Batch settings with short waits for tests
pub fn batch_config(mode: DispatchMode, limit: usize) -> BatchConfig {
    BatchConfig {
        concurrency_limit: limit,
        mode,
        inter_batch_delay: None,
        progress_interval: 50,
        retry: RetryConfig {
            backoff_base: Duration::from_millis(50),
            ..RetryConfig::default()
        },
    }
}
