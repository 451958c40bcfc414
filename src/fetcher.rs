//! Single fetch attempt: one HTTP GET, one file write on success

use crate::config::{ApiConfig, ApiKey};
use crate::error::{Error, FetchError, Result};
use crate::storage::OutputStore;
use crate::types::WorkItem;
use url::Url;

/// Abstraction over a single fetch attempt, enabling testability
///
/// Implementations perform exactly one network attempt and, on success,
/// exactly one write. Retrying is the caller's job.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `item` and persist it, returning the number of bytes written
    async fn fetch(&self, item: &WorkItem) -> std::result::Result<u64, FetchError>;
}

/// Production [`Fetcher`] for the photo media endpoint
///
/// Requests `GET {base_url}/{resource_ref}/media?maxWidthPx={N}&key={credential}`
/// and writes the body to `{output_dir}/{id}.{ext}`.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    max_width_px: u32,
    api_key: ApiKey,
    store: OutputStore,
}

impl HttpFetcher {
    /// Build a fetcher with a client carrying the configured per-request timeout
    pub fn new(api: &ApiConfig, api_key: ApiKey, store: OutputStore) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(api.request_timeout)
            .build()?;
        Self::with_client(client, api, api_key, store)
    }

    /// Build a fetcher around an existing client
    pub fn with_client(
        client: reqwest::Client,
        api: &ApiConfig,
        api_key: ApiKey,
        store: OutputStore,
    ) -> Result<Self> {
        Url::parse(&api.base_url).map_err(|e| {
            Error::config(format!("invalid base URL: {e}"), "api.base_url")
        })?;
        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            max_width_px: api.max_width_px,
            api_key,
            store,
        })
    }

    /// Request URL for `item`
    ///
    /// The resource reference is a path (`places/ID/photos/REF`), so it is
    /// joined verbatim; query values are percent-encoded.
    pub fn media_url(&self, item: &WorkItem) -> std::result::Result<Url, FetchError> {
        let reference = item.resource_ref.trim().trim_start_matches('/');
        if reference.is_empty() {
            return Err(FetchError::InvalidReference {
                reference: item.resource_ref.clone(),
                reason: "empty reference".to_string(),
            });
        }
        let raw = format!("{}/{}/media", self.base_url, reference);
        let mut url = Url::parse(&raw).map_err(|e| FetchError::InvalidReference {
            reference: item.resource_ref.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("maxWidthPx", &self.max_width_px.to_string())
            .append_pair("key", self.api_key.expose());
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, item: &WorkItem) -> std::result::Result<u64, FetchError> {
        let url = self.media_url(item)?;
        let started = std::time::Instant::now();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(id = %item.id, status = status.as_u16(), "Media request rejected");
            return Err(FetchError::HttpStatus {
                code: status.as_u16(),
            });
        }

        // Whole body in memory before touching disk: a transport failure
        // mid-body leaves nothing behind.
        let body = response
            .bytes()
            .await
            .map_err(FetchError::from_transport)?;
        let bytes = body.len() as u64;
        self.store.write(&item.id, body.to_vec()).await?;

        tracing::debug!(
            id = %item.id,
            bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Photo stored"
        );
        Ok(bytes)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn api(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            ..ApiConfig::default()
        }
    }

    #[test]
    fn media_url_matches_endpoint_shape() {
        let dir = TempDir::new().unwrap();
        let fetcher = HttpFetcher::new(
            &api("https://places.googleapis.com/v1/"),
            ApiKey::new("k&y"),
            OutputStore::new(dir.path(), "jpg"),
        )
        .unwrap();

        let item = WorkItem::new("alpha", "places/ChIJ123/photos/AbC", "Alpha");
        let url = fetcher.media_url(&item).unwrap();

        assert_eq!(url.path(), "/v1/places/ChIJ123/photos/AbC/media");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("maxWidthPx".to_string(), "800".to_string()),
                ("key".to_string(), "k&y".to_string()),
            ]
        );
    }

    #[test]
    fn blank_reference_is_invalid_reference() {
        let dir = TempDir::new().unwrap();
        let fetcher = HttpFetcher::new(
            &api("https://places.googleapis.com/v1"),
            ApiKey::new("k"),
            OutputStore::new(dir.path(), "jpg"),
        )
        .unwrap();

        for reference in ["", "  ", "/"] {
            let item = WorkItem::new("alpha", reference, "Alpha");
            let err = fetcher.media_url(&item).unwrap_err();
            assert!(
                matches!(err, FetchError::InvalidReference { .. }),
                "{reference:?} gave {err:?}"
            );
            assert!(!err.to_string().contains("transport"));
        }
    }

    #[tokio::test]
    async fn invalid_reference_fails_without_a_request() {
        let dir = TempDir::new().unwrap();
        // Nothing listens here; reaching the network would be a transport error
        let fetcher = HttpFetcher::new(
            &api("http://127.0.0.1:9/v1"),
            ApiKey::new("k"),
            OutputStore::new(dir.path(), "jpg"),
        )
        .unwrap();

        let err = fetcher
            .fetch(&WorkItem::new("alpha", "", "Alpha"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidReference { .. }));
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let dir = TempDir::new().unwrap();
        let result = HttpFetcher::new(
            &api("::not a url::"),
            ApiKey::new("k"),
            OutputStore::new(dir.path(), "jpg"),
        );
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
