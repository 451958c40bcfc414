//! Work item source: which records exist, and which are already on disk
//!
//! The engine only needs two read-only queries, captured by
//! [`WorkItemSource`]. [`missing_items`] combines them into the work list.

use crate::error::{Error, Result};
use crate::storage::OutputStore;
use crate::types::{SourceItem, WorkItem};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Read-only view of the records to materialize
#[async_trait::async_trait]
pub trait WorkItemSource: Send + Sync {
    /// Every record, in dataset order
    async fn list_all_items(&self) -> Result<Vec<SourceItem>>;

    /// Identifiers whose photo is already stored
    async fn existing_ids(&self) -> Result<HashSet<String>>;
}

/// Records that have a photo and are not yet stored, in source order
pub fn missing_items(items: Vec<SourceItem>, existing: &HashSet<String>) -> Vec<WorkItem> {
    items
        .into_iter()
        .filter(|item| item.has_photo && !existing.contains(&item.id))
        .map(WorkItem::from)
        .collect()
}

/// On-disk dataset layout: `{ "clinics": [ { "slug", "name", "photos" } ] }`
#[derive(Debug, Deserialize)]
struct DatasetFile {
    #[serde(alias = "clinics")]
    records: Vec<DatasetRecord>,
}

#[derive(Debug, Deserialize)]
struct DatasetRecord {
    #[serde(alias = "slug", default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    photos: Option<Vec<String>>,
}

/// [`WorkItemSource`] backed by a JSON dataset and an [`OutputStore`]
#[derive(Clone, Debug)]
pub struct JsonDatasetSource {
    dataset: PathBuf,
    store: OutputStore,
}

impl JsonDatasetSource {
    /// Create a source reading `dataset` and checking `store` for existing files
    pub fn new(dataset: impl Into<PathBuf>, store: OutputStore) -> Self {
        Self {
            dataset: dataset.into(),
            store,
        }
    }

    /// Dataset path
    pub fn dataset(&self) -> &Path {
        &self.dataset
    }
}

#[async_trait::async_trait]
impl WorkItemSource for JsonDatasetSource {
    async fn list_all_items(&self) -> Result<Vec<SourceItem>> {
        let raw = tokio::fs::read(&self.dataset)
            .await
            .map_err(|e| Error::Dataset {
                path: self.dataset.clone(),
                reason: e.to_string(),
            })?;
        parse_dataset(&raw).map_err(|e| Error::Dataset {
            path: self.dataset.clone(),
            reason: e.to_string(),
        })
    }

    async fn existing_ids(&self) -> Result<HashSet<String>> {
        self.store.existing_ids().await
    }
}

/// Parse dataset JSON; records without an id are skipped
fn parse_dataset(raw: &[u8]) -> std::result::Result<Vec<SourceItem>, serde_json::Error> {
    let file: DatasetFile = serde_json::from_slice(raw)?;
    let total = file.records.len();

    let items: Vec<SourceItem> = file
        .records
        .into_iter()
        .filter_map(|record| {
            let id = record.id.filter(|id| !id.is_empty())?;
            let resource_ref = record
                .photos
                .unwrap_or_default()
                .into_iter()
                .next()
                .unwrap_or_default();
            Some(SourceItem {
                display_name: record.name.unwrap_or_else(|| id.clone()),
                has_photo: !resource_ref.is_empty(),
                resource_ref,
                id,
            })
        })
        .collect();

    if items.len() < total {
        tracing::debug!(
            skipped = total - items.len(),
            "Skipped dataset records without an id"
        );
    }
    Ok(items)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DATASET: &str = r#"{
        "clinics": [
            {"slug": "alpha", "name": "Alpha Dental", "photos": ["places/a/photos/1", "places/a/photos/2"]},
            {"slug": "beta", "name": "Beta Dental", "photos": []},
            {"slug": "gamma", "name": "Gamma Dental", "photos": ["places/g/photos/1"]},
            {"name": "No Slug", "photos": ["places/x/photos/1"]},
            {"slug": "delta", "photos": ["places/d/photos/1"]},
            {"slug": "epsilon", "name": "Epsilon", "photos": null}
        ]
    }"#;

    fn source_item(id: &str, has_photo: bool) -> SourceItem {
        SourceItem {
            id: id.to_string(),
            resource_ref: if has_photo {
                format!("places/{id}/photos/1")
            } else {
                String::new()
            },
            display_name: id.to_uppercase(),
            has_photo,
        }
    }

    #[test]
    fn parse_takes_first_photo_and_skips_missing_ids() {
        let items = parse_dataset(DATASET.as_bytes()).unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta", "gamma", "delta", "epsilon"]);

        assert_eq!(items[0].resource_ref, "places/a/photos/1");
        assert_eq!(items[0].display_name, "Alpha Dental");
        assert!(items[0].has_photo);
        assert!(!items[1].has_photo);
        // name falls back to the id
        assert_eq!(items[3].display_name, "delta");
        assert!(!items[4].has_photo);
    }

    #[test]
    fn parse_accepts_records_key_and_id_field() {
        let raw = r#"{"records": [{"id": "r1", "name": "R1", "photos": ["p"]}]}"#;
        let items = parse_dataset(raw.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "r1");
    }

    #[test]
    fn missing_items_excludes_existing_and_photoless() {
        let items = vec![
            source_item("a", true),
            source_item("b", false),
            source_item("c", true),
            source_item("d", true),
        ];
        let existing: HashSet<String> = ["c".to_string()].into_iter().collect();

        let missing = missing_items(items, &existing);
        let ids: Vec<&str> = missing.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(missing[0].resource_ref, "places/a/photos/1");
    }

    #[test]
    fn existing_id_excluded_regardless_of_photo_reference() {
        let mut item = source_item("stored", true);
        item.resource_ref = "places/other/photos/9".into();
        let existing: HashSet<String> = ["stored".to_string()].into_iter().collect();
        assert!(missing_items(vec![item], &existing).is_empty());
    }

    #[tokio::test]
    async fn json_source_reads_dataset_and_existing_files() {
        let dir = TempDir::new().unwrap();
        let dataset = dir.path().join("clinics.json");
        std::fs::write(&dataset, DATASET).unwrap();
        let out = dir.path().join("images");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(out.join("alpha.jpg"), b"x").unwrap();

        let source = JsonDatasetSource::new(&dataset, OutputStore::new(&out, "jpg"));
        let items = source.list_all_items().await.unwrap();
        let existing = source.existing_ids().await.unwrap();
        let missing = missing_items(items, &existing);

        let ids: Vec<&str> = missing.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["gamma", "delta"]);
    }

    #[tokio::test]
    async fn missing_dataset_is_dataset_error() {
        let dir = TempDir::new().unwrap();
        let source = JsonDatasetSource::new(
            dir.path().join("absent.json"),
            OutputStore::new(dir.path(), "jpg"),
        );
        assert!(matches!(
            source.list_all_items().await.unwrap_err(),
            Error::Dataset { .. }
        ));
    }

    #[tokio::test]
    async fn malformed_dataset_is_dataset_error() {
        let dir = TempDir::new().unwrap();
        let dataset = dir.path().join("bad.json");
        std::fs::write(&dataset, "{\"clinics\": [").unwrap();
        let source = JsonDatasetSource::new(&dataset, OutputStore::new(dir.path(), "jpg"));
        assert!(matches!(
            source.list_all_items().await.unwrap_err(),
            Error::Dataset { .. }
        ));
    }
}
