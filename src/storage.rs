//! Output directory management: one file per item, keyed by item id
//!
//! Bodies are written to a `.part` sibling first and renamed into place, so
//! a failed write never leaves a file that [`OutputStore::existing_ids`]
//! would mistake for a finished download.

use crate::error::{Error, FetchError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Suffix for in-progress writes
const PARTIAL_SUFFIX: &str = "part";

/// Directory of stored photos, `{dir}/{id}.{extension}`
#[derive(Clone, Debug)]
pub struct OutputStore {
    dir: PathBuf,
    extension: String,
}

impl OutputStore {
    /// Create a store rooted at `dir`; nothing touches the disk yet
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the output directory if needed
    ///
    /// Failure here is fatal for the run.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| Error::OutputDir {
                path: self.dir.clone(),
                source,
            })
    }

    /// Final path for `id`, rejecting ids that would escape the directory
    pub fn path_for(&self, id: &str) -> std::result::Result<PathBuf, FetchError> {
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\'])
            || id.contains('\0')
        {
            return Err(FetchError::Filesystem {
                message: format!("invalid storage key {id:?}"),
            });
        }
        Ok(self.dir.join(format!("{id}.{}", self.extension)))
    }

    /// Write `bytes` as the stored file for `id`
    ///
    /// The write and rename run as one spawned task, so dropping the returned
    /// future (e.g. on cancellation) lets the task finish or clean up rather
    /// than stranding a `.part` file.
    pub async fn write(
        &self,
        id: &str,
        bytes: impl Into<Vec<u8>>,
    ) -> std::result::Result<(), FetchError> {
        let final_path = self.path_for(id)?;
        let partial_path = self
            .dir
            .join(format!("{id}.{}.{PARTIAL_SUFFIX}", self.extension));
        let bytes = bytes.into();

        let task = tokio::spawn(async move {
            if let Err(e) = tokio::fs::write(&partial_path, bytes).await {
                remove_partial(&partial_path).await;
                return Err(FetchError::from(e));
            }
            if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
                remove_partial(&partial_path).await;
                return Err(FetchError::from(e));
            }
            Ok(())
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(FetchError::TaskAborted(e.to_string())),
        }
    }

    /// Ids that already have a stored file (file stems with our extension)
    ///
    /// A missing directory means nothing has been stored yet.
    pub async fn existing_ids(&self) -> Result<HashSet<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(source) => {
                return Err(Error::OutputDir {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut ids = HashSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.insert(stem.to_string());
            }
        }
        Ok(ids)
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial file");
    }
}
