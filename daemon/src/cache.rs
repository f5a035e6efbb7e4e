use anyhow::{Context, Result};
use std::path::Path;

use crate::orchestrator::CacheStore;

/// What [`FsCacheStore::clear`] found before it recreated the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The directory existed and was replaced with an empty one.
    Cleared,
    /// The directory did not exist; an empty one was created.
    Created,
}

/// Cache store backed by the local filesystem.
pub struct FsCacheStore;

impl CacheStore for FsCacheStore {
    /// Deletes `path` recursively and recreates it empty.
    ///
    /// A missing directory is logged as a warning and then created, so the
    /// post-condition is always an existing, empty directory. Permission and
    /// other I/O errors are returned.
    fn clear(&self, path: &Path) -> Result<ClearOutcome> {
        let outcome = if path.exists() {
            std::fs::remove_dir_all(path)
                .with_context(|| format!("Failed to remove cache directory {}", path.display()))?;
            ClearOutcome::Cleared
        } else {
            tracing::warn!("Cache directory {} does not exist", path.display());
            ClearOutcome::Created
        };
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to recreate cache directory {}", path.display()))?;
        Ok(outcome)
    }
}
