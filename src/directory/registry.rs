/// Hot-reload directory registry using ArcSwap
///
/// Holds the current `OrgDirectory` snapshot behind an atomic pointer.
/// A reload builds a complete new snapshot and swaps it in; readers that
/// already loaded the old pointer keep a consistent view until they drop it.

use crate::directory::{snapshot::OrgDirectory, types::OrgDocument};
use anyhow::Result;
use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub struct DirectoryRegistry {
    current: ArcSwap<OrgDirectory>,
    /// File the snapshot was loaded from, if any (used by `reload`)
    source: Option<PathBuf>,
}

impl DirectoryRegistry {
    /// Wrap an already-built snapshot (no reload source)
    pub fn new(directory: OrgDirectory) -> Self {
        Self {
            current: ArcSwap::new(Arc::new(directory)),
            source: None,
        }
    }

    /// Load the organization document at `path` and build the first snapshot
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let directory = load_directory(&path)?;
        tracing::info!(
            "📇 Loaded organization directory from {} ({} contacts)",
            path.display(),
            directory.len()
        );
        Ok(Self {
            current: ArcSwap::new(Arc::new(directory)),
            source: Some(path),
        })
    }

    /// Current snapshot (lock-free)
    pub fn snapshot(&self) -> Arc<OrgDirectory> {
        self.current.load_full()
    }

    /// Replace the snapshot atomically
    pub fn replace(&self, directory: OrgDirectory) {
        tracing::info!("🔄 Swapping organization directory ({} contacts)", directory.len());
        self.current.store(Arc::new(directory));
    }

    /// Re-read the source file and swap in the new snapshot
    ///
    /// On any load or validation error the previous snapshot stays active.
    pub fn reload(&self) -> Result<usize> {
        let path = self
            .source
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Directory was not loaded from a file"))?;
        let directory = load_directory(path)?;
        let count = directory.len();
        self.replace(directory);
        Ok(count)
    }
}

fn load_directory(path: &Path) -> Result<OrgDirectory> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read organization file '{}': {}", path.display(), e))?;
    let document: OrgDocument = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Invalid organization file '{}': {}", path.display(), e))?;
    OrgDirectory::from_document(document)
}
