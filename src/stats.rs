//! # Stats Collector Module
//!
//! Conta file e byte totali di un albero di directory, senza modificare nulla.
//! Usato dall'endpoint admin di ispezione e dai log dei batch run.

use crate::error::{OptimizeError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// File count and total size of a directory tree
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStats {
    pub file_count: usize,
    pub total_bytes: u64,
}

pub struct StatsCollector;

impl StatsCollector {
    /// Recursively count every regular file under `root` and sum their sizes
    pub async fn collect_stats(root: &Path) -> Result<DirectoryStats> {
        let metadata = tokio::fs::metadata(root)
            .await
            .map_err(|e| OptimizeError::io(root, e))?;
        if !metadata.is_dir() {
            return Err(OptimizeError::Validation(format!(
                "Not a directory: {}",
                root.display()
            )));
        }

        let root: PathBuf = root.to_path_buf();
        let walk_root = root.clone();
        tokio::task::spawn_blocking(move || Self::walk(&walk_root))
            .await
            .map_err(|e| OptimizeError::io(&root, std::io::Error::other(e)))
    }

    fn walk(root: &Path) -> DirectoryStats {
        let mut stats = DirectoryStats::default();

        for entry in WalkDir::new(root).into_iter().filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("Skipping unreadable entry: {}", err);
                None
            }
        }) {
            if !entry.file_type().is_file() {
                continue;
            }
            match entry.metadata() {
                Ok(metadata) => {
                    stats.file_count += 1;
                    stats.total_bytes += metadata.len();
                }
                Err(err) => debug!("Cannot stat {}: {}", entry.path().display(), err),
            }
        }

        stats
    }
}
