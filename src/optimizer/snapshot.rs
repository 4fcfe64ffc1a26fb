//! # Directory Snapshot Module
//!
//! Prima fase del batch: enumera tutti i file candidati in uno snapshot immutabile
//! prima di toccare qualsiasi file. La seconda fase trasforma partendo dallo snapshot,
//! quindi cancellazioni e riscritture non interferiscono con l'enumerazione.
//!
//! - Errore di listing della radice: propagato al chiamante
//! - Errore di listing di una sotto-directory: loggato, il sottoalbero risulta vuoto
//! - File con estensione non supportata: ignorati in silenzio
//! - Symlink: ignorati (nessun rischio di cicli)

use crate::error::{OptimizeError, Result};
use crate::file_manager::FileManager;
use futures::future::{join_all, BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Immutable list of candidate images of one directory and its scanned children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    pub path: PathBuf,
    pub files: Vec<PathBuf>,
    pub children: Vec<DirectorySnapshot>,
}

impl DirectorySnapshot {
    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }

    /// Enumerate `root` (and, if `recursive`, every sub-directory)
    pub fn scan(root: PathBuf, recursive: bool) -> BoxFuture<'static, Result<Self>> {
        async move {
            let (files, subdirs) = list_entries(&root).await?;

            let children = if recursive {
                join_all(subdirs.into_iter().map(Self::scan_child)).await
            } else {
                Vec::new()
            };

            Ok(Self {
                path: root,
                files,
                children,
            })
        }
        .boxed()
    }

    async fn scan_child(dir: PathBuf) -> Self {
        match Self::scan(dir.clone(), true).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                Self::empty(dir)
            }
        }
    }

    /// Number of candidate files in the whole snapshot
    pub fn file_count(&self) -> usize {
        self.files.len() + self.children.iter().map(Self::file_count).sum::<usize>()
    }
}

/// Immediate entries of `dir`, split into supported image files and sub-directories
async fn list_entries(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut reader = fs::read_dir(dir).await.map_err(|e| OptimizeError::io(dir, e))?;
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    while let Some(entry) = reader.next_entry().await.map_err(|e| OptimizeError::io(dir, e))? {
        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                continue;
            }
        };

        if file_type.is_dir() {
            subdirs.push(path);
        } else if file_type.is_file() {
            if FileManager::is_supported_image(&path) {
                files.push(path);
            } else {
                debug!("Skipping unsupported file: {}", path.display());
            }
        }
    }

    files.sort();
    subdirs.sort();
    Ok((files, subdirs))
}
