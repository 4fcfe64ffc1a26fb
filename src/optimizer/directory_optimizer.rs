//! # Directory Optimizer Module
//!
//! Ottimizza tutte le immagini supportate di una directory (opzionalmente ricorsiva)
//! e aggrega i risultati in un `DirectoryReport`.
//!
//! ## Flusso:
//! 1. **Scan**: `DirectorySnapshot::scan` enumera i candidati (nessuna scrittura)
//! 2. **Dispatch**: tutti i file di un livello partono insieme, insieme alle sotto-directory
//! 3. **Barriera**: il livello attende tutti i file e tutti i figli
//! 4. **Aggregazione**: somma elemento per elemento, deterministica
//!
//! ## Isolamento errori:
//! - Un file che fallisce incrementa `failed` e resta su disco intatto
//! - I file fratelli proseguono normalmente
//! - `processed` conta i tentativi riusciti, non i file effettivamente rimpiccioliti
//!
//! ## Cancellazione:
//! - `CancellationToken` cooperativo: dopo la cancellazione nessun nuovo file
//!   viene avviato, quelli già in encode terminano normalmente
//! - I file non avviati non contano né come `processed` né come `failed`

use crate::error::{OptimizeError, Result};
use crate::file_manager::format_signed_bytes;
use crate::optimizer::snapshot::DirectorySnapshot;
use crate::options::TransformOptions;
use crate::progress::ProgressManager;
use crate::transformer::Transformer;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Aggregated result of optimizing one directory (and its children when recursive)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryReport {
    pub processed: usize,
    pub failed: usize,
    /// Sum of `original - output` sizes; negative when encoding inflated files
    pub saved_bytes: i64,
    /// True when a cancellation stopped some files from being dispatched
    pub cancelled: bool,
}

impl DirectoryReport {
    fn processed(saved_bytes: i64) -> Self {
        Self {
            processed: 1,
            saved_bytes,
            ..Default::default()
        }
    }

    fn failed() -> Self {
        Self {
            failed: 1,
            ..Default::default()
        }
    }

    fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Default::default()
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Errors: {} | Total saved: {}{}",
            self.processed,
            self.failed,
            format_signed_bytes(self.saved_bytes),
            if self.cancelled { " | cancelled" } else { "" }
        )
    }
}

impl Add for DirectoryReport {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for DirectoryReport {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.failed += rhs.failed;
        self.saved_bytes += rhs.saved_bytes;
        self.cancelled |= rhs.cancelled;
    }
}

impl Sum for DirectoryReport {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Runs the transformer over directory trees
#[derive(Clone)]
pub struct DirectoryOptimizer {
    transformer: Transformer,
    cancel: CancellationToken,
    progress: Option<ProgressManager>,
}

impl DirectoryOptimizer {
    pub fn new(transformer: Transformer) -> Self {
        Self {
            transformer,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressManager) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Optimize every supported image under `root`.
    ///
    /// Only a failure to list `root` itself is returned as an error.
    pub async fn optimize_directory(&self, root: &Path, options: &TransformOptions) -> Result<DirectoryReport> {
        options.validate()?;
        let snapshot = DirectorySnapshot::scan(root.to_path_buf(), options.recursive).await?;
        debug!(
            "Scanned {}: {} candidate images",
            root.display(),
            snapshot.file_count()
        );
        Ok(self.optimize_snapshot(&snapshot, options).await)
    }

    /// Transform every file of a snapshot; files and child directories of one
    /// level run concurrently and are joined before aggregating
    pub fn optimize_snapshot<'a>(
        &'a self,
        snapshot: &'a DirectorySnapshot,
        options: &'a TransformOptions,
    ) -> BoxFuture<'a, DirectoryReport> {
        async move {
            let files = join_all(snapshot.files.iter().map(|file| self.optimize_file(file, options)));
            let children = join_all(
                snapshot
                    .children
                    .iter()
                    .map(|child| self.optimize_snapshot(child, options)),
            );

            let (file_reports, child_reports) = futures::join!(files, children);

            let level: DirectoryReport = file_reports.into_iter().sum();
            level + child_reports.into_iter().sum::<DirectoryReport>()
        }
        .boxed()
    }

    async fn optimize_file(&self, path: &Path, options: &TransformOptions) -> DirectoryReport {
        let name = path.file_name().unwrap_or_default().to_string_lossy();

        if self.cancel.is_cancelled() {
            return DirectoryReport::cancelled();
        }

        let result = self
            .transformer
            .try_transform_cancellable(path, options, &self.cancel)
            .await;

        // Sizes are the bytes the transform read and wrote
        let (report, message) = match result {
            Ok(outcome) => {
                let saved = outcome.saved_bytes();
                (
                    DirectoryReport::processed(saved),
                    format!("✅ {}: {} saved", name, format_signed_bytes(saved)),
                )
            }
            Err(OptimizeError::Cancelled(_)) => {
                (DirectoryReport::cancelled(), format!("⏩ {}: cancelled", name))
            }
            Err(e) => {
                warn!("Failed to optimize {} ({}): {}", name, e.kind(), e);
                (DirectoryReport::failed(), format!("❌ {}: error", name))
            }
        };

        if let Some(progress) = &self.progress {
            progress.record(&message, report.saved_bytes);
        }
        report
    }
}
