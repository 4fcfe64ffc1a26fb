//! # Batch Runner Module
//!
//! Esegue l'ottimizzazione (o le statistiche) su tutte le categorie configurate
//! sotto la radice degli upload. Lo stesso runner serve l'endpoint HTTP e la
//! command line, quindi la lista delle categorie esiste in un solo punto (`Config`).
//!
//! ## Flusso:
//! 1. **Scan** di tutte le categorie (directory assenti marcate `skipped`)
//! 2. **Progress bar** opzionale con il totale già noto
//! 3. **Ottimizzazione** categoria per categoria, una riga di log ciascuna
//! 4. **Riepilogo** finale con byte risparmiati in formato leggibile

use crate::config::{Config, UploadCategory};
use crate::error::{OptimizeError, Result};
use crate::file_manager::{format_bytes, format_signed_bytes};
use crate::optimizer::directory_optimizer::{DirectoryOptimizer, DirectoryReport};
use crate::optimizer::snapshot::DirectorySnapshot;
use crate::progress::ProgressManager;
use crate::stats::StatsCollector;
use crate::transformer::Transformer;
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Totals of a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_processed: usize,
    pub total_failed: usize,
    pub total_saved_bytes: i64,
    pub total_saved_bytes_human: String,
    pub cancelled: bool,
}

/// Per-category line of a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryDetail {
    pub directory: String,
    /// Directory absent on disk; not a failure
    pub skipped: bool,
    pub processed: usize,
    pub failed: usize,
    pub saved_bytes: i64,
    pub saved_bytes_human: String,
    /// Directory size before and after the run, every file counted
    pub bytes_before: u64,
    pub bytes_after: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub success: bool,
    pub summary: BatchSummary,
    pub details: Vec<DirectoryDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    /// Configured directories present on disk
    pub total_directories: usize,
    pub total_files: usize,
    pub total_bytes: u64,
    pub total_size_human: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDetail {
    pub directory: String,
    pub exists: bool,
    pub file_count: usize,
    pub total_bytes: u64,
    pub total_size_human: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub success: bool,
    pub summary: StatsSummary,
    pub details: Vec<StatsDetail>,
}

/// Runs batch optimization and stats over the configured upload categories
pub struct BatchRunner {
    config: Arc<Config>,
    transformer: Transformer,
    cancel: CancellationToken,
    show_progress: bool,
}

impl BatchRunner {
    pub fn new(config: Arc<Config>, transformer: Transformer) -> Self {
        Self {
            config,
            transformer,
            cancel: CancellationToken::new(),
            show_progress: false,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Show an `indicatif` progress bar (command line only)
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Optimize every configured category.
    ///
    /// Fails only when an existing category directory cannot be listed.
    pub async fn run(&self) -> Result<BatchReport> {
        let options = &self.config.batch;
        options.validate()?;

        info!(
            "🎯 Optimizing {} upload directories under {} (format: {}, quality: {})",
            self.config.categories.len(),
            self.config.uploads_root.display(),
            options.format,
            options.quality
        );

        let spinner = self
            .show_progress
            .then(|| ProgressManager::scanning("Scanning upload directories..."));

        let mut planned: Vec<(&UploadCategory, Option<DirectorySnapshot>)> = Vec::new();
        for category in &self.config.categories {
            let path = self.config.category_path(category);
            if !category_exists(&path).await? {
                planned.push((category, None));
                continue;
            }
            let snapshot = DirectorySnapshot::scan(path, category.recursive).await?;
            planned.push((category, Some(snapshot)));
        }

        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        let total_files: usize = planned
            .iter()
            .filter_map(|(_, snapshot)| snapshot.as_ref())
            .map(DirectorySnapshot::file_count)
            .sum();
        info!("Found {} images to process", total_files);

        let progress = self
            .show_progress
            .then(|| ProgressManager::new(total_files as u64));
        let mut optimizer =
            DirectoryOptimizer::new(self.transformer.clone()).with_cancellation(self.cancel.clone());
        if let Some(progress) = &progress {
            optimizer = optimizer.with_progress(progress.clone());
        }

        let mut total = DirectoryReport::default();
        let mut details = Vec::with_capacity(planned.len());

        for (category, snapshot) in planned {
            let Some(snapshot) = snapshot else {
                info!("⏩ {}: directory not found, skipped", category.name);
                details.push(DirectoryDetail {
                    directory: category.name.clone(),
                    skipped: true,
                    processed: 0,
                    failed: 0,
                    saved_bytes: 0,
                    saved_bytes_human: format_bytes(0),
                    bytes_before: 0,
                    bytes_after: 0,
                });
                continue;
            };

            let before = StatsCollector::collect_stats(&snapshot.path).await?;

            if let Some(progress) = &progress {
                progress.set_category(&category.name);
            }
            let category_options = options.clone().with_recursive(category.recursive);
            let report = optimizer.optimize_snapshot(&snapshot, &category_options).await;
            let after = StatsCollector::collect_stats(&snapshot.path).await?;

            info!(
                "📁 {}: processed {}, failed {}, saved {} ({} -> {})",
                category.name,
                report.processed,
                report.failed,
                format_signed_bytes(report.saved_bytes),
                format_bytes(before.total_bytes),
                format_bytes(after.total_bytes)
            );

            details.push(DirectoryDetail {
                directory: category.name.clone(),
                skipped: false,
                processed: report.processed,
                failed: report.failed,
                saved_bytes: report.saved_bytes,
                saved_bytes_human: format_signed_bytes(report.saved_bytes),
                bytes_before: before.total_bytes,
                bytes_after: after.total_bytes,
            });
            total += report;
        }

        if let Some(progress) = &progress {
            progress.finish(&total.format_summary());
        }

        info!("=== Optimization Complete ===");
        info!("Files processed: {}", total.processed);
        info!("Errors: {}", total.failed);
        info!("Bytes saved: {}", format_signed_bytes(total.saved_bytes));
        if total.cancelled {
            info!("Run was cancelled before every file was dispatched");
        }

        Ok(BatchReport {
            success: true,
            summary: BatchSummary {
                total_processed: total.processed,
                total_failed: total.failed,
                total_saved_bytes: total.saved_bytes,
                total_saved_bytes_human: format_signed_bytes(total.saved_bytes),
                cancelled: total.cancelled,
            },
            details,
        })
    }

    /// File count and size of every configured category
    pub async fn collect_stats(&self) -> Result<StatsReport> {
        let mut details = Vec::with_capacity(self.config.categories.len());
        let mut total_directories = 0;
        let mut total_files = 0;
        let mut total_bytes = 0;

        for category in &self.config.categories {
            let path = self.config.category_path(category);
            let exists = category_exists(&path).await?;

            let stats = if exists {
                total_directories += 1;
                StatsCollector::collect_stats(&path).await?
            } else {
                Default::default()
            };

            total_files += stats.file_count;
            total_bytes += stats.total_bytes;
            details.push(StatsDetail {
                directory: category.name.clone(),
                exists,
                file_count: stats.file_count,
                total_bytes: stats.total_bytes,
                total_size_human: format_bytes(stats.total_bytes),
            });
        }

        info!(
            "📊 {} directories, {} files, {}",
            total_directories,
            total_files,
            format_bytes(total_bytes)
        );

        Ok(StatsReport {
            success: true,
            summary: StatsSummary {
                total_directories,
                total_files,
                total_bytes,
                total_size_human: format_bytes(total_bytes),
            },
            details,
        })
    }
}

/// True when the category directory is present.
///
/// Absence and a non-directory in its place both count as missing; any other
/// IO error is returned.
async fn category_exists(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(true),
        Ok(_) => {
            warn!("{} is not a directory, skipping it", path.display());
            Ok(false)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(OptimizeError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::test_images::write_png;
    use tempfile::TempDir;

    fn config_for(root: &std::path::Path) -> Arc<Config> {
        Arc::new(Config {
            uploads_root: root.to_path_buf(),
            categories: vec![
                UploadCategory::new("events", true),
                UploadCategory::new("news", false),
                UploadCategory::new("favicons", true),
            ],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_batch_run_reports_missing_directory_as_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("events/2024")).unwrap();
        std::fs::create_dir_all(root.join("news/archive")).unwrap();
        write_png(&root.join("events/a.png"), 32, 32);
        write_png(&root.join("events/2024/b.png"), 32, 32);
        write_png(&root.join("news/c.png"), 32, 32);
        write_png(&root.join("news/archive/d.png"), 32, 32);
        std::fs::write(root.join("news/corrupt.gif"), b"GIF89a garbage").unwrap();

        let runner = BatchRunner::new(config_for(root), Transformer::new(2));
        let report = runner.run().await.unwrap();

        assert!(report.success);
        assert_eq!(report.summary.total_processed, 3);
        assert_eq!(report.summary.total_failed, 1);
        assert_eq!(report.details.len(), 3);

        let news = &report.details[1];
        assert_eq!(news.directory, "news");
        assert_eq!((news.processed, news.failed), (1, 1));
        // non-recursive category leaves its sub-directories alone
        assert!(root.join("news/archive/d.png").exists());

        let favicons = &report.details[2];
        assert!(favicons.skipped);
        assert_eq!(favicons.processed, 0);
        assert_eq!(favicons.saved_bytes_human, "0 Bytes");
    }

    #[tokio::test]
    async fn test_batch_run_records_directory_sizes() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("events")).unwrap();
        write_png(&root.join("events/a.png"), 64, 64);
        std::fs::write(root.join("events/notes.txt"), vec![0u8; 100]).unwrap();
        let png_size = std::fs::metadata(root.join("events/a.png")).unwrap().len();

        let report = BatchRunner::new(config_for(root), Transformer::default())
            .run()
            .await
            .unwrap();

        let events = &report.details[0];
        let webp_size = std::fs::metadata(root.join("events/a.webp")).unwrap().len();
        assert_eq!(events.bytes_before, png_size + 100);
        assert_eq!(events.bytes_after, webp_size + 100);
        assert_eq!(events.saved_bytes, events.bytes_before as i64 - events.bytes_after as i64);
        assert_eq!(report.details[2].bytes_before, 0);
    }

    #[tokio::test]
    async fn test_category_path_that_is_a_file_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("events"), b"not a directory").unwrap();
        std::fs::create_dir_all(root.join("news")).unwrap();
        write_png(&root.join("news/c.png"), 16, 16);

        let runner = BatchRunner::new(config_for(root), Transformer::default());
        let report = runner.run().await.unwrap();

        assert!(report.details[0].skipped);
        assert_eq!(report.details[1].processed, 1);
        assert_eq!(std::fs::read(root.join("events")).unwrap(), b"not a directory");

        let stats = runner.collect_stats().await.unwrap();
        assert!(!stats.details[0].exists);
        assert_eq!(stats.summary.total_directories, 1);
    }

    #[tokio::test]
    async fn test_batch_report_json_shape() {
        let temp_dir = TempDir::new().unwrap();
        let runner = BatchRunner::new(config_for(temp_dir.path()), Transformer::default());
        let report = runner.run().await.unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["summary"]["totalProcessed"], 0);
        assert_eq!(json["summary"]["totalSavedBytesHuman"], "0 Bytes");
        assert_eq!(json["details"][0]["directory"], "events");
        assert_eq!(json["details"][0]["skipped"], true);
    }

    #[tokio::test]
    async fn test_collect_stats_over_categories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("events/sub")).unwrap();
        std::fs::create_dir_all(root.join("news")).unwrap();
        std::fs::write(root.join("events/a.jpg"), vec![0u8; 1024]).unwrap();
        std::fs::write(root.join("events/sub/b.txt"), vec![0u8; 512]).unwrap();

        let runner = BatchRunner::new(config_for(root), Transformer::default());
        let report = runner.collect_stats().await.unwrap();

        assert_eq!(report.summary.total_directories, 2);
        assert_eq!(report.summary.total_files, 2);
        assert_eq!(report.summary.total_size_human, "1.5 KB");
        assert!(report.details[0].exists);
        assert_eq!(report.details[0].file_count, 2);
        assert!(report.details[1].exists);
        assert_eq!(report.details[1].file_count, 0);
        assert!(!report.details[2].exists);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["totalDirectories"], 2);
        assert_eq!(json["details"][0]["totalSizeHuman"], "1.5 KB");
    }
}
