//! # Progress Tracking Module
//!
//! Questo modulo gestisce il feedback visivo durante i batch run da command line.
//!
//! ## Responsabilità:
//! - Progress bar con `indicatif`, prefissata dalla categoria in lavorazione
//! - Spinner durante la fase di scansione (totale ancora ignoto)
//! - Totale corrente dei byte risparmiati, aggiornato ad ogni file
//!
//! Le richieste HTTP non usano la barra: il totale viene solo loggato.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ events [00:00:12] [=========>------------------------------] 37/150 ✅ a.jpg: 120.5 KB saved | 2.31 MB total
//! ```

use crate::file_manager::format_signed_bytes;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{spinner:.green} {prefix:.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Progress bar of a batch run over the upload categories
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
    saved_bytes: Arc<AtomicI64>,
}

impl ProgressManager {
    /// Bar sized to the number of files found by the scan
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            saved_bytes: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Label the bar with the category being optimized
    pub fn set_category(&self, name: &str) {
        self.bar.set_prefix(name.to_string());
    }

    /// Advance by one file and fold its savings into the running total
    pub fn record(&self, status: &str, saved_bytes: i64) {
        let total = self.saved_bytes.fetch_add(saved_bytes, Ordering::Relaxed) + saved_bytes;
        self.bar.inc(1);
        self.bar
            .set_message(format!("{} | {} total", status, format_signed_bytes(total)));
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Spinner shown while the categories are scanned
    pub fn scanning(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}
