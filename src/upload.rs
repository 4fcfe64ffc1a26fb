//! # Upload Interceptor Module
//!
//! Step eseguito subito dopo che un handler di upload ha salvato i file su disco.
//!
//! ## Responsabilità:
//! - Ricodifica ogni immagine appena salvata (webp, qualità 80, nessun resize)
//! - Aggiorna path, nome e dimensione del descrittore del file caricato
//! - Allega `UploadImageInfo` con il nuovo path e il path pre-trasformazione
//!
//! ## Nomi dei file salvati:
//! - `UploadStore` non sovrascrive mai: se il nome del client, o il file che la
//!   ricodifica produrrebbe, esiste già (su disco o nella stessa richiesta) viene
//!   aggiunto un suffisso numerico (`portrait-1.png`)
//! - Se la richiesta fallisce a metà, i file già salvati vengono rimossi
//!
//! ## Semantica errori:
//! - Un fallimento dell'ottimizzazione non fa mai fallire l'upload
//! - Il file resta quello originale, senza metadata allegati, e l'errore viene loggato
//! - I file non immagine passano senza modifiche
//!
//! Nota: dopo una trasformazione riuscita l'originale viene cancellato, quindi
//! `original_path_before_transform` punta a un file che non esiste più.

use crate::error::{OptimizeError, Result};
use crate::file_manager::FileManager;
use crate::options::{TargetFormat, TransformOptions};
use crate::transformer::Transformer;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Suffixes tried before an upload name is given up on
const MAX_NAME_ATTEMPTS: usize = 10_000;

/// Metadata attached to an upload whose image was re-encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadImageInfo {
    pub optimized_path: PathBuf,
    pub original_path_before_transform: PathBuf,
    pub filename: String,
}

/// Descriptor of a file an upload handler has just written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub image_info: Option<UploadImageInfo>,
}

impl SavedFile {
    pub fn new(path: PathBuf, filename: impl Into<String>, size: u64) -> Self {
        Self {
            path,
            filename: filename.into(),
            size,
            image_info: None,
        }
    }
}

/// Saves the files of one upload request without overwriting anything
pub struct UploadStore {
    directory: PathBuf,
    format: TargetFormat,
    reserved: HashSet<PathBuf>,
}

impl UploadStore {
    /// `options` are the ones the interceptor will apply, used to predict output names
    pub fn new(directory: impl Into<PathBuf>, options: &TransformOptions) -> Self {
        Self {
            directory: directory.into(),
            format: options.format,
            reserved: HashSet::new(),
        }
    }

    /// Write `bytes` under `filename`, or under `{stem}-{n}.{ext}` when the name
    /// or its re-encoded sibling is already taken
    pub async fn save(&mut self, filename: &str, bytes: &[u8]) -> Result<SavedFile> {
        let name = Path::new(filename);
        let stem = name
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        let extension = name.extension().map(|ext| ext.to_string_lossy().into_owned());

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate_name = numbered_name(&stem, extension.as_deref(), attempt);
            let candidate = self.directory.join(&candidate_name);
            if self.reserved.contains(&candidate) {
                continue;
            }

            let output = if FileManager::is_supported_image(&candidate) {
                Some(FileManager::output_path(&candidate, self.format)?)
            } else {
                None
            };
            if let Some(output) = output.as_ref().filter(|output| **output != candidate) {
                let taken = self.reserved.contains(output)
                    || fs::try_exists(output)
                        .await
                        .map_err(|e| OptimizeError::io(output, e))?;
                if taken {
                    continue;
                }
            }

            match write_new(&candidate, bytes).await {
                Ok(()) => {
                    debug!("Saved upload {} ({} bytes)", candidate.display(), bytes.len());
                    self.reserved.insert(candidate.clone());
                    self.reserved.extend(output);
                    return Ok(SavedFile::new(candidate, candidate_name, bytes.len() as u64));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(OptimizeError::io(&candidate, e)),
            }
        }

        Err(OptimizeError::Validation(format!(
            "No free name left for upload {}",
            filename
        )))
    }

    /// Remove files saved by a request that is being rejected
    pub async fn discard(&self, files: &[SavedFile]) {
        for file in files {
            if let Err(e) = fs::remove_file(&file.path).await {
                warn!("Could not remove rejected upload {}: {}", file.path.display(), e);
            }
        }
    }
}

fn numbered_name(stem: &str, extension: Option<&str>, attempt: usize) -> String {
    match (attempt, extension) {
        (0, Some(ext)) => format!("{}.{}", stem, ext),
        (0, None) => stem.to_string(),
        (n, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
        (n, None) => format!("{}-{}", stem, n),
    }
}

/// Create `path` exclusively and fill it; a partial file is removed on error
async fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(path).await;
    }
    written
}

/// Post-upload hook re-encoding freshly saved images
#[derive(Clone)]
pub struct UploadInterceptor {
    transformer: Transformer,
    options: TransformOptions,
}

impl UploadInterceptor {
    pub fn new(transformer: Transformer) -> Self {
        Self {
            transformer,
            options: TransformOptions::upload_policy(),
        }
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }

    /// Optimize every saved file in place; never fails
    pub async fn intercept(&self, files: &mut [SavedFile]) {
        join_all(files.iter_mut().map(|file| self.intercept_one(file))).await;
    }

    /// Optimize one saved file, mutating its descriptor on success
    pub async fn intercept_one(&self, file: &mut SavedFile) {
        if !FileManager::is_supported_image(&file.path) {
            debug!("Upload {} is not an image, leaving it as is", file.filename);
            return;
        }

        let outcome = match self.transformer.try_transform(&file.path, &self.options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Upload optimization failed for {} ({}): {}", file.filename, e.kind(), e);
                return;
            }
        };

        let original_path = std::mem::replace(&mut file.path, outcome.output_path.clone());
        file.filename = outcome
            .output_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.filename.clone());
        file.size = outcome.output_size;
        file.image_info = Some(UploadImageInfo {
            optimized_path: outcome.output_path,
            original_path_before_transform: original_path,
            filename: file.filename.clone(),
        });

        info!(
            "🖼️ Upload optimized: {} ({} -> {} bytes)",
            file.filename, outcome.original_size, outcome.output_size
        );
    }
}
