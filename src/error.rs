//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore della pipeline di ottimizzazione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per categorizzare gli errori per tipo
//! - Ogni variante porta il path del file coinvolto
//! - I chiamanti fanno `match` sulla variante, mai sul testo del messaggio
//!
//! ## Categorie di errori:
//! - `Decode`: I byte sorgente non sono un'immagine leggibile (corrotta, troncata, estensione sbagliata)
//! - `Encode`: L'encoder del formato di destinazione ha rifiutato l'immagine
//! - `Io`: Lettura, stat, scrittura o cancellazione fallita
//! - `UnsupportedFormat`: Estensione fuori dal set supportato (skip deliberato, non un guasto)
//! - `Validation`: Opzioni o configurazione non valide
//! - `Cancelled`: Il batch è stato interrotto prima di avviare il file
//!
//! ## Propagazione:
//! - `Decode`, `Encode` e `Io` a livello di file vengono assorbiti dal chiamante
//!   e diventano un contatore (`failed`) o un no-op durante l'upload
//! - Solo l'errore di listing della directory radice risale fino alla risposta HTTP

use std::path::{Path, PathBuf};

/// Error kinds produced by the media optimization pipeline
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("Cannot decode image {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Cannot encode image {}: {reason}", .path.display())]
    Encode { path: PathBuf, reason: String },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation cancelled before processing {}", .0.display())]
    Cancelled(PathBuf),
}

impl OptimizeError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn decode(path: &Path, source: image::ImageError) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn encode(path: &Path, reason: impl ToString) -> Self {
        Self::Encode {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Short label used in per-file log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::Io { .. } => "io",
            Self::UnsupportedFormat(_) => "unsupported",
            Self::Validation(_) => "validation",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

pub type Result<T, E = OptimizeError> = std::result::Result<T, E>;
