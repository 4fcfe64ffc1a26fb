//! # Heritage Media Optimizer Library
//!
//! Pipeline di ottimizzazione immagini per gli upload del CMS (periodi, eventi,
//! personaggi, siti, news).
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione condivisa da server e command line
//! - `error`: Tipi di errore per categoria (decode, encode, io, ...)
//! - `options`: Formato di destinazione e opzioni di trasformazione
//! - `file_manager`: Estensioni supportate, path di output, scrittura sicura, formattazione byte
//! - `transformer`: Ricodifica di un singolo file
//! - `optimizer`: Scan + ottimizzazione concorrente di alberi di directory, batch per categoria
//! - `stats`: Conteggio file e byte in sola lettura
//! - `upload`: Hook post-upload che ottimizza i file appena salvati
//! - `server`: Endpoint admin HTTP
//! - `progress`: Progress bar per la command line
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use heritage_media_optimizer::{DirectoryOptimizer, TransformOptions, Transformer};
//!
//! let options = TransformOptions { recursive: true, ..Default::default() };
//! let report = DirectoryOptimizer::new(Transformer::new(4))
//!     .optimize_directory(&path, &options)
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod optimizer;
pub mod options;
pub mod progress;
pub mod server;
pub mod stats;
pub mod transformer;
pub mod upload;

pub use config::{Config, UploadCategory};
pub use error::OptimizeError;
pub use file_manager::{format_bytes, format_signed_bytes, FileManager};
pub use optimizer::{BatchRunner, DirectoryOptimizer, DirectoryReport, DirectorySnapshot};
pub use options::{TargetFormat, TransformOptions};
pub use stats::{DirectoryStats, StatsCollector};
pub use transformer::{TransformOutcome, Transformer};
pub use upload::{SavedFile, UploadImageInfo, UploadInterceptor, UploadStore};
