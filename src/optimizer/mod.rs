//! # Optimizer Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `snapshot`: Enumerazione immutabile dei candidati (fase 1)
//! - `directory_optimizer`: Trasformazione concorrente e aggregazione (fase 2)
//! - `batch`: Esecuzione su tutte le categorie configurate

pub mod batch;
pub mod directory_optimizer;
pub mod snapshot;

pub use batch::{BatchReport, BatchRunner, StatsReport};
pub use directory_optimizer::{DirectoryOptimizer, DirectoryReport};
pub use snapshot::DirectorySnapshot;
