//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della pipeline media.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` condivisa da server HTTP e command line
//! - Unica fonte della lista fissa di sotto-directory di upload (categorie)
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `uploads_root`: Radice degli upload (default: `public/uploads`)
//! - `categories`: Sotto-directory per categoria di contenuto, ognuna opzionalmente ricorsiva
//! - `batch`: Opzioni di trasformazione del batch (default: webp, qualità 80)
//! - `upload`: Opzioni applicate ai file appena caricati (default: webp, qualità 80)
//! - `workers`: Numero massimo di encode paralleli (default: 4)
//! - `bind_address`: Indirizzo del server admin (default: `127.0.0.1:3000`)
//! - `public_url_prefix`: Prefisso URL con cui vengono serviti gli upload (default: `/uploads`)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     uploads_root: PathBuf::from("/srv/site/uploads"),
//!     workers: 8,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::options::TransformOptions;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upload sub-directories, one per content category
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "events",
    "figures",
    "sites",
    "backgrounds",
    "news",
    "contributors",
    "images",
    "favicons",
];

/// One upload sub-directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCategory {
    pub name: String,
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

fn default_recursive() -> bool {
    true
}

impl UploadCategory {
    pub fn new(name: impl Into<String>, recursive: bool) -> Self {
        Self {
            name: name.into(),
            recursive,
        }
    }
}

/// Configuration for the media pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the uploads tree
    pub uploads_root: PathBuf,
    /// Sub-directories walked by batch runs and stats
    pub categories: Vec<UploadCategory>,
    /// Options of admin-triggered batch runs
    pub batch: TransformOptions,
    /// Options applied to freshly uploaded files
    pub upload: TransformOptions,
    /// Number of concurrent encodes
    pub workers: usize,
    /// Admin server listen address
    pub bind_address: String,
    /// URL prefix the uploads root is served under
    pub public_url_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uploads_root: PathBuf::from("public/uploads"),
            categories: DEFAULT_CATEGORIES
                .iter()
                .map(|name| UploadCategory::new(*name, true))
                .collect(),
            batch: TransformOptions::default(),
            upload: TransformOptions::upload_policy(),
            workers: 4,
            bind_address: "127.0.0.1:3000".to_string(),
            public_url_prefix: "/uploads".to_string(),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.batch.validate()?;
        self.upload.validate()?;

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        if self.categories.is_empty() {
            return Err(anyhow::anyhow!("At least one upload category must be configured"));
        }

        for category in &self.categories {
            let plain = Path::new(&category.name)
                .file_name()
                .map(|name| name == category.name.as_str())
                .unwrap_or(false);
            if !plain {
                return Err(anyhow::anyhow!(
                    "Upload category must be a plain directory name: {:?}",
                    category.name
                ));
            }
        }

        Ok(())
    }

    /// Look up a configured category by name
    pub fn category(&self, name: &str) -> Option<&UploadCategory> {
        self.categories.iter().find(|category| category.name == name)
    }

    /// Directory of a category under the uploads root
    pub fn category_path(&self, category: &UploadCategory) -> PathBuf {
        self.uploads_root.join(&category.name)
    }

    /// Public URL of a file stored under a category
    pub fn public_url(&self, category: &str, filename: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_url_prefix.trim_end_matches('/'),
            category,
            filename
        )
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
