//! # Transform Options Module
//!
//! Questo modulo definisce i parametri immutabili passati ad ogni trasformazione.
//!
//! ## Responsabilità:
//! - `TargetFormat`: formato di destinazione (jpeg/png/webp/avif) ed estensione relativa
//! - `TransformOptions`: formato, qualità, resize opzionale e ricorsione (solo batch)
//! - Validazione dei parametri prima di avviare qualsiasi lavoro su disco
//!
//! ## Esempio:
//! ```rust,ignore
//! let options = TransformOptions {
//!     format: TargetFormat::Webp,
//!     quality: 80,
//!     max_width: Some(1920),
//!     ..Default::default()
//! };
//! options.validate()?;
//! ```

use crate::error::{OptimizeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output encoding of a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl TargetFormat {
    /// Extension written for files encoded in this format
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "jpg",
            TargetFormat::Png => "png",
            TargetFormat::Webp => "webp",
            TargetFormat::Avif => "avif",
        }
    }

    /// True when `ext` already names this format (case-insensitive, `jpeg` and `jpg` are aliases)
    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        match self {
            TargetFormat::Jpeg => matches!(ext.as_str(), "jpg" | "jpeg"),
            other => ext == other.extension(),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Png => "png",
            TargetFormat::Webp => "webp",
            TargetFormat::Avif => "avif",
        };
        f.write_str(name)
    }
}

impl FromStr for TargetFormat {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(TargetFormat::Jpeg),
            "png" => Ok(TargetFormat::Png),
            "webp" => Ok(TargetFormat::Webp),
            "avif" => Ok(TargetFormat::Avif),
            other => Err(OptimizeError::Validation(format!(
                "Unknown target format: {}",
                other
            ))),
        }
    }
}

/// Parameters of a single transform or of a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Output format
    pub format: TargetFormat,
    /// Encoder quality (1-100). PNG is lossless and ignores it
    pub quality: u8,
    /// Maximum output width, aspect ratio preserved, never upscaled
    pub max_width: Option<u32>,
    /// Maximum output height, aspect ratio preserved, never upscaled
    pub max_height: Option<u32>,
    /// Descend into sub-directories (batch runs only)
    pub recursive: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            format: TargetFormat::Webp,
            quality: 80,
            max_width: None,
            max_height: None,
            recursive: false,
        }
    }
}

impl TransformOptions {
    /// Fixed policy applied to freshly uploaded images
    pub fn upload_policy() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.quality == 0 || self.quality > 100 {
            return Err(OptimizeError::Validation(
                "Quality must be between 1 and 100".to_string(),
            ));
        }
        if self.max_width == Some(0) || self.max_height == Some(0) {
            return Err(OptimizeError::Validation(
                "Maximum dimensions must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_extension() {
        assert!(TargetFormat::Jpeg.matches_extension("JPEG"));
        assert!(TargetFormat::Jpeg.matches_extension("jpg"));
        assert!(TargetFormat::Webp.matches_extension("WebP"));
        assert!(!TargetFormat::Webp.matches_extension("png"));
        assert_eq!(TargetFormat::Jpeg.extension(), "jpg");
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("AVIF".parse::<TargetFormat>().unwrap(), TargetFormat::Avif);
        assert_eq!("jpg".parse::<TargetFormat>().unwrap(), TargetFormat::Jpeg);
        assert!("gif".parse::<TargetFormat>().is_err());
    }

    #[test]
    fn test_options_validation() {
        let mut options = TransformOptions::default();
        assert!(options.validate().is_ok());

        options.quality = 0;
        assert!(options.validate().is_err());

        options.quality = 101;
        assert!(options.validate().is_err());

        options.quality = 80;
        options.max_width = Some(0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_upload_policy() {
        let policy = TransformOptions::upload_policy();
        assert_eq!(policy.format, TargetFormat::Webp);
        assert_eq!(policy.quality, 80);
        assert_eq!(policy.max_width, None);
        assert_eq!(policy.max_height, None);
    }

    #[test]
    fn test_options_deserialize_partial() {
        let options: TransformOptions =
            serde_json::from_str(r#"{"format":"avif","quality":60}"#).unwrap();
        assert_eq!(options.format, TargetFormat::Avif);
        assert_eq!(options.quality, 60);
        assert!(!options.recursive);
    }
}
