//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file e le utilità di formattazione.
//!
//! ## Responsabilità:
//! - Riconoscimento delle estensioni immagine supportate
//! - Calcolo del path di output (stesso nome base, estensione del nuovo formato)
//! - Scrittura sicura: file `.part` temporaneo poi rename atomico
//! - Formattazione human-readable delle dimensioni (base 1024)
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG, WebP, GIF
//!
//! ## Sicurezza operazioni:
//! - Il file di destinazione viene sostituito solo a scrittura completata
//! - In caso di errore il file `.part` viene rimosso e l'originale resta intatto
//!
//! ## Esempio:
//! ```rust,ignore
//! if FileManager::is_supported_image(&path) {
//!     let size = FileManager::file_size(&path).await?;
//!     info!("{} is {}", path.display(), format_bytes(size));
//! }
//! ```

use crate::error::{OptimizeError, Result};
use crate::options::TargetFormat;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Extensions the batch optimizer treats as images
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

const UNITS: &[&str] = &["Bytes", "KB", "MB", "GB", "TB"];

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Check if a file has one of the supported image extensions
    pub fn is_supported_image(path: &Path) -> bool {
        match path.extension() {
            Some(ext) => {
                let ext_lower = ext.to_string_lossy().to_lowercase();
                SUPPORTED_EXTENSIONS.contains(&ext_lower.as_str())
            }
            None => false,
        }
    }

    /// Size of a file in bytes
    pub async fn file_size(path: &Path) -> Result<u64> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| OptimizeError::io(path, e))?;
        Ok(metadata.len())
    }

    /// Sibling path with the original basename and the format's extension.
    ///
    /// An input whose extension already names the format keeps its exact path,
    /// so `photo.jpeg` re-encoded as JPEG stays `photo.jpeg`.
    pub fn output_path(input_path: &Path, format: TargetFormat) -> Result<PathBuf> {
        if let Some(ext) = input_path.extension().and_then(|e| e.to_str()) {
            if format.matches_extension(ext) {
                return Ok(input_path.to_path_buf());
            }
        }

        let file_stem = input_path
            .file_stem()
            .ok_or_else(|| OptimizeError::Validation(format!("Invalid file name: {}", input_path.display())))?
            .to_string_lossy();

        Ok(input_path.with_file_name(format!("{}.{}", file_stem, format.extension())))
    }

    /// Write `bytes` to `target` through a hidden `.part` sibling and a rename.
    ///
    /// `target` only changes once every byte is on disk.
    pub async fn write_atomically(target: &Path, source: &Path, bytes: &[u8]) -> Result<()> {
        let part_path = Self::part_path(target, source);

        if let Err(e) = fs::write(&part_path, bytes).await {
            let _ = fs::remove_file(&part_path).await;
            return Err(OptimizeError::io(target, e));
        }

        if let Err(e) = fs::rename(&part_path, target).await {
            let _ = fs::remove_file(&part_path).await;
            return Err(OptimizeError::io(target, e));
        }

        Ok(())
    }

    /// Temporary name next to `target`, unique per source file so two sources
    /// mapping to the same output never share a part file
    fn part_path(target: &Path, source: &Path) -> PathBuf {
        let source_name = source
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();
        target.with_file_name(format!(".{}.part", source_name))
    }

    /// Calculate percentage reduction (negative when the file grew)
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

/// Human-readable size in base-1024 units, two decimals, trailing zeros trimmed.
///
/// `0 -> "0 Bytes"`, `1536 -> "1.5 KB"`, `1048576 -> "1 MB"`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let rounded = format!("{:.2}", size);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit_index])
}

/// Same as [`format_bytes`] for saved-bytes totals, which can be negative
pub fn format_signed_bytes(bytes: i64) -> String {
    if bytes < 0 {
        format!("-{}", format_bytes(bytes.unsigned_abs()))
    } else {
        format_bytes(bytes as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1048576), "1 MB");
        assert_eq!(format_bytes(1_572_864_000), "1.46 GB");
        assert_eq!(format_bytes(2 * 1024u64.pow(4)), "2 TB");
    }

    #[test]
    fn test_format_signed_bytes() {
        assert_eq!(format_signed_bytes(-1536), "-1.5 KB");
        assert_eq!(format_signed_bytes(0), "0 Bytes");
        assert_eq!(format_signed_bytes(2048), "2 KB");
    }

    #[test]
    fn test_supported_extensions() {
        assert!(FileManager::is_supported_image(Path::new("a/b/photo.JPG")));
        assert!(FileManager::is_supported_image(Path::new("anim.gif")));
        assert!(!FileManager::is_supported_image(Path::new("notes.txt")));
        assert!(!FileManager::is_supported_image(Path::new("README")));
        assert!(!FileManager::is_supported_image(Path::new("logo.svg")));
    }

    #[test]
    fn test_output_path() {
        let webp = FileManager::output_path(Path::new("/up/events/a.jpg"), TargetFormat::Webp).unwrap();
        assert_eq!(webp, PathBuf::from("/up/events/a.webp"));

        let same = FileManager::output_path(Path::new("/up/events/a.webp"), TargetFormat::Webp).unwrap();
        assert_eq!(same, PathBuf::from("/up/events/a.webp"));

        let alias = FileManager::output_path(Path::new("/up/b.jpeg"), TargetFormat::Jpeg).unwrap();
        assert_eq!(alias, PathBuf::from("/up/b.jpeg"));

        let dotted = FileManager::output_path(Path::new("/up/site.v2.png"), TargetFormat::Avif).unwrap();
        assert_eq!(dotted, PathBuf::from("/up/site.v2.avif"));
    }

    #[test]
    fn test_calculate_reduction() {
        assert_eq!(FileManager::calculate_reduction(0, 10), 0.0);
        assert_eq!(FileManager::calculate_reduction(200, 100), 50.0);
        assert!(FileManager::calculate_reduction(100, 150) < 0.0);
    }

    #[tokio::test]
    async fn test_write_atomically_leaves_no_part_file() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.png");
        let target = temp_dir.path().join("a.webp");

        FileManager::write_atomically(&target, &source, b"encoded").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"encoded");
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_write_atomically_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.png");
        let target = temp_dir.path().join("missing").join("a.webp");

        let result = FileManager::write_atomically(&target, &source, b"encoded").await;
        assert!(matches!(result, Err(OptimizeError::Io { .. })));
    }
}
