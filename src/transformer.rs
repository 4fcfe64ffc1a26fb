//! # Image Transformer Module
//!
//! Questo modulo converte un singolo file immagine su disco in un file ricodificato.
//!
//! ## Pipeline di trasformazione
//!
//! 1. **Lettura**: Legge l'intero file in memoria (`tokio::fs`)
//! 2. **Decode**: Decodifica con il crate `image` (formato rilevato dal contenuto)
//! 3. **Resize**: Se `max_width`/`max_height` sono presenti, riduce preservando
//!    l'aspect ratio, mai oltre le dimensioni sorgente
//! 4. **Encode**: Ricodifica in `options.format` alla qualità richiesta
//! 5. **Scrittura**: File fratello con stesso nome base e nuova estensione
//! 6. **Cancellazione**: Solo se la scrittura è riuscita e il path di output è diverso
//!
//! ## Encoder per formato
//!
//! | Formato | Encoder                      | Qualità         |
//! |---------|------------------------------|-----------------|
//! | JPEG    | `image::codecs::jpeg`        | 1-100           |
//! | PNG     | `image::codecs::png`         | ignorata (lossless) |
//! | WebP    | `webp` (libwebp, lossy)      | 1-100           |
//! | AVIF    | `image::codecs::avif` (ravif)| 1-100           |
//!
//! ## Error handling
//!
//! - `transform()` non fallisce mai: in caso di errore ritorna il path originale
//! - `try_transform()` espone il tipo di errore (`Decode`, `Encode`, `Io`) per chi deve contare i fallimenti
//! - Qualsiasi errore prima della scrittura completa lascia l'originale intatto
//!
//! ## Concorrenza
//!
//! Decode, resize ed encode sono CPU-bound e girano in `spawn_blocking`.
//! Un semaforo limita il numero di encode contemporanei a `workers`.

use crate::error::{OptimizeError, Result};
use crate::file_manager::FileManager;
use crate::options::{TargetFormat, TransformOptions};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// AVIF encoder speed (0 slowest/best, 10 fastest)
const AVIF_SPEED: u8 = 6;

/// Largest width or height libwebp accepts
const WEBP_MAX_DIMENSION: u32 = 16383;

/// Result of one transform call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    pub output_path: PathBuf,
    pub success: bool,
    pub original_size: u64,
    pub output_size: u64,
}

impl TransformOutcome {
    /// `original_size - output_size`, negative when encoding inflated the file
    pub fn saved_bytes(&self) -> i64 {
        self.original_size as i64 - self.output_size as i64
    }

    fn unchanged(path: &Path) -> Self {
        Self {
            output_path: path.to_path_buf(),
            success: false,
            original_size: 0,
            output_size: 0,
        }
    }
}

/// Re-encodes single image files in place
#[derive(Clone)]
pub struct Transformer {
    encode_permits: Arc<Semaphore>,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Transformer {
    /// Create a transformer allowing `workers` concurrent encodes
    pub fn new(workers: usize) -> Self {
        Self {
            encode_permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Transform `path` and return the resulting file path.
    ///
    /// Never fails: on any error the original `path` is returned unchanged.
    pub async fn transform(&self, path: &Path, options: &TransformOptions) -> PathBuf {
        self.run(path, options).await.output_path
    }

    /// Like [`Transformer::transform`] but keeps the sizes; `success` is false on error
    pub async fn run(&self, path: &Path, options: &TransformOptions) -> TransformOutcome {
        match self.try_transform(path, options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Transform of {} failed ({}): {}",
                    path.file_name().unwrap_or_default().to_string_lossy(),
                    e.kind(),
                    e
                );
                TransformOutcome::unchanged(path)
            }
        }
    }

    /// Transform `path`, reporting the error kind on failure.
    ///
    /// The input is deleted only after the output has been completely written
    /// and only when the output path differs from the input path.
    pub async fn try_transform(&self, path: &Path, options: &TransformOptions) -> Result<TransformOutcome> {
        self.try_transform_cancellable(path, options, &CancellationToken::new())
            .await
    }

    /// Like [`Transformer::try_transform`], giving up with `Cancelled` if `cancel`
    /// fires while the file is still waiting for an encode slot.
    ///
    /// Once encoding has started the file runs to completion.
    pub async fn try_transform_cancellable(
        &self,
        path: &Path,
        options: &TransformOptions,
        cancel: &CancellationToken,
    ) -> Result<TransformOutcome> {
        options.validate()?;
        if !FileManager::is_supported_image(path) {
            return Err(OptimizeError::UnsupportedFormat(path.to_path_buf()));
        }

        let output_path = FileManager::output_path(path, options.format)?;

        // Bounds the files held in memory and the concurrent encodes
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OptimizeError::Cancelled(path.to_path_buf())),
            permit = self.encode_permits.acquire() => permit.map_err(|e| OptimizeError::encode(path, e))?,
        };

        let bytes = fs::read(path).await.map_err(|e| OptimizeError::io(path, e))?;
        let original_size = bytes.len() as u64;

        let encoded = {
            let source = path.to_path_buf();
            let encode_options = options.clone();
            tokio::task::spawn_blocking(move || encode(&source, &bytes, &encode_options))
                .await
                .map_err(|e| OptimizeError::encode(path, e))??
        };

        FileManager::write_atomically(&output_path, path, &encoded).await?;
        let output_size = encoded.len() as u64;

        if output_path != path {
            if let Err(e) = fs::remove_file(path).await {
                warn!(
                    "Optimized {} but could not remove the original: {}",
                    path.display(),
                    e
                );
            }
        }

        debug!(
            "{} -> {} ({} -> {} bytes)",
            path.display(),
            output_path.display(),
            original_size,
            output_size
        );

        Ok(TransformOutcome {
            output_path,
            success: true,
            original_size,
            output_size,
        })
    }
}

/// Decode, resize and encode one image. Runs on a blocking thread.
fn encode(path: &Path, bytes: &[u8], options: &TransformOptions) -> Result<Vec<u8>> {
    let image = image::load_from_memory(bytes).map_err(|e| OptimizeError::decode(path, e))?;
    let image = fit_within(image, options.max_width, options.max_height);

    let mut buffer = Vec::new();
    match options.format {
        TargetFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buffer, options.quality);
            rgb.write_with_encoder(encoder)
                .map_err(|e| OptimizeError::encode(path, e))?;
        }
        TargetFormat::Png => {
            let encoder = PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, PngFilter::Adaptive);
            image
                .write_with_encoder(encoder)
                .map_err(|e| OptimizeError::encode(path, e))?;
        }
        TargetFormat::Webp => {
            let rgba = image.to_rgba8();
            if rgba.width() > WEBP_MAX_DIMENSION || rgba.height() > WEBP_MAX_DIMENSION {
                return Err(OptimizeError::encode(
                    path,
                    format!(
                        "{}x{} exceeds the WebP limit of {} pixels per side",
                        rgba.width(),
                        rgba.height(),
                        WEBP_MAX_DIMENSION
                    ),
                ));
            }
            let memory = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
                .encode_simple(false, options.quality as f32)
                .map_err(|e| OptimizeError::encode(path, format!("{:?}", e)))?;
            buffer.extend_from_slice(&memory);
        }
        TargetFormat::Avif => {
            let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
            let encoder = AvifEncoder::new_with_speed_quality(&mut buffer, AVIF_SPEED, options.quality);
            rgba.write_with_encoder(encoder)
                .map_err(|e| OptimizeError::encode(path, e))?;
        }
    }

    if buffer.is_empty() {
        return Err(OptimizeError::encode(path, "encoder produced no data"));
    }
    Ok(buffer)
}

/// Shrink `image` to fit the bounds, preserving aspect ratio and never upscaling
fn fit_within(image: DynamicImage, max_width: Option<u32>, max_height: Option<u32>) -> DynamicImage {
    if max_width.is_none() && max_height.is_none() {
        return image;
    }

    let (width, height) = (image.width(), image.height());
    let bound_width = max_width.unwrap_or(width).min(width);
    let bound_height = max_height.unwrap_or(height).min(height);

    if bound_width >= width && bound_height >= height {
        return image;
    }

    image.resize(bound_width.max(1), bound_height.max(1), FilterType::Lanczos3)
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{ImageFormat, Rgb, RgbImage};
    use std::path::Path;

    /// Deterministic noisy picture, hard enough to compress that lossy formats win
    pub fn noisy(width: u32, height: u32) -> RgbImage {
        let mut state: u32 = 0x1234_5678;
        RgbImage::from_fn(width, height, |x, y| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let noise = (state & 0x3f) as u8;
            Rgb([
                (x % 256) as u8 / 2 + noise,
                (y % 256) as u8 / 2 + noise,
                ((x + y) % 256) as u8 / 2 + noise,
            ])
        })
    }

    pub fn write_png(path: &Path, width: u32, height: u32) {
        noisy(width, height).save_with_format(path, ImageFormat::Png).unwrap();
    }

    pub fn write_jpeg(path: &Path, width: u32, height: u32) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = std::io::BufWriter::new(file);
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, 100);
        image::DynamicImage::ImageRgb8(noisy(width, height))
            .write_with_encoder(encoder)
            .unwrap();
    }
}
