//! Image compression applied before upload.
//!
//! Images already inside both bounds are passed through untouched. Everything
//! else is downscaled to the longest-edge bound and re-encoded as JPEG with
//! decreasing quality, then further downscaled, until the byte target is met.
//! The byte target is best effort: the smallest encoding is returned if the
//! floor is reached first.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};

use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{ImageFile, ImageKind};

const QUALITY_STEPS: [u8; 5] = [85, 75, 65, 50, 35];
const MIN_EDGE: u32 = 64;
const DOWNSCALE_FACTOR: f64 = 0.75;

/// Size bounds for uploaded images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
    pub max_bytes: usize,
    pub max_dimension: u32,
}

impl CompressionPolicy {
    /// Reads `COMPRESSION_MAX_BYTES` and `COMPRESSION_MAX_DIMENSION`
    pub fn from_env() -> ExplorerResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_bytes: core_config::env_parse_or("COMPRESSION_MAX_BYTES", defaults.max_bytes)?,
            max_dimension: core_config::env_parse_or(
                "COMPRESSION_MAX_DIMENSION",
                defaults.max_dimension,
            )?,
        })
    }

    fn accepts(&self, bytes: usize, width: u32, height: u32) -> bool {
        bytes <= self.max_bytes && width.max(height) <= self.max_dimension
    }
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024,
            max_dimension: 800,
        }
    }
}

/// Output of a compression pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    /// False when the original bytes were already within bounds
    pub reencoded: bool,
}

impl CompressedImage {
    pub fn content_type(&self) -> String {
        self.kind.to_string()
    }
}

/// Synchronous, CPU-bound image compressor
#[cfg_attr(test, mockall::automock)]
pub trait ImageCompressor: Send + Sync {
    fn compress(&self, file: &ImageFile) -> ExplorerResult<CompressedImage>;
}

/// `image`-crate compressor producing JPEG output
#[derive(Debug, Clone, Default)]
pub struct JpegCompressor {
    policy: CompressionPolicy,
}

impl JpegCompressor {
    pub fn new(policy: CompressionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CompressionPolicy {
        &self.policy
    }
}

struct Encoded {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageCompressor for JpegCompressor {
    fn compress(&self, file: &ImageFile) -> ExplorerResult<CompressedImage> {
        let kind = file
            .kind()
            .ok_or_else(|| ExplorerError::UnsupportedFileType {
                file_name: file.name.clone(),
                mime_type: file.mime_type.clone(),
            })?;

        let image = image::load_from_memory(&file.bytes)?;
        let (width, height) = image.dimensions();

        if self.policy.accepts(file.len(), width, height) {
            return Ok(CompressedImage {
                bytes: file.bytes.clone(),
                kind,
                width,
                height,
                reencoded: false,
            });
        }

        let mut current = fit_within(image, self.policy.max_dimension);
        let mut smallest: Option<Encoded> = None;

        loop {
            let rgb = current.to_rgb8();
            for quality in QUALITY_STEPS {
                let bytes = encode_jpeg(&rgb, quality)?;
                let encoded = Encoded {
                    width: rgb.width(),
                    height: rgb.height(),
                    bytes,
                };

                if encoded.bytes.len() <= self.policy.max_bytes {
                    return Ok(encoded.into_compressed());
                }
                if smallest
                    .as_ref()
                    .is_none_or(|s| encoded.bytes.len() < s.bytes.len())
                {
                    smallest = Some(encoded);
                }
            }

            let longest = current.width().max(current.height());
            if longest <= MIN_EDGE {
                break;
            }
            let next = ((longest as f64 * DOWNSCALE_FACTOR).round() as u32).max(MIN_EDGE);
            current = current.resize(next, next, FilterType::Triangle);
        }

        let best = smallest.ok_or_else(|| {
            ExplorerError::Internal("compression produced no candidate".to_string())
        })?;
        tracing::warn!(
            file = %file.name,
            bytes = best.bytes.len(),
            target = self.policy.max_bytes,
            "Image could not be compressed below the byte target"
        );
        Ok(best.into_compressed())
    }
}

impl Encoded {
    fn into_compressed(self) -> CompressedImage {
        CompressedImage {
            bytes: self.bytes,
            kind: ImageKind::Jpeg,
            width: self.width,
            height: self.height,
            reencoded: true,
        }
    }
}

/// Downscale so the longest edge is at most `max_dimension`, keeping aspect ratio
fn fit_within(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    if image.width().max(image.height()) > max_dimension {
        image.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        image
    }
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> ExplorerResult<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(rgb)?;
    Ok(bytes)
}
