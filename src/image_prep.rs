//! Captured-photo preparation: validate what the shell hands over, then
//! downscale and re-encode before it goes to the classification call.

use thiserror::Error;

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 4096;
pub const MAX_IMAGE_ALLOC: u64 = 100 * 1024 * 1024;
/// Upload side: the classifier gains nothing above this edge length.
pub const MAX_UPLOAD_DIMENSION: u32 = 1536;
pub const UPLOAD_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImagePrepError {
    #[error("image size {size} bytes exceeds maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("image dimensions {width}x{height} exceed maximum of {max}x{max}")]
    DimensionsTooLarge { width: u32, height: u32, max: u32 },
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("failed to decode image: {0}")]
    DecodeFailed(String),
    #[error("failed to encode image: {0}")]
    EncodeFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Jpeg,
    Png,
    WebP,
}

impl DetectedFormat {
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }
}

/// Sniff the container from magic bytes; declared MIME types from shells
/// are not trusted.
#[must_use]
pub fn detect_format(data: &[u8]) -> Option<DetectedFormat> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(DetectedFormat::Jpeg);
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(DetectedFormat::Png);
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some(DetectedFormat::WebP);
    }
    None
}

/// The payload that actually goes over the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for PreparedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedImage")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Validate a captured photo and re-encode it as a bounded JPEG.
///
/// Decoding runs with hard limits so a hostile or corrupt frame cannot
/// allocate unboundedly; anything over `MAX_UPLOAD_DIMENSION` is
/// downscaled first.
pub fn prepare_for_upload(data: &[u8]) -> Result<PreparedImage, ImagePrepError> {
    if data.len() > MAX_IMAGE_BYTES {
        return Err(ImagePrepError::TooLarge {
            size: data.len(),
            max: MAX_IMAGE_BYTES,
        });
    }

    let format = match detect_format(data) {
        Some(DetectedFormat::Jpeg) => image::ImageFormat::Jpeg,
        Some(DetectedFormat::Png) => image::ImageFormat::Png,
        Some(DetectedFormat::WebP) => image::ImageFormat::WebP,
        None => return Err(ImagePrepError::UnsupportedFormat),
    };

    let mut reader = image::ImageReader::with_format(std::io::Cursor::new(data), format);
    let mut limits = image::Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    limits.max_alloc = Some(MAX_IMAGE_ALLOC);
    reader.limits(limits);

    let img = reader
        .decode()
        .map_err(|e| ImagePrepError::DecodeFailed(e.to_string()))?;

    let (width, height) = (img.width(), img.height());
    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(ImagePrepError::DimensionsTooLarge {
            width,
            height,
            max: MAX_IMAGE_DIMENSION,
        });
    }

    tracing::debug!(width, height, ?format, "captured photo decoded");

    let img = if width > MAX_UPLOAD_DIMENSION || height > MAX_UPLOAD_DIMENSION {
        img.resize(
            MAX_UPLOAD_DIMENSION,
            MAX_UPLOAD_DIMENSION,
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        img
    };

    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
        std::io::Cursor::new(&mut out),
        UPLOAD_JPEG_QUALITY,
    );
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ImagePrepError::EncodeFailed(e.to_string()))?;

    Ok(PreparedImage {
        mime_type: "image/jpeg",
        data: out,
    })
}
