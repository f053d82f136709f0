//! Image transformation capability
//!
//! The pipeline only sees the [`Transformer`] trait. [`ImageTransformer`] is
//! the `image`-crate implementation used in production; tests substitute
//! their own.

use std::io::Cursor;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("invalid target dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("target {requested} exceeds the {limit} limit")]
    DimensionsTooLarge {
        requested: Dimensions,
        limit: Dimensions,
    },
}

/// Target size of a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Hard ceiling on either side of a target, whatever the configuration says
    ///
    /// The output buffer is allocated up front, and an allocation failure
    /// aborts the process rather than unwinding.
    pub const MAX: Dimensions = Dimensions {
        width: 10_000,
        height: 10_000,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when neither side exceeds `limit`
    pub fn fits_within(self, limit: Dimensions) -> bool {
        self.width <= limit.width && self.height <= limit.height
    }

    /// Check that both sides are positive and within `limit` and [`Dimensions::MAX`]
    pub fn validate(self, limit: Dimensions) -> Result<Self, TransformError> {
        if self.width == 0 || self.height == 0 {
            return Err(TransformError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if !self.fits_within(limit) || !self.fits_within(Self::MAX) {
            return Err(TransformError::DimensionsTooLarge {
                requested: self,
                limit: Dimensions::new(
                    limit.width.min(Self::MAX.width),
                    limit.height.min(Self::MAX.height),
                ),
            });
        }
        Ok(self)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Formats accepted for upload; artifacts are re-encoded in the same format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadFormat {
    Png,
    Jpeg,
}

impl UploadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadFormat::Png => "png",
            UploadFormat::Jpeg => "jpeg",
        }
    }

    /// `name` with an extension that agrees with this format
    ///
    /// A PNG uploaded as `cat.jpg` is stored as `cat.png`, so the served
    /// content type matches the bytes. Names whose extension already fits
    /// (`cat.jpg` for JPEG) are kept as they are.
    pub fn conform_name(&self, name: &str) -> String {
        let path = Path::new(name);
        let fits = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
            == Some(self.image_format());
        if fits {
            return name.to_string();
        }

        let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or(name);
        format!("{stem}.{}", self.as_str())
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            UploadFormat::Png => ImageFormat::Png,
            UploadFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Detect an accepted upload format from the leading magic bytes
pub fn sniff_format(bytes: &[u8]) -> Option<UploadFormat> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Some(UploadFormat::Png),
        Ok(ImageFormat::Jpeg) => Some(UploadFormat::Jpeg),
        _ => None,
    }
}

/// Decode-and-resize capability
///
/// A failure here means the input itself is bad, not that the service is
/// unhealthy.
pub trait Transformer: Send + Sync {
    fn transform(&self, input: &[u8], target: Dimensions) -> Result<DynamicImage, TransformError>;
}

/// [`Transformer`] backed by the `image` crate
///
/// Targets larger than `limit` are refused before anything is decoded.
#[derive(Debug, Clone, Copy)]
pub struct ImageTransformer {
    filter: FilterType,
    limit: Dimensions,
}

impl Default for ImageTransformer {
    fn default() -> Self {
        Self::new(Dimensions::MAX)
    }
}

impl ImageTransformer {
    pub fn new(limit: Dimensions) -> Self {
        Self {
            filter: FilterType::Lanczos3,
            limit,
        }
    }
}

impl Transformer for ImageTransformer {
    fn transform(&self, input: &[u8], target: Dimensions) -> Result<DynamicImage, TransformError> {
        let target = target.validate(self.limit)?;
        let image =
            image::load_from_memory(input).map_err(|e| TransformError::Decode(e.to_string()))?;

        // Exact target size, aspect ratio is not preserved
        Ok(image.resize_exact(target.width, target.height, self.filter))
    }
}

/// Encode `image` into `format`
pub fn encode_image(image: &DynamicImage, format: UploadFormat) -> Result<Vec<u8>, TransformError> {
    let mut buffer = Cursor::new(Vec::new());

    let result = match format {
        UploadFormat::Png => image.write_to(&mut buffer, ImageFormat::Png),
        // JPEG carries no alpha channel
        UploadFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut buffer, ImageFormat::Jpeg),
    };

    result.map_err(|e| TransformError::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}
