//! Shared types for the skymask segmentation pipeline.
//!
//! The pipeline keeps color inputs and binary masks in distinct wrapper
//! types so a mask can never be handed to a stage that expects a
//! 3-channel image (and vice versa):
//!
//! - [`SourceImage`]: validated RGB input as delivered by the caller.
//! - [`BgrImage`]: the same pixels with channels reordered to B, G, R.
//! - [`Mask`]: single channel, every pixel exactly 0 or 255.

use std::fmt;

use image::{DynamicImage, Luma, Rgb};
use serde::{Deserialize, Serialize};

use crate::canny::GradientNorm;

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can build inputs
/// without depending on `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ───────────────────────── Color rasters ─────────────────────────────

/// A validated 3-channel, 8-bit RGB image: the pipeline's input contract.
///
/// Construction rejects empty buffers, zero extents, and anything that is
/// not exactly three 8-bit channels, so every stage downstream can treat
/// its input as well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage(RgbImage);

impl SourceImage {
    /// Wrap an RGB image after checking it has a non-zero extent.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] if either dimension is zero.
    pub fn new(rgb: RgbImage) -> Result<Self, PipelineError> {
        ensure_extent(rgb.width(), rgb.height())?;
        Ok(Self(rgb))
    }

    /// Build a source image from an interleaved byte buffer.
    ///
    /// `channels` is the number of interleaved samples per pixel and must
    /// be 3; `data` must hold exactly `width * height * 3` bytes in R, G, B
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] if `data` is empty, either
    /// dimension is zero, or the byte count does not match the geometry.
    /// Returns [`PipelineError::UnsupportedFormat`] if `channels != 3`.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        if data.is_empty() {
            return Err(PipelineError::InvalidInput(
                "input image data is empty".to_string(),
            ));
        }
        ensure_extent(width, height)?;
        if channels != 3 {
            return Err(PipelineError::UnsupportedFormat {
                channels,
                bits_per_sample: 8,
            });
        }

        let expected = u64::from(width) * u64::from(height) * 3;
        if data.len() as u64 != expected {
            return Err(PipelineError::InvalidInput(format!(
                "expected {expected} bytes for a {width}x{height} RGB image, got {}",
                data.len(),
            )));
        }

        RgbImage::from_raw(width, height, data)
            .map(Self)
            .ok_or_else(|| {
                PipelineError::InvalidInput(format!(
                    "buffer does not fit a {width}x{height} RGB image"
                ))
            })
    }

    /// Image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// The underlying RGB pixels.
    #[must_use]
    pub const fn as_rgb(&self) -> &RgbImage {
        &self.0
    }

    /// Same pixels with channels reordered to B, G, R.
    #[must_use]
    pub fn to_bgr(&self) -> BgrImage {
        crate::grayscale::to_bgr(self)
    }
}

impl TryFrom<DynamicImage> for SourceImage {
    type Error = PipelineError;

    fn try_from(image: DynamicImage) -> Result<Self, Self::Error> {
        ensure_extent(image.width(), image.height())?;
        match image {
            DynamicImage::ImageRgb8(rgb) => Self::new(rgb),
            other => Err(unsupported(&other)),
        }
    }
}

impl TryFrom<&DynamicImage> for SourceImage {
    type Error = PipelineError;

    fn try_from(image: &DynamicImage) -> Result<Self, Self::Error> {
        ensure_extent(image.width(), image.height())?;
        match image {
            DynamicImage::ImageRgb8(rgb) => Self::new(rgb.clone()),
            other => Err(unsupported(other)),
        }
    }
}

fn ensure_extent(width: u32, height: u32) -> Result<(), PipelineError> {
    if width == 0 || height == 0 {
        return Err(PipelineError::InvalidInput(format!(
            "image has zero extent ({width}x{height})"
        )));
    }
    Ok(())
}

fn unsupported(image: &DynamicImage) -> PipelineError {
    let color = image.color();
    let channels = color.channel_count();
    PipelineError::UnsupportedFormat {
        channels,
        bits_per_sample: color.bits_per_pixel() / u16::from(channels.max(1)),
    }
}

/// A 3-channel image whose samples are ordered blue, green, red.
///
/// Only produced by [`grayscale::to_bgr`](crate::grayscale::to_bgr).
/// The pixels live in an `image` buffer, but slot 0 holds blue and slot 2
/// holds red.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgrImage(RgbImage);

impl BgrImage {
    /// Wrap a buffer whose slots are already in B, G, R order.
    pub(crate) const fn from_bgr_buffer(buffer: RgbImage) -> Self {
        Self(buffer)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// The `[b, g, r]` samples of one pixel.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[must_use]
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.0.get_pixel(x, y).0
    }

    /// Convert back to RGB order (for previews).
    #[must_use]
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width(), self.height(), |x, y| {
            let [b, g, r] = self.get_pixel(x, y);
            Rgb([r, g, b])
        })
    }
}

// ───────────────────────── Binary masks ──────────────────────────────

/// A single-channel raster whose pixels are exactly [`Mask::SET`] (255)
/// or [`Mask::CLEAR`] (0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(GrayImage);

impl Mask {
    /// Value of a foreground pixel.
    pub const SET: u8 = 255;
    /// Value of a background pixel.
    pub const CLEAR: u8 = 0;

    /// An all-clear mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// An all-set mask.
    #[must_use]
    pub fn filled(width: u32, height: u32) -> Self {
        Self(GrayImage::from_pixel(width, height, Luma([Self::SET])))
    }

    /// Build a mask from a predicate over pixel coordinates.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut is_set: impl FnMut(u32, u32) -> bool) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            Luma([if is_set(x, y) { Self::SET } else { Self::CLEAR }])
        }))
    }

    /// Wrap a gray image after checking every pixel is 0 or 255.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotBinary`] carrying the first offending
    /// value.
    pub fn try_from_gray(gray: GrayImage) -> Result<Self, PipelineError> {
        if let Some(&value) = gray
            .as_raw()
            .iter()
            .find(|&&v| v != Self::SET && v != Self::CLEAR)
        {
            return Err(PipelineError::NotBinary { value });
        }
        Ok(Self(gray))
    }

    /// Wrap a gray image produced by an operation that only emits 0/255.
    pub(crate) fn from_binary(gray: GrayImage) -> Self {
        debug_assert!(
            gray.as_raw()
                .iter()
                .all(|&v| v == Self::SET || v == Self::CLEAR),
            "binary operation produced a gray value",
        );
        Self(gray)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// Whether the pixel at `(x, y)` is set.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[must_use]
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] == Self::SET
    }

    /// Number of set pixels.
    #[must_use]
    pub fn count_set(&self) -> u64 {
        self.0
            .as_raw()
            .iter()
            .map(|&v| u64::from(v == Self::SET))
            .sum()
    }

    /// Bitwise complement: set pixels become clear and vice versa.
    #[must_use = "returns the inverted mask"]
    pub fn invert(&self) -> Self {
        let mut out = self.0.clone();
        for v in out.iter_mut() {
            *v = !*v;
        }
        Self(out)
    }

    /// Bitwise AND of two masks of identical dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if the masks differ
    /// in width or height.
    pub fn intersect(&self, other: &Self) -> Result<Self, PipelineError> {
        if self.dimensions() != other.dimensions() {
            return Err(PipelineError::DimensionMismatch {
                expected: self.dimensions(),
                actual: other.dimensions(),
            });
        }
        let mut out = self.0.clone();
        for (v, &o) in out.iter_mut().zip(other.0.iter()) {
            *v &= o;
        }
        Ok(Self(out))
    }

    /// The underlying gray image (values 0/255).
    #[must_use]
    pub const fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Consume the mask and return the underlying gray image.
    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.0
    }
}

// ───────────────────────── Geometry ──────────────────────────────────

/// Axis-aligned bounding rectangle of a contour, in pixels.
///
/// `width` and `height` count pixels, so a single-point contour has a
/// 1x1 box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left-most column.
    pub x: u32,
    /// Top-most row.
    pub y: u32,
    /// Number of columns spanned.
    pub width: u32,
    /// Number of rows spanned.
    pub height: u32,
}

impl BoundingBox {
    /// Smallest box enclosing `points`, or `None` if there are none.
    #[must_use]
    pub fn from_points(points: &[imageproc::point::Point<u32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }
}

// ───────────────────────── Configuration ─────────────────────────────

/// Tuning constants for every pipeline stage.
///
/// The defaults are the calibrated values the segmentation was tuned
/// with; change them only to experiment. Call
/// [`validate`](Self::validate) (done automatically at pipeline entry)
/// to reject values the stages cannot honour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Side length of the square Gaussian kernel applied before edge
    /// detection. Must be odd.
    pub blur_kernel_size: u32,

    /// Gaussian sigma. Zero or negative derives sigma from the kernel
    /// size.
    pub blur_sigma: f32,

    /// Canny low (hysteresis) threshold on the gradient magnitude.
    pub canny_low: f32,

    /// Canny high threshold: pixels above it seed edges.
    pub canny_high: f32,

    /// How the gradient magnitude is computed from the Sobel responses.
    pub gradient_norm: GradientNorm,

    /// Side length of the square structuring element used to thicken
    /// edges. Must be odd.
    pub edge_kernel_size: u32,

    /// Dilation passes applied to the edge map.
    pub edge_dilate_iterations: u32,

    /// Erosion passes applied after dilation. Fewer than
    /// `edge_dilate_iterations` so edges end up thicker than detected.
    pub edge_erode_iterations: u32,

    /// Gray level at or below which a pixel counts as dark.
    pub dark_threshold: u8,

    /// A region is kept as sky when the top of its bounding box lies
    /// above `top_fraction * height`.
    pub top_fraction: f64,

    /// Side length of the square structuring element for the final
    /// opening. Must be odd.
    pub open_kernel_size: u32,
}

impl PipelineConfig {
    /// Default Gaussian kernel side length.
    pub const DEFAULT_BLUR_KERNEL_SIZE: u32 = 5;
    /// Default Gaussian sigma (derived from the kernel size).
    pub const DEFAULT_BLUR_SIGMA: f32 = 0.0;
    /// Default Canny low threshold.
    pub const DEFAULT_CANNY_LOW: f32 = 50.0;
    /// Default Canny high threshold.
    pub const DEFAULT_CANNY_HIGH: f32 = 150.0;
    /// Default edge-thickening structuring element side length.
    pub const DEFAULT_EDGE_KERNEL_SIZE: u32 = 3;
    /// Default number of edge dilation passes.
    pub const DEFAULT_EDGE_DILATE_ITERATIONS: u32 = 20;
    /// Default number of edge erosion passes.
    pub const DEFAULT_EDGE_ERODE_ITERATIONS: u32 = 10;
    /// Default dark threshold (strict: `> 20` is bright).
    pub const DEFAULT_DARK_THRESHOLD: u8 = 20;
    /// Default top-of-frame fraction.
    pub const DEFAULT_TOP_FRACTION: f64 = 0.1;
    /// Default opening structuring element side length.
    pub const DEFAULT_OPEN_KERNEL_SIZE: u32 = 35;

    /// Check every field is usable by the stages.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        ensure_odd("blur_kernel_size", self.blur_kernel_size)?;
        ensure_odd("edge_kernel_size", self.edge_kernel_size)?;
        ensure_odd("open_kernel_size", self.open_kernel_size)?;

        if !self.blur_sigma.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "blur_sigma must be finite, got {}",
                self.blur_sigma
            )));
        }
        for (name, value) in [("canny_low", self.canny_low), ("canny_high", self.canny_high)] {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.top_fraction) {
            return Err(PipelineError::InvalidConfig(format!(
                "top_fraction must lie in [0, 1], got {}",
                self.top_fraction
            )));
        }
        Ok(())
    }
}

fn ensure_odd(name: &str, size: u32) -> Result<(), PipelineError> {
    if size % 2 == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "{name} must be odd, got {size}"
        )));
    }
    Ok(())
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: Self::DEFAULT_BLUR_KERNEL_SIZE,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            canny_low: Self::DEFAULT_CANNY_LOW,
            canny_high: Self::DEFAULT_CANNY_HIGH,
            gradient_norm: GradientNorm::default(),
            edge_kernel_size: Self::DEFAULT_EDGE_KERNEL_SIZE,
            edge_dilate_iterations: Self::DEFAULT_EDGE_DILATE_ITERATIONS,
            edge_erode_iterations: Self::DEFAULT_EDGE_ERODE_ITERATIONS,
            dark_threshold: Self::DEFAULT_DARK_THRESHOLD,
            top_fraction: Self::DEFAULT_TOP_FRACTION,
            open_kernel_size: Self::DEFAULT_OPEN_KERNEL_SIZE,
        }
    }
}

// ───────────────────────── Results ───────────────────────────────────

/// Result of running the pipeline with every intermediate preserved.
///
/// Each field captures the output of one stage so callers can preview or
/// save the whole chain.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Input with channels reordered to B, G, R.
    pub bgr: BgrImage,
    /// Luma of the input.
    pub grayscale: GrayImage,
    /// Inverted, thickened edge map (set = away from edges).
    pub edges: Mask,
    /// Non-dark pixels.
    pub bright: Mask,
    /// Intersection of `bright` and `edges`.
    pub combined: Mask,
    /// Filled regions touching the top of the frame.
    pub sky: Mask,
    /// `sky` after morphological opening: the final output.
    pub refined: Mask,
    /// Number of external contours found in `combined`.
    pub contour_count: usize,
    /// Number of those contours kept as sky.
    pub kept_contour_count: usize,
    /// Source image dimensions in pixels.
    pub dimensions: Dimensions,
}

impl StagedResult {
    /// The final sky mask.
    #[must_use]
    pub const fn final_mask(&self) -> &Mask {
        &self.refined
    }
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input is empty or has a zero dimension.
    #[error("invalid input image: {0}")]
    InvalidInput(String),

    /// The input is not a 3-channel, 8-bit image.
    #[error(
        "unsupported image format: expected 3 channels of 8 bits, got {channels} channel(s) of {bits_per_sample} bits"
    )]
    UnsupportedFormat {
        /// Channels per pixel in the rejected input.
        channels: u8,
        /// Bits per channel sample in the rejected input.
        bits_per_sample: u16,
    },

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Two rasters that must align have different sizes.
    #[error("raster dimensions differ: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensions of the first operand.
        expected: Dimensions,
        /// Dimensions of the second operand.
        actual: Dimensions,
    },

    /// A gray image offered as a mask holds a value other than 0 or 255.
    #[error("mask contains non-binary value {value}")]
    NotBinary {
        /// The first offending pixel value.
        value: u8,
    },
}
