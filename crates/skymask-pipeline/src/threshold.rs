//! Dark region detection by a fixed gray-level threshold.

use image::GrayImage;
use imageproc::contrast::{ThresholdType, threshold};

use crate::types::{BgrImage, Mask};

/// Mask of pixels whose luma is strictly greater than `level`.
///
/// Dark silhouettes (buildings, trees, ground) end up clear.
#[must_use = "returns the bright-pixel mask"]
pub fn detect_bright(image: &BgrImage, level: u8) -> Mask {
    bright_mask(&crate::grayscale::luma(image), level)
}

/// [`detect_bright`] for an image already converted to gray.
#[must_use = "returns the bright-pixel mask"]
pub fn bright_mask(gray: &GrayImage, level: u8) -> Mask {
    Mask::from_binary(threshold(gray, level, ThresholdType::Binary))
}
