//! Edge extraction: blur, Canny, thicken, invert.
//!
//! The detected edge lines are grown with more dilation passes than
//! erosion passes so that thin, broken curves merge into thick closed
//! blobs. The result is inverted, leaving set pixels in the smooth areas
//! between edges.

use image::GrayImage;

use crate::types::{BgrImage, Mask, PipelineConfig};

/// Run the full edge extraction on a BGR image.
///
/// Returns a mask that is clear on and around edges and set elsewhere.
#[must_use = "returns the inverted edge mask"]
pub fn extract_edges(image: &BgrImage, config: &PipelineConfig) -> Mask {
    extract_edges_from_gray(&crate::grayscale::luma(image), config)
}

/// Same as [`extract_edges`] for an image already converted to gray.
#[must_use = "returns the inverted edge mask"]
pub fn extract_edges_from_gray(gray: &GrayImage, config: &PipelineConfig) -> Mask {
    thicken(&detect(gray, config), config).invert()
}

/// Blur and Canny only: set pixels are the thin detected edge lines.
#[must_use = "returns the binary edge map"]
pub fn detect(gray: &GrayImage, config: &PipelineConfig) -> Mask {
    let blurred = crate::blur::gaussian_blur(gray, config.blur_kernel_size, config.blur_sigma);
    crate::canny::canny(
        &blurred,
        config.canny_low,
        config.canny_high,
        config.gradient_norm,
    )
}

/// Dilate then erode the edge map with the configured square kernel.
#[must_use = "returns the thickened edge map"]
pub fn thicken(edges: &Mask, config: &PipelineConfig) -> Mask {
    let grown = crate::morphology::dilate(
        edges,
        config.edge_kernel_size,
        config.edge_dilate_iterations,
    );
    crate::morphology::erode(&grown, config.edge_kernel_size, config.edge_erode_iterations)
}
