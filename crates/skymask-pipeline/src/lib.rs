//! skymask-pipeline: classical sky segmentation (sans-IO).
//!
//! Turns a color photograph into a binary sky mask through:
//! RGB -> BGR -> edge extraction + dark threshold -> intersection ->
//! top-of-frame region fill -> morphological opening.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! rasters and returns in-memory masks. Decoding and encoding files is
//! the caller's business (see the `skymask` binary).

pub mod blur;
pub mod canny;
pub mod combine;
pub mod diagnostics;
pub mod edge;
pub mod grayscale;
pub mod morphology;
pub mod pipeline;
pub mod refine;
pub mod sky;
pub mod threshold;
pub mod types;

use image::DynamicImage;

pub use canny::GradientNorm;
pub use pipeline::Pipeline;
pub use types::{
    BgrImage, BoundingBox, Dimensions, GrayImage, Mask, PipelineConfig, PipelineError, RgbImage,
    SourceImage, StagedResult,
};

/// Segment the sky in a validated RGB image.
///
/// # Pipeline steps
///
/// 1. Reorder channels to B, G, R
/// 2. Edge extraction: luma, Gaussian blur, Canny, dilate, erode, invert
/// 3. Dark region detection: luma thresholded at `dark_threshold`
/// 4. Intersection of the two masks
/// 5. Fill the outer regions whose bounding box starts near the top
/// 6. Morphological opening
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// [`PipelineConfig::validate`].
pub fn segment(image: &SourceImage, config: &PipelineConfig) -> Result<Mask, PipelineError> {
    config.validate()?;

    let bgr = image.to_bgr();
    let gray = grayscale::luma(&bgr);

    let edges = edge::extract_edges_from_gray(&gray, config);
    let bright = threshold::bright_mask(&gray, config.dark_threshold);
    let combined = combine::combine(&bright, &edges)?;
    let sky = sky::detect_sky(&combined, config.top_fraction);

    Ok(refine::refine(&sky.mask, config.open_kernel_size))
}

/// Validate a decoded image and segment its sky.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidInput`] for an image with a zero
/// dimension, [`PipelineError::UnsupportedFormat`] for anything other
/// than 8-bit RGB, and [`PipelineError::InvalidConfig`] for a bad
/// configuration.
pub fn process(image: &DynamicImage, config: &PipelineConfig) -> Result<Mask, PipelineError> {
    segment(&SourceImage::try_from(image)?, config)
}

/// Run the pipeline keeping every intermediate raster.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_staged(
    image: DynamicImage,
    config: PipelineConfig,
) -> Result<StagedResult, PipelineError> {
    Ok(Pipeline::new(image, config)
        .validate()?
        .extract_edges()
        .detect_bright()
        .combine()?
        .detect_sky()
        .refine()
        .into_result())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgb;

    use super::*;

    fn uniform(width: u32, height: u32, level: u8) -> SourceImage {
        SourceImage::new(RgbImage::from_pixel(width, height, Rgb([level; 3]))).unwrap()
    }

    #[test]
    fn segment_uniform_bright_is_all_sky() {
        let mask = segment(&uniform(40, 30, 200), &PipelineConfig::default()).unwrap();
        assert_eq!(mask, Mask::filled(40, 30));
    }

    #[test]
    fn segment_uniform_black_is_empty() {
        let mask = segment(&uniform(40, 30, 0), &PipelineConfig::default()).unwrap();
        assert_eq!(mask.count_set(), 0);
    }

    #[test]
    fn segment_rejects_invalid_config() {
        let config = PipelineConfig {
            edge_kernel_size: 2,
            ..PipelineConfig::default()
        };
        let result = segment(&uniform(10, 10, 100), &config);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn process_rejects_rgba() {
        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::new(8, 8));
        let result = process(&rgba, &PipelineConfig::default());
        assert!(matches!(
            result,
            Err(PipelineError::UnsupportedFormat { channels: 4, .. })
        ));
    }

    #[test]
    fn process_rejects_empty() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        let result = process(&empty, &PipelineConfig::default());
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn process_and_staged_agree() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| {
            if y < 20 || x > 50 {
                Rgb([180, 200, 240])
            } else {
                Rgb([10, 30, 10])
            }
        }));
        let mask = process(&image, &PipelineConfig::default()).unwrap();
        let staged = process_staged(image, PipelineConfig::default()).unwrap();
        assert_eq!(&mask, staged.final_mask());
    }
}
