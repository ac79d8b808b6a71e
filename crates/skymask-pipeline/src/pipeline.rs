//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process_staged`] which runs the entire pipeline in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use skymask_pipeline::{Pipeline, PipelineConfig, PipelineError};
//! # fn run(image: image::DynamicImage) -> Result<(), PipelineError> {
//! let staged = Pipeline::new(image, PipelineConfig::default())
//!     .validate()?
//!     .extract_edges()
//!     .detect_bright()
//!     .combine()?
//!     .detect_sky()
//!     .refine()
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying all previously computed
//! intermediates.
//!
//! # Memory
//!
//! Every stage keeps the BGR copy of the input plus one gray raster per
//! completed step. For a 4000×3000 photo that is roughly 36 MB of BGR
//! data and 12 MB per mask, held until [`Refined::into_result`].
//! Callers that only need the final mask should use [`crate::segment`].

use image::DynamicImage;

use crate::diagnostics::StageMetrics;
use crate::types::{
    BgrImage, Dimensions, GrayImage, Mask, PipelineConfig, PipelineError, SourceImage,
    StagedResult,
};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`validate`](Self::validate) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .validate() to continue"]
pub struct Pending {
    config: PipelineConfig,
    image: DynamicImage,
}

impl Pending {
    /// The image as handed to [`Pipeline::new`].
    #[must_use]
    pub const fn source(&self) -> &DynamicImage {
        &self.image
    }

    /// Check the configuration and input, then reorder the channels to
    /// B, G, R.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a bad configuration,
    /// [`PipelineError::InvalidInput`] for a zero-sized image and
    /// [`PipelineError::UnsupportedFormat`] for anything but 8-bit RGB.
    pub fn validate(self) -> Result<Validated, PipelineError> {
        self.config.validate()?;
        let source = SourceImage::try_from(self.image)?;
        let bgr = source.to_bgr();
        log::debug!("validated {} input", source.dimensions());
        Ok(Validated {
            config: self.config,
            dimensions: source.dimensions(),
            bgr,
        })
    }
}

// ───────────────────────── Stage 1: Validated ────────────────────────

/// Pipeline state after validation and the RGB to BGR swap.
#[must_use = "pipeline stages are consumed by advancing; call .extract_edges() to continue"]
pub struct Validated {
    config: PipelineConfig,
    dimensions: Dimensions,
    bgr: BgrImage,
}

impl Validated {
    /// The input with channels in B, G, R order.
    #[must_use]
    pub const fn bgr(&self) -> &BgrImage {
        &self.bgr
    }

    /// Run the edge extractor.
    ///
    /// The gray conversion computed here is reused by the bright-region
    /// stage.
    pub fn extract_edges(self) -> EdgesExtracted {
        let gray = crate::grayscale::luma(&self.bgr);
        let detected = crate::edge::detect(&gray, &self.config);
        let edges = crate::edge::thicken(&detected, &self.config).invert();
        let edge_pixel_count = detected.count_set();
        log::debug!(
            "edges: {edge_pixel_count} edge pixels, {} open pixels",
            edges.count_set()
        );
        EdgesExtracted {
            config: self.config,
            dimensions: self.dimensions,
            bgr: self.bgr,
            gray,
            edges,
            edge_pixel_count,
        }
    }
}

// ───────────────────────── Stage 2: EdgesExtracted ───────────────────

/// Pipeline state after edge extraction.
#[must_use = "pipeline stages are consumed by advancing; call .detect_bright() to continue"]
pub struct EdgesExtracted {
    config: PipelineConfig,
    dimensions: Dimensions,
    bgr: BgrImage,
    gray: GrayImage,
    edges: Mask,
    edge_pixel_count: u64,
}

impl EdgesExtracted {
    /// Luma of the input.
    #[must_use]
    pub const fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Inverted, thickened edge map.
    #[must_use]
    pub const fn edges(&self) -> &Mask {
        &self.edges
    }

    /// Threshold the gray image against `config.dark_threshold`.
    pub fn detect_bright(self) -> BrightDetected {
        let bright = crate::threshold::bright_mask(&self.gray, self.config.dark_threshold);
        log::debug!(
            "bright: {} pixels above {}",
            bright.count_set(),
            self.config.dark_threshold
        );
        BrightDetected {
            config: self.config,
            dimensions: self.dimensions,
            bgr: self.bgr,
            gray: self.gray,
            edges: self.edges,
            edge_pixel_count: self.edge_pixel_count,
            bright,
        }
    }
}

// ───────────────────────── Stage 3: BrightDetected ───────────────────

/// Pipeline state after dark-region thresholding.
#[must_use = "pipeline stages are consumed by advancing; call .combine() to continue"]
pub struct BrightDetected {
    config: PipelineConfig,
    dimensions: Dimensions,
    bgr: BgrImage,
    gray: GrayImage,
    edges: Mask,
    edge_pixel_count: u64,
    bright: Mask,
}

impl BrightDetected {
    /// Pixels brighter than the dark threshold.
    #[must_use]
    pub const fn bright(&self) -> &Mask {
        &self.bright
    }

    /// Intersect the bright mask with the edge mask.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if the two masks
    /// disagree in size. Both derive from the same input, so this
    /// indicates a bug in an earlier stage.
    pub fn combine(self) -> Result<Combined, PipelineError> {
        let combined = crate::combine::combine(&self.bright, &self.edges)?;
        log::debug!("combined: {} pixels", combined.count_set());
        Ok(Combined {
            config: self.config,
            dimensions: self.dimensions,
            bgr: self.bgr,
            gray: self.gray,
            edges: self.edges,
            edge_pixel_count: self.edge_pixel_count,
            bright: self.bright,
            combined,
        })
    }
}

// ───────────────────────── Stage 4: Combined ─────────────────────────

/// Pipeline state after mask combination.
#[must_use = "pipeline stages are consumed by advancing; call .detect_sky() to continue"]
pub struct Combined {
    config: PipelineConfig,
    dimensions: Dimensions,
    bgr: BgrImage,
    gray: GrayImage,
    edges: Mask,
    edge_pixel_count: u64,
    bright: Mask,
    combined: Mask,
}

impl Combined {
    /// Bright pixels away from edges.
    #[must_use]
    pub const fn combined(&self) -> &Mask {
        &self.combined
    }

    /// Keep and fill the regions that reach the top of the frame.
    pub fn detect_sky(self) -> SkyDetected {
        let detection = crate::sky::detect_sky(&self.combined, self.config.top_fraction);
        log::debug!(
            "sky: kept {} of {} contours, {} pixels",
            detection.kept_count,
            detection.contour_count,
            detection.mask.count_set()
        );
        SkyDetected {
            config: self.config,
            dimensions: self.dimensions,
            bgr: self.bgr,
            gray: self.gray,
            edges: self.edges,
            edge_pixel_count: self.edge_pixel_count,
            bright: self.bright,
            combined: self.combined,
            sky: detection.mask,
            contour_count: detection.contour_count,
            kept_contour_count: detection.kept_count,
        }
    }
}

// ───────────────────────── Stage 5: SkyDetected ──────────────────────

/// Pipeline state after sky region detection.
#[must_use = "pipeline stages are consumed by advancing; call .refine() to continue"]
pub struct SkyDetected {
    config: PipelineConfig,
    dimensions: Dimensions,
    bgr: BgrImage,
    gray: GrayImage,
    edges: Mask,
    edge_pixel_count: u64,
    bright: Mask,
    combined: Mask,
    sky: Mask,
    contour_count: usize,
    kept_contour_count: usize,
}

impl SkyDetected {
    /// Filled sky regions before the final opening.
    #[must_use]
    pub const fn sky(&self) -> &Mask {
        &self.sky
    }

    /// External contours found in the combined mask.
    #[must_use]
    pub const fn contour_count(&self) -> usize {
        self.contour_count
    }

    /// Contours that passed the top-of-frame test.
    #[must_use]
    pub const fn kept_contour_count(&self) -> usize {
        self.kept_contour_count
    }

    /// Apply the morphological opening.
    pub fn refine(self) -> Refined {
        let refined = crate::refine::refine(&self.sky, self.config.open_kernel_size);
        log::debug!(
            "refine: {} -> {} pixels",
            self.sky.count_set(),
            refined.count_set()
        );
        Refined {
            config: self.config,
            dimensions: self.dimensions,
            bgr: self.bgr,
            gray: self.gray,
            edges: self.edges,
            edge_pixel_count: self.edge_pixel_count,
            bright: self.bright,
            combined: self.combined,
            sky: self.sky,
            contour_count: self.contour_count,
            kept_contour_count: self.kept_contour_count,
            refined,
        }
    }
}

// ───────────────────────── Stage 6: Refined ──────────────────────────

/// Pipeline state after the final opening.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`StagedResult`] containing all intermediates.
#[must_use = "call .into_result() to extract the StagedResult"]
pub struct Refined {
    config: PipelineConfig,
    dimensions: Dimensions,
    bgr: BgrImage,
    gray: GrayImage,
    edges: Mask,
    edge_pixel_count: u64,
    bright: Mask,
    combined: Mask,
    sky: Mask,
    contour_count: usize,
    kept_contour_count: usize,
    refined: Mask,
}

impl Refined {
    /// The final sky mask.
    #[must_use]
    pub const fn refined(&self) -> &Mask {
        &self.refined
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Consume the pipeline and return the full [`StagedResult`].
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            bgr: self.bgr,
            grayscale: self.gray,
            edges: self.edges,
            bright: self.bright,
            combined: self.combined,
            sky: self.sky,
            refined: self.refined,
            contour_count: self.contour_count,
            kept_contour_count: self.kept_contour_count,
            dimensions: self.dimensions,
        }
    }
}

// ──────────────────────── PipelineStage trait ────────────────────────

/// Name, position and metrics shared by every pipeline state, so the
/// diagnostics runner can time stages uniformly.
pub trait PipelineStage {
    /// Short name of this stage (e.g. `"source"`, `"sky"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `6` for
    /// Refined).
    const INDEX: usize;

    /// Metrics describing the work done to reach this state.
    fn metrics(&self) -> StageMetrics;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Source {
            width: self.image.width(),
            height: self.image.height(),
            color: format!("{:?}", self.image.color()),
        }
    }
}

impl PipelineStage for Validated {
    const NAME: &str = "validate";
    const INDEX: usize = 1;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Validate {
            width: self.dimensions.width,
            height: self.dimensions.height,
            pixel_count: self.dimensions.pixel_count(),
        }
    }
}

impl PipelineStage for EdgesExtracted {
    const NAME: &str = "edges";
    const INDEX: usize = 2;

    fn metrics(&self) -> StageMetrics {
        let (low_threshold, high_threshold) =
            crate::canny::ordered_thresholds(self.config.canny_low, self.config.canny_high);
        StageMetrics::EdgeExtraction {
            low_threshold,
            high_threshold,
            edge_pixel_count: self.edge_pixel_count,
            open_pixel_count: self.edges.count_set(),
            total_pixel_count: self.dimensions.pixel_count(),
        }
    }
}

impl PipelineStage for BrightDetected {
    const NAME: &str = "bright";
    const INDEX: usize = 3;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::BrightDetection {
            threshold: self.config.dark_threshold,
            bright_pixel_count: self.bright.count_set(),
            total_pixel_count: self.dimensions.pixel_count(),
        }
    }
}

impl PipelineStage for Combined {
    const NAME: &str = "combine";
    const INDEX: usize = 4;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Combine {
            combined_pixel_count: self.combined.count_set(),
            total_pixel_count: self.dimensions.pixel_count(),
        }
    }
}

impl PipelineStage for SkyDetected {
    const NAME: &str = "sky";
    const INDEX: usize = 5;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::SkyDetection {
            top_fraction: self.config.top_fraction,
            contour_count: self.contour_count,
            kept_contour_count: self.kept_contour_count,
            sky_pixel_count: self.sky.count_set(),
        }
    }
}

impl PipelineStage for Refined {
    const NAME: &str = "refine";
    const INDEX: usize = 6;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Refine {
            kernel_size: self.config.open_kernel_size,
            pixels_before: self.sky.count_set(),
            pixels_after: self.refined.count_set(),
        }
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental sky segmentation pipeline.
///
/// Created via [`Pipeline::new`], which stores the image and config
/// without doing any processing. Each stage method consumes the current
/// state and returns the next, making it a compile-time error to skip
/// stages or call them out of order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from an image and config.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image: DynamicImage, config: PipelineConfig) -> Pending {
        Pending { config, image }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    /// Bright upper half over a black lower half.
    fn half_sky(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, y| {
            if y < height / 2 {
                Rgb([200, 220, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }

    #[test]
    fn pending_exposes_source() {
        let pending = Pipeline::new(half_sky(30, 20), PipelineConfig::default());
        assert_eq!(pending.source().width(), 30);
    }

    #[test]
    fn validate_rejects_gray_input() {
        let gray = DynamicImage::ImageLuma8(GrayImage::new(10, 10));
        let result = Pipeline::new(gray, PipelineConfig::default()).validate();
        assert!(matches!(
            result,
            Err(PipelineError::UnsupportedFormat { channels: 1, .. })
        ));
    }

    #[test]
    fn validate_rejects_empty_input() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let result = Pipeline::new(empty, PipelineConfig::default()).validate();
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn validate_rejects_bad_config() {
        let config = PipelineConfig {
            blur_kernel_size: 4,
            ..PipelineConfig::default()
        };
        let result = Pipeline::new(half_sky(10, 10), config).validate();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn validated_holds_swapped_channels() {
        let validated = Pipeline::new(half_sky(10, 10), PipelineConfig::default())
            .validate()
            .unwrap();
        assert_eq!(validated.bgr().get_pixel(0, 0), [255, 220, 200]);
    }

    #[test]
    fn typed_chain_preserves_dimensions() {
        let edges = Pipeline::new(half_sky(60, 40), PipelineConfig::default())
            .validate()
            .unwrap()
            .extract_edges();
        assert_eq!(edges.gray().dimensions(), (60, 40));
        assert_eq!(edges.edges().width(), 60);

        let bright = edges.detect_bright();
        assert_eq!(bright.bright().height(), 40);

        let combined = bright.combine().unwrap();
        let sky = combined.detect_sky();
        assert!(sky.kept_contour_count() <= sky.contour_count());

        let refined = sky.refine();
        assert_eq!(
            refined.dimensions(),
            Dimensions {
                width: 60,
                height: 40
            }
        );
    }

    #[test]
    fn staged_result_final_mask_is_refined() {
        let result = crate::process_staged(half_sky(80, 80), PipelineConfig::default()).unwrap();
        assert_eq!(result.final_mask(), &result.refined);
        assert_eq!(result.dimensions.width, 80);
    }

    #[test]
    fn stage_names_and_indices_follow_pipeline_order() {
        let names = [
            (Pending::NAME, Pending::INDEX),
            (Validated::NAME, Validated::INDEX),
            (EdgesExtracted::NAME, EdgesExtracted::INDEX),
            (BrightDetected::NAME, BrightDetected::INDEX),
            (Combined::NAME, Combined::INDEX),
            (SkyDetected::NAME, SkyDetected::INDEX),
            (Refined::NAME, Refined::INDEX),
        ];
        assert_eq!(
            names.map(|(name, _)| name),
            ["source", "validate", "edges", "bright", "combine", "sky", "refine"]
        );
        for (position, (_, index)) in names.iter().enumerate() {
            assert_eq!(*index, position);
        }
    }

    #[test]
    fn pending_metrics_describe_the_source() {
        let pending = Pipeline::new(half_sky(12, 7), PipelineConfig::default());
        assert!(matches!(
            pending.metrics(),
            StageMetrics::Source { width: 12, height: 7, .. }
        ));
    }

    #[test]
    fn metrics_report_counts() {
        let sky = Pipeline::new(half_sky(40, 40), PipelineConfig::default())
            .validate()
            .unwrap()
            .extract_edges()
            .detect_bright()
            .combine()
            .unwrap()
            .detect_sky();
        let (total, kept) = (sky.contour_count(), sky.kept_contour_count());
        assert!(matches!(
            sky.metrics(),
            StageMetrics::SkyDetection {
                contour_count,
                kept_contour_count,
                ..
            } if contour_count == total && kept_contour_count == kept
        ));
    }
}
