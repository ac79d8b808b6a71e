//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! Timestamps come from an injectable [`Clock`]. [`SystemClock`] uses
//! the `web-time` crate, which maps to `performance.now()` on WASM and
//! `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::pipeline::{Pipeline, PipelineStage};
use crate::types::{PipelineConfig, PipelineError, StagedResult};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: input and config validation, RGB to BGR swap.
    pub validate: StageDiagnostics,
    /// Stage 2: grayscale, blur, Canny, thickening, inversion.
    pub edge_extraction: StageDiagnostics,
    /// Stage 3: dark threshold.
    pub bright_detection: StageDiagnostics,
    /// Stage 4: mask intersection.
    pub combine: StageDiagnostics,
    /// Stage 5: contour filtering and fill.
    pub sky_detection: StageDiagnostics,
    /// Stage 6: morphological opening.
    pub refine: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// The unprocessed input.
    Source {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
        /// Color type as reported by `image`.
        color: String,
    },
    /// Validation metrics.
    Validate {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Edge extraction metrics.
    EdgeExtraction {
        /// Low threshold (after ordering).
        low_threshold: f32,
        /// High threshold (after ordering).
        high_threshold: f32,
        /// Canny edge pixels before thickening.
        edge_pixel_count: u64,
        /// Set pixels in the inverted, thickened mask.
        open_pixel_count: u64,
        /// Total pixel count for computing densities.
        total_pixel_count: u64,
    },
    /// Dark threshold metrics.
    BrightDetection {
        /// Gray level at or below which pixels count as dark.
        threshold: u8,
        /// Pixels above the threshold.
        bright_pixel_count: u64,
        /// Total pixel count.
        total_pixel_count: u64,
    },
    /// Mask combination metrics.
    Combine {
        /// Set pixels in the intersection.
        combined_pixel_count: u64,
        /// Total pixel count.
        total_pixel_count: u64,
    },
    /// Sky region detection metrics.
    SkyDetection {
        /// Fraction of the height a region must start above.
        top_fraction: f64,
        /// External contours found.
        contour_count: usize,
        /// Contours kept as sky.
        kept_contour_count: usize,
        /// Set pixels after filling.
        sky_pixel_count: u64,
    },
    /// Opening metrics.
    Refine {
        /// Structuring element side length.
        kernel_size: u32,
        /// Set pixels before opening.
        pixels_before: u64,
        /// Set pixels after opening.
        pixels_after: u64,
    },
}

/// High-level summary counts for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// External contours found.
    pub contour_count: usize,
    /// Contours kept as sky.
    pub kept_contour_count: usize,
    /// Set pixels in the final mask.
    pub sky_pixel_count: u64,
}

impl PipelineSummary {
    /// Share of the image covered by the final mask, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sky_fraction(&self) -> f64 {
        if self.pixel_count == 0 {
            0.0
        } else {
            self.sky_pixel_count as f64 / self.pixel_count as f64
        }
    }
}

impl PipelineDiagnostics {
    /// Stages in execution order with their report labels.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 6] {
        [
            ("Validate", &self.validate),
            ("Edge Extraction", &self.edge_extraction),
            ("Bright Detection", &self.bright_detection),
            ("Combine", &self.combine),
            ("Sky Detection", &self.sky_detection),
            ("Refine", &self.refine),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Contours: {} kept of {}  |  Sky: {} px ({:.1}%)",
            self.summary.kept_contour_count,
            self.summary.contour_count,
            self.summary.sky_pixel_count,
            self.summary.sky_fraction() * 100.0,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Source {
            width,
            height,
            color,
        } => format!("{width}x{height} {color}"),
        StageMetrics::Validate { width, height, .. } => format!("{width}x{height} RGB -> BGR"),
        StageMetrics::EdgeExtraction {
            low_threshold,
            high_threshold,
            edge_pixel_count,
            open_pixel_count,
            total_pixel_count,
        } => format!(
            "low={low_threshold:.1} high={high_threshold:.1} edges={edge_pixel_count} ({:.1}%) open={open_pixel_count} ({:.1}%)",
            percent(*edge_pixel_count, *total_pixel_count),
            percent(*open_pixel_count, *total_pixel_count),
        ),
        StageMetrics::BrightDetection {
            threshold,
            bright_pixel_count,
            total_pixel_count,
        } => format!(
            "threshold={threshold} bright={bright_pixel_count} ({:.1}%)",
            percent(*bright_pixel_count, *total_pixel_count),
        ),
        StageMetrics::Combine {
            combined_pixel_count,
            total_pixel_count,
        } => format!(
            "combined={combined_pixel_count} ({:.1}%)",
            percent(*combined_pixel_count, *total_pixel_count),
        ),
        StageMetrics::SkyDetection {
            top_fraction,
            contour_count,
            kept_contour_count,
            sky_pixel_count,
        } => format!(
            "top<{top_fraction:.2} contours={kept_contour_count}/{contour_count} sky={sky_pixel_count}",
        ),
        StageMetrics::Refine {
            kernel_size,
            pixels_before,
            pixels_after,
        } => format!("kernel={kernel_size} {pixels_before}->{pixels_after} px"),
    }
}

/// Time one stage transition and capture the new stage's metrics.
fn timed<C, S, F>(clock: &C, step: F) -> Result<(S, StageDiagnostics), PipelineError>
where
    C: Clock,
    S: PipelineStage,
    F: FnOnce() -> Result<S, PipelineError>,
{
    let start = clock.now();
    let stage = step()?;
    let duration = clock.elapsed(&start);
    let metrics = stage.metrics();
    log::trace!("stage {} took {:.3}ms", S::NAME, duration_ms(duration));
    Ok((stage, StageDiagnostics { duration, metrics }))
}

/// Run the staged pipeline, timing every stage with `clock`.
///
/// # Errors
///
/// Returns the same errors as [`Pending::validate`](crate::pipeline::Pending::validate).
pub fn process_with_diagnostics<C: Clock>(
    image: DynamicImage,
    config: PipelineConfig,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let total_start = clock.now();
    let pending = Pipeline::new(image, config);

    let (validated, validate) = timed(clock, || pending.validate())?;
    let (edges, edge_extraction) = timed(clock, || Ok(validated.extract_edges()))?;
    let (bright, bright_detection) = timed(clock, || Ok(edges.detect_bright()))?;
    let (combined, combine) = timed(clock, || bright.combine())?;
    let (sky, sky_detection) = timed(clock, || Ok(combined.detect_sky()))?;
    let (refined, refine) = timed(clock, || Ok(sky.refine()))?;

    let result = refined.into_result();
    let total_duration = clock.elapsed(&total_start);

    let summary = PipelineSummary {
        image_width: result.dimensions.width,
        image_height: result.dimensions.height,
        pixel_count: result.dimensions.pixel_count(),
        contour_count: result.contour_count,
        kept_contour_count: result.kept_contour_count,
        sky_pixel_count: result.refined.count_set(),
    };

    Ok((
        result,
        PipelineDiagnostics {
            validate,
            edge_extraction,
            bright_detection,
            combine,
            sky_detection,
            refine,
            total_duration,
            summary,
        },
    ))
}
