//! Sky region detection.
//!
//! Sky is assumed to adjoin the top of the frame. Every outermost region
//! of the combined mask is tested by the top row of its bounding box;
//! survivors are painted, holes included, onto an empty canvas.
//!
//! Filling works on labels rather than on polygon interiors: the pixels
//! of a kept region are found through 8-connected labelling (the same
//! connectivity the outer border follower uses), and holes are the
//! 4-connected background pockets that do not reach the frame border.

use image::Luma;
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::definitions::Image;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::types::{BoundingBox, Mask};

/// Output of [`detect_sky`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkyDetection {
    /// Filled regions that passed the top-of-frame test.
    pub mask: Mask,
    /// External contours found in the input.
    pub contour_count: usize,
    /// Contours kept as sky.
    pub kept_count: usize,
}

/// Outermost region borders. Holes, and regions nested inside holes,
/// are skipped.
#[must_use]
pub fn external_contours(mask: &Mask) -> Vec<Contour<u32>> {
    find_contours::<u32>(mask.as_gray())
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .collect()
}

/// Whether a box starts above `top_fraction` of the image height.
#[must_use]
pub fn is_near_top(bbox: &BoundingBox, height: u32, top_fraction: f64) -> bool {
    f64::from(bbox.y) < f64::from(height) * top_fraction
}

/// Keep and fill the regions of `combined` that reach near the top.
#[must_use = "returns the sky detection"]
pub fn detect_sky(combined: &Mask, top_fraction: f64) -> SkyDetection {
    let (width, height) = (combined.width(), combined.height());
    let contours = external_contours(combined);
    let limit = f64::from(height) * top_fraction;

    let labels = connected_components(
        combined.as_gray(),
        Connectivity::Eight,
        Luma([Mask::CLEAR]),
    );
    let mut keep = vec![false; label_count(&labels)];
    let mut kept_count = 0;

    for (index, contour) in contours.iter().enumerate() {
        let (Some(bbox), Some(start)) = (
            BoundingBox::from_points(&contour.points),
            contour.points.first(),
        ) else {
            continue;
        };
        if !is_near_top(&bbox, height, top_fraction) {
            log::trace!(
                "contour {index}: discarded, top {} not above {limit:.1}",
                bbox.y
            );
            continue;
        }
        log::trace!(
            "contour {index}: kept, box {}x{} at ({}, {})",
            bbox.width,
            bbox.height,
            bbox.x,
            bbox.y
        );
        keep[labels.get_pixel(start.x, start.y).0[0] as usize] = true;
        kept_count += 1;
    }

    let painted = Mask::from_fn(width, height, |x, y| {
        keep[labels.get_pixel(x, y).0[0] as usize]
    });

    SkyDetection {
        mask: fill_holes(&painted),
        contour_count: contours.len(),
        kept_count,
    }
}

/// Set every clear pixel that cannot reach the frame border through
/// 4-connected clear pixels.
#[must_use = "returns the filled mask"]
pub fn fill_holes(mask: &Mask) -> Mask {
    let (width, height) = (mask.width(), mask.height());
    if width == 0 || height == 0 {
        return mask.clone();
    }

    let regions = connected_components(mask.as_gray(), Connectivity::Four, Luma([Mask::SET]));
    let mut outside = vec![false; label_count(&regions)];
    let border = (0..width)
        .flat_map(|x| [(x, 0), (x, height - 1)])
        .chain((0..height).flat_map(|y| [(0, y), (width - 1, y)]));
    for (x, y) in border {
        outside[regions.get_pixel(x, y).0[0] as usize] = true;
    }

    Mask::from_fn(width, height, |x, y| {
        let label = regions.get_pixel(x, y).0[0];
        label == 0 || !outside[label as usize]
    })
}

fn label_count(labels: &Image<Luma<u32>>) -> usize {
    labels.iter().copied().max().unwrap_or(0) as usize + 1
}
