//! Canny edge detection on an already-smoothed grayscale image.
//!
//! Structured after `imageproc::edges::canny` (Sobel gradients,
//! non-maximum suppression, hysteresis) with these differences:
//!
//! 1. **No internal blur.** The edge stage applies its own fixed-size
//!    Gaussian first; `imageproc` always blurs again with sigma 1.4.
//! 2. **Selectable magnitude.** [`GradientNorm::L1`] (`|gx| + |gy|`) is the
//!    default; [`GradientNorm::L2`] matches `imageproc`.
//! 3. **Sector test instead of `atan2`.** The gradient direction is
//!    binned with `tan(22.5°)` / `tan(67.5°)` comparisons, and ties along
//!    the gradient are broken towards the earlier pixel.
//! 4. **Strict thresholds.** A pixel is a candidate only if its magnitude
//!    is `> low`, and seeds an edge only if `> high`.
//! 5. **Bounds-checked 8-neighbour hysteresis.** `imageproc 0.26.0`
//!    underflows at the border and skips two neighbours
//!    (<https://github.com/image-rs/imageproc/issues/705>).

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel;
use serde::{Deserialize, Serialize};

use crate::types::Mask;

/// How the gradient magnitude is formed from the Sobel responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradientNorm {
    /// `|gx| + |gy|`.
    #[default]
    L1,
    /// `sqrt(gx² + gy²)`.
    L2,
}

impl GradientNorm {
    fn magnitude(self, gx: i16, gy: i16) -> f32 {
        let (gx, gy) = (f32::from(gx), f32::from(gy));
        match self {
            Self::L1 => gx.abs() + gy.abs(),
            Self::L2 => gx.hypot(gy),
        }
    }
}

/// `tan(22.5°)`.
const TAN_22_5: f32 = 0.414_213_57;
/// `tan(67.5°)`.
const TAN_67_5: f32 = 2.414_213_7;

/// Detect edges with the Canny algorithm.
///
/// Returns a mask with edge pixels set. Thresholds are swapped if
/// `low_threshold > high_threshold`.
#[must_use = "returns the binary edge map"]
pub fn canny(
    image: &GrayImage,
    low_threshold: f32,
    high_threshold: f32,
    norm: GradientNorm,
) -> Mask {
    let (low, high) = ordered_thresholds(low_threshold, high_threshold);

    let gx: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_VERTICAL_3X3);
    let gradients = Gradients::new(&gx, &gy, norm);

    let classes = non_maximum_suppression(&gradients, low, high);
    hysteresis(&classes, image.width(), image.height())
}

/// The `(low, high)` pair actually applied: swapped if given in the
/// wrong order.
#[must_use]
pub fn ordered_thresholds(low_threshold: f32, high_threshold: f32) -> (f32, f32) {
    if low_threshold > high_threshold {
        (high_threshold, low_threshold)
    } else {
        (low_threshold, high_threshold)
    }
}

/// Per-pixel Sobel responses and magnitudes in row-major order.
struct Gradients<'a> {
    width: usize,
    height: usize,
    gx: &'a [i16],
    gy: &'a [i16],
    magnitude: Vec<f32>,
}

impl<'a> Gradients<'a> {
    fn new(gx: &'a Image<Luma<i16>>, gy: &'a Image<Luma<i16>>, norm: GradientNorm) -> Self {
        let magnitude = gx
            .iter()
            .zip(gy.iter())
            .map(|(&h, &v)| norm.magnitude(h, v))
            .collect();
        Self {
            width: gx.width() as usize,
            height: gx.height() as usize,
            gx: gx.as_raw(),
            gy: gy.as_raw(),
            magnitude,
        }
    }

    /// Magnitude at `(x + dx, y + dy)`, zero outside the image.
    fn at(&self, x: usize, y: usize, dx: isize, dy: isize) -> f32 {
        match (x.checked_add_signed(dx), y.checked_add_signed(dy)) {
            (Some(nx), Some(ny)) if nx < self.width && ny < self.height => {
                self.magnitude[ny * self.width + nx]
            }
            _ => 0.0,
        }
    }
}

/// Outcome of non-maximum suppression and double thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeClass {
    Suppressed,
    Weak,
    Strong,
}

/// Keep only pixels that are local maxima along their gradient direction
/// and classify them against the two thresholds.
fn non_maximum_suppression(g: &Gradients<'_>, low: f32, high: f32) -> Vec<EdgeClass> {
    let mut out = vec![EdgeClass::Suppressed; g.width * g.height];
    for y in 0..g.height {
        for x in 0..g.width {
            let i = y * g.width + x;
            let m = g.magnitude[i];
            if m <= low {
                continue;
            }

            let dx = f32::from(g.gx[i]);
            let dy = f32::from(g.gy[i]);
            let (ax, ay) = (dx.abs(), dy.abs());

            let is_peak = if ay < ax * TAN_22_5 {
                // Near-horizontal gradient: compare left and right.
                m > g.at(x, y, -1, 0) && m >= g.at(x, y, 1, 0)
            } else if ay > ax * TAN_67_5 {
                // Near-vertical gradient: compare above and below.
                m > g.at(x, y, 0, -1) && m >= g.at(x, y, 0, 1)
            } else {
                // Diagonal: the neighbours along the gradient sit on the
                // main diagonal when both components share a sign.
                let s: isize = if (dx < 0.0) == (dy < 0.0) { 1 } else { -1 };
                m > g.at(x, y, -s, -1) && m > g.at(x, y, s, 1)
            };

            if is_peak {
                out[i] = if m > high {
                    EdgeClass::Strong
                } else {
                    EdgeClass::Weak
                };
            }
        }
    }
    out
}

const NEIGHBOUR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Grow edges from strong pixels through 8-connected weak pixels.
/// Non-recursive depth-first search.
fn hysteresis(classes: &[EdgeClass], width: u32, height: u32) -> Mask {
    let (w, h) = (width as usize, height as usize);
    let mut out = vec![false; w * h];
    let mut stack = Vec::new();

    for (i, class) in classes.iter().enumerate() {
        if *class != EdgeClass::Strong || out[i] {
            continue;
        }
        out[i] = true;
        stack.push(i);
        while let Some(j) = stack.pop() {
            let (x, y) = (j % w, j / w);
            for (dx, dy) in NEIGHBOUR_OFFSETS {
                let (Some(nx), Some(ny)) = (x.checked_add_signed(dx), y.checked_add_signed(dy))
                else {
                    continue;
                };
                if nx >= w || ny >= h {
                    continue;
                }
                let n = ny * w + nx;
                if classes[n] != EdgeClass::Suppressed && !out[n] {
                    out[n] = true;
                    stack.push(n);
                }
            }
        }
    }

    Mask::from_fn(width, height, |x, y| out[y as usize * w + x as usize])
}
