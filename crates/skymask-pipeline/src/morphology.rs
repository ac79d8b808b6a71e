//! Binary morphology with square, all-ones structuring elements.
//!
//! A `k` x `k` square applied `n` times equals one square of radius
//! `(k / 2) * n` under the chessboard (L∞) norm, which is exactly what
//! [`imageproc::morphology`] computes from a distance transform. Pixels
//! outside the frame never influence the result: dilation ignores them
//! and erosion treats them as set.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

use crate::types::Mask;

/// Largest radius handed to `imageproc` in a single call. Its distance
/// transform saturates at 255.
const MAX_STEP: u8 = 254;

/// Grow set regions by a `kernel_size` square, `iterations` times.
#[must_use = "returns the dilated mask"]
pub fn dilate(mask: &Mask, kernel_size: u32, iterations: u32) -> Mask {
    let radius = effective_radius(mask, kernel_size, iterations);
    Mask::from_binary(apply_stepped(mask.as_gray(), radius, morphology::dilate))
}

/// Shrink set regions by a `kernel_size` square, `iterations` times.
#[must_use = "returns the eroded mask"]
pub fn erode(mask: &Mask, kernel_size: u32, iterations: u32) -> Mask {
    let radius = effective_radius(mask, kernel_size, iterations);
    Mask::from_binary(apply_stepped(mask.as_gray(), radius, morphology::erode))
}

/// Erosion followed by dilation with one `kernel_size` square.
///
/// Removes set blobs and protrusions narrower than the square while
/// leaving larger regions where they were.
#[must_use = "returns the opened mask"]
pub fn open(mask: &Mask, kernel_size: u32) -> Mask {
    dilate(&erode(mask, kernel_size, 1), kernel_size, 1)
}

/// Total L∞ radius, capped at the longest side. Beyond that every pixel
/// already reaches every other, so the result cannot change.
fn effective_radius(mask: &Mask, kernel_size: u32, iterations: u32) -> u64 {
    let radius = u64::from(kernel_size / 2) * u64::from(iterations);
    let longest = u64::from(mask.width().max(mask.height()));
    radius.min(longest)
}

fn apply_stepped(
    image: &GrayImage,
    radius: u64,
    op: fn(&GrayImage, Norm, u8) -> GrayImage,
) -> GrayImage {
    let mut out = image.clone();
    let mut remaining = radius;
    while remaining > 0 {
        let step = u8::try_from(remaining).unwrap_or(MAX_STEP).min(MAX_STEP);
        out = op(&out, Norm::LInf, step);
        remaining -= u64::from(step);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: u32, x0: u32, y0: u32, side: u32) -> Mask {
        Mask::from_fn(size, size, |x, y| {
            (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y)
        })
    }

    #[test]
    fn dilate_single_pixel_grows_square() {
        let mask = square(21, 10, 10, 1);
        let grown = dilate(&mask, 3, 2);
        assert_eq!(grown, square(21, 8, 8, 5));
    }

    #[test]
    fn dilate_iterations_compose() {
        let mask = square(41, 20, 20, 1);
        assert_eq!(dilate(&mask, 3, 4), dilate(&mask, 9, 1));
    }

    #[test]
    fn erode_shrinks_square() {
        let mask = square(21, 5, 5, 9);
        let shrunk = erode(&mask, 3, 2);
        assert_eq!(shrunk, square(21, 7, 7, 5));
    }

    #[test]
    fn erode_treats_outside_as_set() {
        // A full mask must survive erosion: the frame border is not
        // background.
        let full = Mask::filled(12, 8);
        assert_eq!(erode(&full, 3, 5), full);
        // A region flush with the border only shrinks from its inner side.
        let top_band = Mask::from_fn(12, 12, |_, y| y < 6);
        let shrunk = erode(&top_band, 3, 2);
        assert_eq!(shrunk, Mask::from_fn(12, 12, |_, y| y < 4));
    }

    #[test]
    fn dilate_empty_stays_empty() {
        let empty = Mask::new(12, 8);
        assert_eq!(dilate(&empty, 3, 40), empty);
    }

    #[test]
    fn zero_iterations_is_identity() {
        let mask = square(10, 3, 3, 2);
        assert_eq!(dilate(&mask, 3, 0), mask);
        assert_eq!(erode(&mask, 3, 0), mask);
    }

    #[test]
    fn kernel_size_one_is_identity() {
        let mask = square(10, 3, 3, 2);
        assert_eq!(open(&mask, 1), mask);
    }

    #[test]
    fn open_removes_small_blobs_and_keeps_large() {
        let mask = Mask::from_fn(60, 60, |x, y| {
            let speck = (50..52).contains(&x) && (50..52).contains(&y);
            let block = x < 40 && y < 40;
            speck || block
        });
        let opened = open(&mask, 7);
        assert!(!opened.is_set(50, 50));
        assert_eq!(opened, Mask::from_fn(60, 60, |x, y| x < 40 && y < 40));
    }

    #[test]
    fn open_with_kernel_larger_than_image_keeps_full_mask() {
        let full = Mask::filled(10, 6);
        assert_eq!(open(&full, 35), full);
    }

    #[test]
    fn radius_beyond_image_saturates() {
        let mask = square(8, 0, 0, 1);
        assert_eq!(dilate(&mask, 3, 1000), Mask::filled(8, 8));
        let almost = Mask::from_fn(8, 8, |x, y| !(x == 7 && y == 7));
        assert_eq!(erode(&almost, 3, 1000), Mask::new(8, 8));
    }
}
