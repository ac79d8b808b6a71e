//! Channel reordering and grayscale conversion.
//!
//! The pipeline receives RGB pixels and works internally on B, G, R
//! order. [`to_bgr`] performs that one-time swap at the entry boundary;
//! [`luma`] reduces a BGR image to a single luminance channel.

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::types::{BgrImage, SourceImage};

/// Fixed-point weights (scaled by 2^14) of the BT.601 luma formula
/// `0.299*R + 0.587*G + 0.114*B`. They sum to exactly `1 << 14`, so a
/// neutral gray maps to itself.
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const SHIFT: u32 = 14;
const ROUND: u32 = 1 << (SHIFT - 1);

const _: () = assert!(R_WEIGHT + G_WEIGHT + B_WEIGHT == 1 << SHIFT);

/// Reorder RGB samples to B, G, R (swap channels 0 and 2).
///
/// This is the pipeline's first step after validation.
#[must_use = "returns the reordered image"]
pub fn to_bgr(source: &SourceImage) -> BgrImage {
    let rgb = source.as_rgb();
    BgrImage::from_bgr_buffer(RgbImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Rgb([b, g, r])
    }))
}

/// Convert a BGR image to grayscale with round-half-up fixed-point luma.
#[must_use = "returns the grayscale image"]
pub fn luma(image: &BgrImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [b, g, r] = image.get_pixel(x, y);
        let weighted = u32::from(b) * B_WEIGHT
            + u32::from(g) * G_WEIGHT
            + u32::from(r) * R_WEIGHT
            + ROUND;
        Luma([u8::try_from(weighted >> SHIFT).unwrap_or(u8::MAX)])
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn single_pixel(r: u8, g: u8, b: u8) -> SourceImage {
        SourceImage::new(RgbImage::from_pixel(1, 1, Rgb([r, g, b]))).unwrap()
    }

    #[test]
    fn to_bgr_swaps_red_and_blue() {
        let bgr = to_bgr(&single_pixel(10, 20, 30));
        assert_eq!(bgr.get_pixel(0, 0), [30, 20, 10]);
    }

    #[test]
    fn to_bgr_preserves_dimensions() {
        let source = SourceImage::new(RgbImage::new(17, 31)).unwrap();
        let bgr = to_bgr(&source);
        assert_eq!(bgr.width(), 17);
        assert_eq!(bgr.height(), 31);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn to_rgb_undoes_the_swap() {
        let source = SourceImage::new(RgbImage::from_fn(3, 2, |x, y| {
            Rgb([x as u8, y as u8, 200])
        }))
        .unwrap();
        assert_eq!(&to_bgr(&source).to_rgb(), source.as_rgb());
    }

    #[test]
    fn neutral_gray_is_preserved() {
        for v in [0, 1, 20, 21, 128, 254, 255] {
            let gray = luma(&to_bgr(&single_pixel(v, v, v)));
            assert_eq!(gray.get_pixel(0, 0).0[0], v, "gray level {v}");
        }
    }

    #[test]
    fn luma_weights_follow_bt601() {
        let red = luma(&to_bgr(&single_pixel(255, 0, 0))).get_pixel(0, 0).0[0];
        let green = luma(&to_bgr(&single_pixel(0, 255, 0))).get_pixel(0, 0).0[0];
        let blue = luma(&to_bgr(&single_pixel(0, 0, 255))).get_pixel(0, 0).0[0];
        assert_eq!(red, 76);
        assert_eq!(green, 150);
        assert_eq!(blue, 29);
    }

    #[test]
    fn luma_reads_swapped_channels() {
        // Pure red input must be weighted as red, i.e. the swap and the
        // BGR weights cancel out.
        let bgr = to_bgr(&single_pixel(255, 0, 0));
        assert_eq!(bgr.get_pixel(0, 0), [0, 0, 255]);
        assert_eq!(luma(&bgr).get_pixel(0, 0).0[0], 76);
    }
}
