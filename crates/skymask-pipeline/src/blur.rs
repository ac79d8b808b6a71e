//! Gaussian blur for noise reduction before edge detection.
//!
//! Unlike [`imageproc::filter::gaussian_blur_f32`], which sizes its
//! kernel from sigma, the edge stage needs a kernel of a fixed side
//! length with sigma optionally derived from that length. The kernel is
//! handed to [`imageproc::filter::separable_filter_equal`] on a float
//! copy of the image padded by mirroring without repeating the edge pixel
//! (`dcb|abcd|cba`), so `imageproc`'s clamped border never comes into
//! play.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Binomial kernels used for small sizes when sigma is derived.
const SMALL_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[
        0.031_25, 0.109_375, 0.218_75, 0.281_25, 0.218_75, 0.109_375, 0.031_25,
    ],
];

/// Sigma derived from a kernel side length, used when the caller passes
/// a non-positive sigma.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn derived_sigma(size: u32) -> f32 {
    0.3f32.mul_add((size as f32 - 1.0).mul_add(0.5, -1.0), 0.8)
}

/// Build a normalized 1-D Gaussian kernel of odd length `size`.
///
/// With `sigma <= 0` the sigma comes from [`derived_sigma`], and sizes
/// 1, 3, 5 and 7 use the binomial tables (`[1 4 6 4 1] / 16` for 5).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let size = size.max(1) | 1;
    if sigma <= 0.0 {
        if let Some(table) = SMALL_KERNELS.get((size / 2) as usize) {
            return table.to_vec();
        }
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        derived_sigma(size)
    };
    let radius = (size / 2) as f32;
    let scale = -0.5 / (sigma * sigma);
    let raw: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - radius;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / sum).collect()
}

/// Apply a `kernel_size` x `kernel_size` Gaussian blur to a grayscale
/// image.
///
/// `sigma <= 0` derives sigma from the kernel size. A kernel size of 1
/// returns the image unchanged.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, kernel_size: u32, sigma: f32) -> GrayImage {
    let kernel = gaussian_kernel(kernel_size, sigma);
    if kernel.len() == 1 {
        return image.clone();
    }

    let radius = u32::try_from(kernel.len() / 2).unwrap_or(u32::MAX);
    let filtered = separable_filter_equal(&pad_reflect_101(image, radius), kernel.as_slice());

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([round_to_u8(filtered.get_pixel(x + radius, y + radius).0[0])])
    })
}

/// Float copy of `image` with `radius` mirrored pixels on every side.
#[allow(clippy::cast_possible_truncation)]
fn pad_reflect_101(image: &GrayImage, radius: u32) -> FloatImage {
    let (width, height) = image.dimensions();
    let pad = radius.saturating_mul(2);
    FloatImage::from_fn(
        width.saturating_add(pad),
        height.saturating_add(pad),
        |x, y| {
            let sx = reflect_101(x as usize, radius as usize, width as usize);
            let sy = reflect_101(y as usize, radius as usize, height as usize);
            Luma([f32::from(image.get_pixel(sx as u32, sy as u32).0[0])])
        },
    )
}

/// Map the padded index `i - radius` into `0..len` by mirroring without
/// repeating the border sample.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn reflect_101(i: usize, radius: usize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut p = i as isize - radius as isize;
    loop {
        if p < 0 {
            p = -p;
        } else if p > last {
            p = 2 * last - p;
        } else {
            return p as usize;
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_to_u8(value: f32) -> u8 {
    (value + 0.5).floor().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a test image with a sharp black-to-white boundary at x=5.
    fn sharp_edge_image() -> GrayImage {
        GrayImage::from_fn(10, 10, |x, _y| {
            if x < 5 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        })
    }

    #[test]
    fn derived_sigma_for_five_tap_kernel() {
        assert!((derived_sigma(5) - 1.1).abs() < 1e-6);
    }

    #[test]
    fn five_tap_kernel_is_binomial() {
        let kernel = gaussian_kernel(5, 0.0);
        assert_eq!(kernel, vec![0.0625, 0.25, 0.375, 0.25, 0.0625]);
    }

    #[test]
    fn explicit_sigma_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(9, 2.0);
        assert_eq!(kernel.len(), 9);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for i in 0..4 {
            assert!((kernel[i] - kernel[8 - i]).abs() < 1e-7);
        }
        assert!(kernel[4] > kernel[3]);
    }

    #[test]
    fn large_derived_kernel_uses_gaussian_formula() {
        let kernel = gaussian_kernel(11, 0.0);
        assert_eq!(kernel.len(), 11);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn kernel_size_one_returns_identical_image() {
        let img = sharp_edge_image();
        assert_eq!(gaussian_blur(&img, 1, 0.0), img);
    }

    #[test]
    fn output_dimensions_preserved() {
        let img = GrayImage::new(17, 31);
        let blurred = gaussian_blur(&img, 5, 0.0);
        assert_eq!(blurred.width(), 17);
        assert_eq!(blurred.height(), 31);
    }

    #[test]
    fn uniform_image_unchanged_by_blur() {
        for v in [0u8, 20, 128, 255] {
            let img = GrayImage::from_pixel(10, 10, image::Luma([v]));
            assert_eq!(gaussian_blur(&img, 5, 0.0), img, "level {v}");
        }
    }

    #[test]
    fn blur_matches_binomial_weights_across_step() {
        // Rows 0..=4 white, rows 5.. black: a horizontal step.
        let img = GrayImage::from_fn(6, 10, |_, y| image::Luma([if y < 5 { 255 } else { 0 }]));
        let blurred = gaussian_blur(&img, 5, 0.0);
        let column: Vec<u8> = (0..10).map(|y| blurred.get_pixel(2, y).0[0]).collect();
        // 255 * 15/16, 255 * 11/16, 255 * 5/16, 255 * 1/16, rounded.
        assert_eq!(&column[2..8], &[255, 239, 175, 80, 16, 0]);
    }

    #[test]
    fn blur_smooths_sharp_edge() {
        let img = sharp_edge_image();
        let blurred = gaussian_blur(&img, 5, 0.0);
        assert!(blurred.get_pixel(4, 5).0[0] > 0);
        assert!(blurred.get_pixel(5, 5).0[0] < 255);
    }

    #[test]
    fn border_mirrors_without_repeating_edge_pixel() {
        // Column 0 sees padded samples 2, 1 | 0, 1, 2 = 0, 100 | 0, 100, 0.
        // A clamped border would see 0, 0 | 0, 100, 0 and give 25.
        // Column 1 sees 100, 0 | 100, 0, 0: 6.25 + 37.5 rounds to 44.
        let img = GrayImage::from_fn(6, 1, |x, _| image::Luma([if x == 1 { 100 } else { 0 }]));
        let blurred = gaussian_blur(&img, 5, 0.0);
        assert_eq!(blurred.get_pixel(0, 0).0[0], 50);
        assert_eq!(blurred.get_pixel(1, 0).0[0], 44);
    }

    #[test]
    fn tiny_images_blur_without_panicking() {
        for (w, h) in [(1, 1), (2, 1), (1, 3), (2, 2)] {
            let img = GrayImage::from_pixel(w, h, image::Luma([77]));
            assert_eq!(gaussian_blur(&img, 7, 0.0), img, "{w}x{h}");
        }
    }

    #[test]
    fn reflect_101_mirrors_without_repeating_border() {
        // len 4, radius 2: padded indices -2, -1 map to 2, 1; 4, 5 map to 2, 1.
        assert_eq!(reflect_101(0, 2, 4), 2);
        assert_eq!(reflect_101(1, 2, 4), 1);
        assert_eq!(reflect_101(2, 2, 4), 0);
        assert_eq!(reflect_101(5, 2, 4), 3);
        assert_eq!(reflect_101(6, 2, 4), 2);
        assert_eq!(reflect_101(7, 2, 4), 1);
    }

    #[test]
    fn reflect_101_handles_tiny_images() {
        assert_eq!(reflect_101(0, 3, 1), 0);
        for i in 0..7 {
            assert!(reflect_101(i, 3, 2) < 2);
        }
    }
}
