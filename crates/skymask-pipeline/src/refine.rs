//! Final cleanup of the sky mask.

use crate::types::Mask;

/// Morphological opening with a `kernel_size` square: drops specks and
/// thin spurs narrower than the square and smooths the boundary.
#[must_use = "returns the refined mask"]
pub fn refine(sky: &Mask, kernel_size: u32) -> Mask {
    crate::morphology::open(sky, kernel_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PipelineConfig;

    const KERNEL: u32 = PipelineConfig::DEFAULT_OPEN_KERNEL_SIZE;

    #[test]
    fn large_top_region_survives() {
        let sky = Mask::from_fn(100, 100, |_, y| y < 50);
        assert_eq!(refine(&sky, KERNEL), sky);
    }

    #[test]
    fn isolated_speck_is_removed() {
        let sky = Mask::from_fn(100, 100, |x, y| y < 50 || (x == 70 && y == 80));
        assert_eq!(refine(&sky, KERNEL), Mask::from_fn(100, 100, |_, y| y < 50));
    }

    #[test]
    fn narrow_spur_is_removed() {
        // A 10 px wide column hanging from a wide band.
        let sky = Mask::from_fn(100, 100, |x, y| y < 40 || ((45..55).contains(&x) && y < 80));
        assert_eq!(refine(&sky, KERNEL), Mask::from_fn(100, 100, |_, y| y < 40));
    }

    #[test]
    fn region_smaller_than_kernel_vanishes() {
        let sky = Mask::from_fn(100, 100, |x, y| (40..70).contains(&x) && (40..70).contains(&y));
        assert_eq!(refine(&sky, KERNEL).count_set(), 0);
    }

    #[test]
    fn full_and_empty_are_fixed_points() {
        assert_eq!(refine(&Mask::filled(20, 20), KERNEL), Mask::filled(20, 20));
        assert_eq!(refine(&Mask::new(20, 20), KERNEL), Mask::new(20, 20));
    }
}
