use image::RgbImage;
use itertools::Itertools;

use crate::metric::overlap_region;

/// Mean squared difference over every R, G and B sample of the overlap.
///
/// Returns `f64::MAX` when the images share no pixel.
pub fn mean_squared_error(reference: &RgbImage, warped: &RgbImage) -> f64 {
    let (width, height) = overlap_region(reference, warped);
    let count = 3 * width as u64 * height as u64;
    if count == 0 {
        return f64::MAX;
    }

    let sum_squared_error: u64 = (0..height)
        .cartesian_product(0..width)
        .map(|(y, x)| {
            let a = reference.get_pixel(x, y);
            let b = warped.get_pixel(x, y);
            (0..3)
                .map(|k| {
                    let d = a[k] as i64 - b[k] as i64;
                    (d * d) as u64
                })
                .sum::<u64>()
        })
        .sum();

    sum_squared_error as f64 / count as f64
}
