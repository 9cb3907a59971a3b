use image::{Rgb, RgbImage};
use itertools::Itertools;
use ndarray::{Array1, Array2, Axis};

use crate::metric::overlap_region;

/// Default number of gray-level bins per image.
pub const NUM_BINS: usize = 32;

/// Probabilities at or below this value are left out of the MI sum.
pub const PROBABILITY_EPSILON: f64 = 1e-10;

/// Gray level (integer channel mean) of a pixel mapped to one of `num_bins` bins.
pub fn quantize(pixel: &Rgb<u8>, num_bins: usize) -> usize {
    let gray = (pixel[0] as usize + pixel[1] as usize + pixel[2] as usize) / 3;
    (gray * num_bins / 256).min(num_bins - 1)
}

/// Co-occurrence counts of (reference bin, warped bin) over an overlap region.
#[derive(Clone, Debug, PartialEq)]
pub struct JointHistogram {
    counts: Array2<u64>,
    total: u64,
}

impl JointHistogram {
    pub fn new(num_bins: usize) -> JointHistogram {
        JointHistogram {
            counts: Array2::zeros((num_bins, num_bins)),
            total: 0,
        }
    }

    /// Counts every pixel of the overlap of `reference` and `warped`.
    pub fn from_images(reference: &RgbImage, warped: &RgbImage, num_bins: usize) -> JointHistogram {
        let mut histogram = JointHistogram::new(num_bins);
        let (width, height) = overlap_region(reference, warped);
        (0..height)
            .cartesian_product(0..width)
            .for_each(|(y, x)| {
                let a = quantize(reference.get_pixel(x, y), num_bins);
                let b = quantize(warped.get_pixel(x, y), num_bins);
                histogram.add(a, b);
            });
        histogram
    }

    pub fn add(&mut self, reference_bin: usize, warped_bin: usize) {
        self.counts[[reference_bin, warped_bin]] += 1;
        self.total += 1;
    }

    pub fn num_bins(&self) -> usize {
        self.counts.nrows()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    /// Joint probabilities pAB; all zeros for an empty histogram.
    pub fn joint_probabilities(&self) -> Array2<f64> {
        if self.total == 0 {
            return Array2::zeros(self.counts.raw_dim());
        }
        let total = self.total as f64;
        self.counts.mapv(|c| c as f64 / total)
    }

    /// Mutual information in bits.
    pub fn mutual_information(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let p_ab = self.joint_probabilities();
        let p_a: Array1<f64> = p_ab.sum_axis(Axis(1));
        let p_b: Array1<f64> = p_ab.sum_axis(Axis(0));

        p_ab.indexed_iter()
            .filter(|&((i, j), &p)| {
                p > PROBABILITY_EPSILON && p_a[i] > PROBABILITY_EPSILON && p_b[j] > PROBABILITY_EPSILON
            })
            .map(|((i, j), &p)| p * (p / (p_a[i] * p_b[j])).log2())
            .sum()
    }
}

/// Mutual information between `reference` and `warped`; 0.0 for an empty overlap.
pub fn mutual_information(reference: &RgbImage, warped: &RgbImage, num_bins: usize) -> f64 {
    JointHistogram::from_images(reference, warped, num_bins).mutual_information()
}
