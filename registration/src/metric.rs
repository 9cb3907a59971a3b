use std::cmp::Ordering;
use std::fmt;

use image::RgbImage;
use image_transform::resample::warp;
use image_transform::similarity::SimilarityParams;

use crate::error::RegistrationError;
use crate::mse::mean_squared_error;
use crate::mutual_information::{mutual_information, NUM_BINS};

/// Whether an objective is minimized or maximized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Direction {
    /// Strict improvement of `candidate` over `incumbent`.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Minimize => candidate < incumbent,
            Direction::Maximize => candidate > incumbent,
        }
    }

    /// Ordering that sorts the best fitness first.
    pub fn best_first(self, a: f64, b: f64) -> Ordering {
        match self {
            Direction::Minimize => a.total_cmp(&b),
            Direction::Maximize => b.total_cmp(&a),
        }
    }
}

/// Similarity measure between the reference and the warped moving image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Metric {
    /// Mean per-channel squared difference; lower is better.
    MeanSquaredError,
    /// Mutual information of quantized gray levels, in bits; higher is better.
    MutualInformation { num_bins: usize },
}

impl Metric {
    pub fn mutual_information() -> Metric {
        Metric::MutualInformation { num_bins: NUM_BINS }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Metric::MeanSquaredError => Direction::Minimize,
            Metric::MutualInformation { .. } => Direction::Maximize,
        }
    }

    /// Short label used in reports.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::MeanSquaredError => "MSE",
            Metric::MutualInformation { .. } => "MI",
        }
    }

    /// Fitness of the transform `params` applied to `moving`, compared against `reference`.
    pub fn evaluate(
        &self,
        params: &SimilarityParams,
        reference: &RgbImage,
        moving: &RgbImage,
    ) -> Result<f64, RegistrationError> {
        let warped = warp(moving, &params.to_matrix())?;
        Ok(self.compare(reference, &warped))
    }

    /// Fitness of an already warped image.
    pub fn compare(&self, reference: &RgbImage, warped: &RgbImage) -> f64 {
        match self {
            Metric::MeanSquaredError => mean_squared_error(reference, warped),
            Metric::MutualInformation { num_bins } => {
                mutual_information(reference, warped, *num_bins)
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Width and height of the rectangle shared by both images, anchored at the origin.
pub fn overlap_region(a: &RgbImage, b: &RgbImage) -> (u32, u32) {
    (a.width().min(b.width()), a.height().min(b.height()))
}
