use std::f64::consts::FRAC_PI_2;

use image_transform::similarity::{SimilarityParams, NUM_PARAMETERS};

use crate::error::RegistrationError;
use crate::random::RandomSource;
use crate::utils::clamp;

/// Closed search interval of every transform parameter, in (sx, sy, theta, tx, ty) order.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchBounds {
    pub min: [f64; NUM_PARAMETERS],
    pub max: [f64; NUM_PARAMETERS],
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            min: [0.1, 0.1, -FRAC_PI_2, -150.0, -150.0],
            max: [2.0, 2.0, FRAC_PI_2, 150.0, 150.0],
        }
    }
}

impl SearchBounds {
    pub fn new(min: [f64; NUM_PARAMETERS], max: [f64; NUM_PARAMETERS]) -> SearchBounds {
        SearchBounds { min, max }
    }

    /// Scales must stay strictly positive so every candidate matrix is invertible.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        for i in 0..NUM_PARAMETERS {
            if !(self.min[i] <= self.max[i]) {
                return Err(RegistrationError::InvalidParameter(format!(
                    "bound {} has min {} above max {}",
                    i, self.min[i], self.max[i]
                )));
            }
        }
        if self.min[0] <= 0.0 || self.min[1] <= 0.0 {
            return Err(RegistrationError::InvalidParameter(
                "scale bounds must exclude zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn clamp_component(&self, index: usize, value: f64) -> f64 {
        clamp(value, self.min[index], self.max[index])
    }

    pub fn clamp(&self, params: &SimilarityParams) -> SimilarityParams {
        let mut values = params.to_array();
        for (i, v) in values.iter_mut().enumerate() {
            *v = self.clamp_component(i, *v);
        }
        SimilarityParams::from_array(values)
    }

    pub fn contains(&self, params: &SimilarityParams) -> bool {
        params
            .to_array()
            .iter()
            .enumerate()
            .all(|(i, v)| *v >= self.min[i] && *v <= self.max[i])
    }

    /// Draws every component uniformly within its interval.
    pub fn sample<R: RandomSource + ?Sized>(&self, rng: &mut R) -> SimilarityParams {
        let mut values = [0.0; NUM_PARAMETERS];
        for (i, v) in values.iter_mut().enumerate() {
            *v = self.min[i] + (self.max[i] - self.min[i]) * rng.uniform();
        }
        SimilarityParams::from_array(values)
    }
}
