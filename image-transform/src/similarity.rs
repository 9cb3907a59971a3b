use std::fmt;

use ndarray::{arr2, Array2};

use crate::error::TransformError;

/// Number of scalar parameters in a similarity transform: sx, sy, theta, tx, ty.
pub const NUM_PARAMETERS: usize = 5;

/// Determinants with a smaller magnitude are treated as singular.
pub const SINGULAR_EPSILON: f64 = 1e-15;

/// Scale, rotation (radians) and translation (pixels) of a 2D similarity transform.
#[derive(PartialEq, PartialOrd, Debug, Clone, Copy)]
pub struct SimilarityParams {
    pub sx: f64,
    pub sy: f64,
    pub theta: f64,
    pub tx: f64,
    pub ty: f64,
}

impl SimilarityParams {
    pub fn new(sx: f64, sy: f64, theta: f64, tx: f64, ty: f64) -> SimilarityParams {
        SimilarityParams {
            sx,
            sy,
            theta,
            tx,
            ty,
        }
    }

    pub fn identity() -> SimilarityParams {
        SimilarityParams::new(1.0, 1.0, 0.0, 0.0, 0.0)
    }

    pub fn from_array(values: [f64; NUM_PARAMETERS]) -> SimilarityParams {
        let [sx, sy, theta, tx, ty] = values;
        SimilarityParams::new(sx, sy, theta, tx, ty)
    }

    pub fn to_array(self) -> [f64; NUM_PARAMETERS] {
        [self.sx, self.sy, self.theta, self.tx, self.ty]
    }

    pub fn to_matrix(self) -> Array2<f64> {
        similarity_matrix(self.sx, self.sy, self.theta, self.tx, self.ty)
    }
}

impl Default for SimilarityParams {
    fn default() -> Self {
        SimilarityParams::identity()
    }
}

impl fmt::Display for SimilarityParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[sx={:.4}, sy={:.4}, theta={:.4}, tx={:.2}, ty={:.2}]",
            self.sx, self.sy, self.theta, self.tx, self.ty
        )
    }
}

/// Homogeneous matrix of a similarity transform.
///
/// ```text
/// [ sx*cos(t)  -sx*sin(t)  tx ]
/// [ sy*sin(t)   sy*cos(t)  ty ]
/// [     0           0       1 ]
/// ```
pub fn similarity_matrix(sx: f64, sy: f64, theta: f64, tx: f64, ty: f64) -> Array2<f64> {
    let (sin, cos) = theta.sin_cos();
    arr2(&[
        [sx * cos, -sx * sin, tx],
        [sy * sin, sy * cos, ty],
        [0.0, 0.0, 1.0],
    ])
}

fn check_shape(matrix: &Array2<f64>) -> Result<(), TransformError> {
    if matrix.shape() != [3, 3] {
        return Err(TransformError::InvalidMatrixShape(matrix.shape().to_vec()));
    }
    Ok(())
}

/// Closed-form inverse of a 3x3 matrix through its cofactors.
pub fn invert_3x3(matrix: &Array2<f64>) -> Result<Array2<f64>, TransformError> {
    check_shape(matrix)?;
    let m = |r: usize, c: usize| matrix[[r, c]];
    let (a, b, c) = (m(0, 0), m(0, 1), m(0, 2));
    let (d, e, f) = (m(1, 0), m(1, 1), m(1, 2));
    let (g, h, i) = (m(2, 0), m(2, 1), m(2, 2));

    let determinant = a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g);
    if determinant.abs() < SINGULAR_EPSILON {
        return Err(TransformError::SingularMatrix { determinant });
    }
    let inv_det = 1.0 / determinant;

    Ok(arr2(&[
        [
            (e * i - f * h) * inv_det,
            (c * h - b * i) * inv_det,
            (b * f - c * e) * inv_det,
        ],
        [
            (f * g - d * i) * inv_det,
            (a * i - c * g) * inv_det,
            (c * d - a * f) * inv_det,
        ],
        [
            (d * h - e * g) * inv_det,
            (b * g - a * h) * inv_det,
            (a * e - b * d) * inv_det,
        ],
    ]))
}

/// Applies `matrix` to the homogeneous point (x, y, 1) and divides by w.
///
/// The matrix is assumed to be 3x3, see [`invert_3x3`] for a checked entry point.
pub fn map_point(matrix: &Array2<f64>, x: f64, y: f64) -> (f64, f64) {
    let xp = matrix[[0, 0]] * x + matrix[[0, 1]] * y + matrix[[0, 2]];
    let yp = matrix[[1, 0]] * x + matrix[[1, 1]] * y + matrix[[1, 2]];
    let w = matrix[[2, 0]] * x + matrix[[2, 1]] * y + matrix[[2, 2]];
    (xp / w, yp / w)
}
