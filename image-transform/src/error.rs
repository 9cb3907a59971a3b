/// Errors raised while building, inverting or applying image transforms.
#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    /// The matrix determinant is too close to zero to invert.
    #[error("Singular 3x3 matrix (determinant {determinant:e})")]
    SingularMatrix { determinant: f64 },

    /// A transform matrix was not 3x3.
    #[error("Transform matrix must be 3x3, got shape {0:?}")]
    InvalidMatrixShape(Vec<usize>),

    /// Image decoding or encoding failed.
    #[error("Image I/O failed: {0}")]
    Image(#[from] image::ImageError),

    /// A path could not be represented as UTF-8.
    #[error("Failed to convert path to string {0}")]
    PathEncoding(String),
}
