use image_transform::error::TransformError;

/// Failure of a single registration run.
#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    /// Transform construction, inversion or image I/O failed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// An optimizer or search-bound parameter is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
