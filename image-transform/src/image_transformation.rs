use image::RgbImage;
use rand::Rng;

use crate::error::TransformError;
use crate::resample::warp;
use crate::similarity::SimilarityParams;

pub(crate) fn create_temporary_tiff_file_path() -> Result<String, TransformError> {
    let temporary_output_dir = std::env::temp_dir();
    let mut temporary_file_name: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    temporary_file_name.push_str(".tiff");
    let temporary_path = temporary_output_dir.as_path().join(temporary_file_name);

    // Possibility that Windows utf-16 paths contain data that cannot be
    // re-encoded to utf-8:
    // https://github.com/rust-lang/rust/issues/12056
    let path_string = temporary_path
        .clone()
        .into_os_string()
        .into_string()
        .map_err(|_| TransformError::PathEncoding(temporary_path.display().to_string()))?;

    Ok(path_string)
}

/// Decodes any supported image file into an 8-bit RGB grid.
pub fn load_rgb_image(path: &str) -> Result<RgbImage, TransformError> {
    Ok(image::open(path)?.into_rgb8())
}

/// Encodes `image` with the codec implied by the extension of `path`.
pub fn save_image(image: &RgbImage, path: &str) -> Result<(), TransformError> {
    image.save(path)?;
    Ok(())
}

pub fn image_similarity_transform(
    image_path: &str,
    optional_output_path: Option<String>,
    params: &SimilarityParams,
) -> Result<String, TransformError> {
    /* Applies a similarity transform to the image from the same image path.
       Outputs the path to the transformed image on disk if successful.
       The output has the same dimensions as the input; pixels that map from
       outside the source image are black.

       Args:
          image_path: Path to the image
          optional_output_path: A path to write the transformed image to. If no value is provided
            it will be written to a temporary directory as provided by the OS's APIs.
          params: scale, rotation (radians) and translation of the forward transform
    */
    let image = load_rgb_image(image_path)?;
    let warped_image = warp(&image, &params.to_matrix())?;
    let output_path = match optional_output_path {
        Some(result) => result,
        None => create_temporary_tiff_file_path()?,
    };

    save_image(&warped_image, &output_path)?;

    Ok(output_path)
}
