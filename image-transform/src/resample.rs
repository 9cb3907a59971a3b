use image::{Rgb, RgbImage};
use ndarray::Array2;

use crate::error::TransformError;
use crate::similarity::{invert_3x3, map_point};

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Bilinear interpolation of the 4 pixels surrounding (x, y).
///
/// Coordinates left of 0, above 0, or at/after the last column or row are
/// sampled as black: the last column and row are never used as the
/// top-left neighbour.
pub fn bilinear_sample(image: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (width, height) = image.dimensions();
    // NaN fails every comparison and lands outside.
    let inside =
        x >= 0.0 && y >= 0.0 && x < (width as f64 - 1.0) && y < (height as f64 - 1.0);
    if !inside {
        return BLACK;
    }

    let x1 = x.floor() as u32;
    let y1 = y.floor() as u32;
    let (x2, y2) = (x1 + 1, y1 + 1);
    let wx = x - x1 as f64;
    let wy = y - y1 as f64;

    let c11 = image.get_pixel(x1, y1);
    let c12 = image.get_pixel(x1, y2);
    let c21 = image.get_pixel(x2, y1);
    let c22 = image.get_pixel(x2, y2);

    let mut out = [0u8; 3];
    for (k, channel) in out.iter_mut().enumerate() {
        let value = (1.0 - wx) * (1.0 - wy) * c11[k] as f64
            + (1.0 - wx) * wy * c12[k] as f64
            + wx * (1.0 - wy) * c21[k] as f64
            + wx * wy * c22[k] as f64;
        *channel = (value as i64).clamp(0, 255) as u8;
    }
    Rgb(out)
}

/// Warps `image` by the forward `transform` using inverse mapping.
///
/// The output keeps the input dimensions; every destination pixel is pulled
/// from the source through the inverted matrix.
pub fn warp(image: &RgbImage, transform: &Array2<f64>) -> Result<RgbImage, TransformError> {
    let inverse = invert_3x3(transform)?;
    let (width, height) = image.dimensions();
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let (sx, sy) = map_point(&inverse, x as f64, y as f64);
        bilinear_sample(image, sx, sy)
    }))
}

/// Resizes the canvas to (w*sx, h*sy) and resamples the scaled image.
pub fn scale(image: &RgbImage, sx: f64, sy: f64) -> RgbImage {
    let (width, height) = image.dimensions();
    let new_width = (width as f64 * sx) as u32;
    let new_height = (height as f64 * sy) as u32;
    RgbImage::from_fn(new_width, new_height, |x, y| {
        bilinear_sample(image, x as f64 / sx, y as f64 / sy)
    })
}

/// Rotates about the image centre onto a canvas large enough to hold the result.
pub fn rotate(image: &RgbImage, theta: f64) -> RgbImage {
    let (width, height) = (image.width() as f64, image.height() as f64);
    let (sin, cos) = theta.sin_cos();
    let new_width = (width * cos.abs() + height * sin.abs()).ceil() as u32;
    let new_height = (width * sin.abs() + height * cos.abs()).ceil() as u32;

    let (cx, cy) = (new_width as f64 / 2.0, new_height as f64 / 2.0);
    let (src_cx, src_cy) = (width / 2.0, height / 2.0);

    RgbImage::from_fn(new_width, new_height, |x, y| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let src_x = dx * cos + dy * sin + src_cx;
        let src_y = -dx * sin + dy * cos + src_cy;
        bilinear_sample(image, src_x, src_y)
    })
}

/// Shifts the image content by (dx, dy) on a canvas of the same size.
pub fn translate(image: &RgbImage, dx: f64, dy: f64) -> RgbImage {
    let (width, height) = image.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        bilinear_sample(image, x as f64 - dx, y as f64 - dy)
    })
}
