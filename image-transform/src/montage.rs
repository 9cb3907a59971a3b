use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

/// Side length of a montage panel, in pixels.
pub const PANEL_SIZE: u32 = 300;
/// Gap between neighbouring panels and around the border.
pub const PANEL_GAP: u32 = 10;

const BACKGROUND: Rgb<u8> = Rgb([238, 238, 238]);
const OUTLINE: Rgb<u8> = Rgb([0, 0, 0]);
const MISSING: Rgb<u8> = Rgb([200, 30, 30]);

/// Lays panels out row-major in a grid of `columns` columns.
///
/// Each image is resized to a square [`PANEL_SIZE`] panel and outlined;
/// `None` marks a panel whose image is unavailable and is filled red.
pub fn comparison_montage(panels: &[Option<&RgbImage>], columns: u32) -> RgbImage {
    let columns = columns.max(1);
    let rows = (panels.len() as u32).div_ceil(columns).max(1);
    let width = columns * PANEL_SIZE + (columns + 1) * PANEL_GAP;
    let height = rows * PANEL_SIZE + (rows + 1) * PANEL_GAP;
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

    for (index, panel) in panels.iter().enumerate() {
        let (col, row) = (index as u32 % columns, index as u32 / columns);
        let x = PANEL_GAP + col * (PANEL_SIZE + PANEL_GAP);
        let y = PANEL_GAP + row * (PANEL_SIZE + PANEL_GAP);
        let rect = Rect::at(x as i32, y as i32).of_size(PANEL_SIZE, PANEL_SIZE);
        match panel {
            Some(image) if image.width() > 0 && image.height() > 0 => {
                let resized = imageops::resize(*image, PANEL_SIZE, PANEL_SIZE, FilterType::Triangle);
                imageops::replace(&mut canvas, &resized, x as i64, y as i64);
            }
            _ => draw_filled_rect_mut(&mut canvas, rect, MISSING),
        }
        draw_hollow_rect_mut(&mut canvas, rect, OUTLINE);
    }
    canvas
}
