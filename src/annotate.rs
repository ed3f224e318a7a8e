use crate::types::{Detection, PlateCandidate, SpotBounds};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

const LINE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const DETECTION_COLOR: Rgb<u8> = Rgb([0, 128, 255]);
const SELECTED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const PLATE_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const JPEG_QUALITY: u8 = 85;

pub struct Overlay<'a> {
    pub bounds: &'a SpotBounds,
    pub detections: &'a [Detection],
    pub vehicle: Option<&'a Detection>,
    pub plate: Option<&'a PlateCandidate>,
}

/// Draws the spot lines and boxes over a copy of `image`, returning JPEG.
pub fn annotate(image: &DynamicImage, overlay: &Overlay) -> Result<Vec<u8>, image::ImageError> {
    let mut canvas = image.to_rgb8();
    let height = canvas.height() as f32;

    for x in &[overlay.bounds.x_left(), overlay.bounds.x_right()] {
        let x = *x as f32;
        draw_line_segment_mut(&mut canvas, (x, 0.0), (x, height), LINE_COLOR);
    }
    for detection in overlay.detections {
        let (x_min, y_min, x_max, y_max) = detection.corners();
        draw_box(&mut canvas, (x_min, y_min, x_max, y_max), DETECTION_COLOR, 1);
    }
    if let Some(vehicle) = overlay.vehicle {
        draw_box(&mut canvas, vehicle.corners(), SELECTED_COLOR, 3);
    }
    if let Some(plate) = overlay.plate {
        draw_box(&mut canvas, plate.bounding_box, PLATE_COLOR, 2);
    }

    let mut out = Vec::new();
    DynamicImage::ImageRgb8(canvas).write_to(&mut out, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
    Ok(out)
}

/// Box clipped to the canvas; boxes wholly outside it are skipped.
fn draw_box(
    canvas: &mut RgbImage,
    (x_min, y_min, x_max, y_max): (f64, f64, f64, f64),
    color: Rgb<u8>,
    thickness: i32,
) {
    let (w, h) = (f64::from(canvas.width()), f64::from(canvas.height()));
    let x_min = x_min.max(0.0).floor();
    let y_min = y_min.max(0.0).floor();
    let x_max = x_max.min(w - 1.0).ceil();
    let y_max = y_max.min(h - 1.0).ceil();
    if !(x_min < x_max && y_min < y_max) {
        return;
    }
    for t in 0..thickness {
        let width = (x_max - x_min) as i32 - 2 * t;
        let height = (y_max - y_min) as i32 - 2 * t;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect =
            Rect::at(x_min as i32 + t, y_min as i32 + t).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}
