//! Synthetic images with controllable structure.

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use std::f64::consts::TAU;
use std::io::Cursor;

/// Smooth interference pattern. Coordinates are normalized so different sides render the
/// same picture; `shift` offsets every pixel's brightness.
pub(crate) fn waves(side: u32, fx: f64, fy: f64, phase: f64, shift: i32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(side, side, |x, y| {
        let u = x as f64 / side as f64;
        let v = y as f64 / side as f64;
        let value = 128.0
            + 50.0 * (TAU * fx * u + phase).sin()
            + 40.0 * (TAU * fy * v + phase * 0.5).cos()
            + 20.0 * (TAU * 1.5 * (u + v)).sin();
        Luma([(value.round() as i32 + shift).clamp(0, 255) as u8])
    }))
}

pub(crate) fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, format)
        .expect("encoding an in-memory image");
    bytes.into_inner()
}

/// PNG of the reference picture.
pub(crate) fn original_png() -> Vec<u8> {
    encode(&waves(64, 1.0, 2.0, 0.3, 0), ImageFormat::Png)
}

/// Same picture slightly brighter: different bytes, same structure.
pub(crate) fn brighter_png() -> Vec<u8> {
    encode(&waves(64, 1.0, 2.0, 0.3, 6), ImageFormat::Png)
}

/// Structurally unrelated picture.
pub(crate) fn unrelated_png() -> Vec<u8> {
    encode(&waves(64, 3.0, 0.5, 2.1, 0), ImageFormat::Png)
}
