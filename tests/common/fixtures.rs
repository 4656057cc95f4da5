//! Image fixtures
//!
//! Pictures are rendered on the fly so their structure is controlled: the brighter
//! variant differs in every byte but its perceptual fingerprint stays within the threshold.

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use std::f64::consts::TAU;
use std::io::Cursor;

fn waves(side: u32, fx: f64, fy: f64, phase: f64, shift: i32) -> DynamicImage {
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

fn png(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("Failed to encode fixture image");
    bytes.into_inner()
}

/// The reference picture
pub fn original_png() -> Vec<u8> {
    png(&waves(64, 1.0, 2.0, 0.3, 0))
}

/// The reference picture, slightly brighter
#[allow(dead_code)]
pub fn brighter_png() -> Vec<u8> {
    png(&waves(64, 1.0, 2.0, 0.3, 6))
}

/// A structurally unrelated picture
#[allow(dead_code)]
pub fn unrelated_png() -> Vec<u8> {
    png(&waves(64, 3.0, 0.5, 2.1, 0))
}
