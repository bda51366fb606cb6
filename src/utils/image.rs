//! Utility functions for image loading and conversion.
//!
//! Recognition models consume either single-channel (grayscale) or
//! three-channel (RGB) crops; these helpers load images from disk and convert
//! between the two.

use crate::core::OCRError;
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use std::path::Path;

/// Converts a DynamicImage to an RgbImage.
pub fn dynamic_to_rgb(img: DynamicImage) -> RgbImage {
    img.to_rgb8()
}

/// Converts an RgbImage to grayscale with the ITU-R 601-2 luma weights
/// (`0.299 R + 0.587 G + 0.114 B`), rounded the way PIL's `convert("L")` does.
///
/// `image`'s own `to_luma8` uses Rec. 709 weights, which shifts the inputs
/// away from what grayscale checkpoints were trained on.
pub fn rgb_to_gray(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0;
        let luma = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
        Luma([luma as u8])
    })
}

/// Loads an image from a file path and converts it to RgbImage.
///
/// # Errors
///
/// Returns `OCRError::ImageLoad` if the image cannot be opened or decoded.
pub fn load_image(path: &Path) -> Result<RgbImage, OCRError> {
    let img = image::open(path).map_err(OCRError::ImageLoad)?;
    Ok(dynamic_to_rgb(img))
}

/// Loads a batch of images from file paths.
///
/// Stops at the first image that fails to load.
pub fn load_images<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<RgbImage>, OCRError> {
    paths.iter().map(|p| load_image(p.as_ref())).collect()
}
