//! Image preprocessing for the recognition network.
//!
//! Word crops are resized to the network input size, converted to grayscale
//! (ITU-R 601-2 luma) or RGB, and normalised to `[-1, 1]` as
//! `(x / 255 - 0.5) / 0.5`.

use candle_core::{Device, Tensor};
use image::imageops::{self, FilterType};
use image::RgbImage;
use rayon::prelude::*;

use crate::core::{OCRError, ProcessingStage};
use crate::models::RecognitionModelConfig;
use crate::utils::{candle_to_ocr_processing, rgb_to_gray};

#[inline]
fn normalize_pixel(value: u8) -> f32 {
    (value as f32 / 255.0 - 0.5) / 0.5
}

/// Resizes and normalises word crops into a `[B, C, img_h, img_w]` batch.
#[derive(Debug, Clone)]
pub struct RecognitionPreprocessor {
    img_h: u32,
    img_w: u32,
    input_channel: usize,
    /// Keep the aspect ratio and pad on the right by replicating the last column.
    keep_ratio_with_pad: bool,
}

impl RecognitionPreprocessor {
    /// Creates a preprocessor.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a dimension is zero or `input_channel`
    /// is neither 1 (grayscale) nor 3 (RGB).
    pub fn new(
        img_h: usize,
        img_w: usize,
        input_channel: usize,
        keep_ratio_with_pad: bool,
    ) -> Result<Self, OCRError> {
        if input_channel != 1 && input_channel != 3 {
            return Err(OCRError::config_error_with_context(
                "input_channel",
                &input_channel.to_string(),
                "only 1 (grayscale) and 3 (RGB) channels are supported",
            ));
        }
        if img_h == 0 || img_w == 0 {
            return Err(OCRError::config_error(format!(
                "image size must be non-zero, got {}x{}",
                img_h, img_w
            )));
        }
        Ok(Self {
            img_h: img_h as u32,
            img_w: img_w as u32,
            input_channel,
            keep_ratio_with_pad,
        })
    }

    /// Creates a preprocessor matching the model input of `config`.
    pub fn from_config(
        config: &RecognitionModelConfig,
        keep_ratio_with_pad: bool,
    ) -> Result<Self, OCRError> {
        Self::new(
            config.img_h,
            config.img_w,
            config.input_channel,
            keep_ratio_with_pad,
        )
    }

    /// Width the image content is resized to before padding.
    fn content_width(&self, width: u32, height: u32) -> u32 {
        if !self.keep_ratio_with_pad {
            return self.img_w;
        }
        let ratio = width as f32 / height as f32;
        let resized = (self.img_h as f32 * ratio).ceil() as u32;
        resized.clamp(1, self.img_w)
    }

    fn write_normalized(&self, img: &RgbImage, out: &mut [f32]) {
        let (h, w) = (self.img_h, self.img_w);
        let content_w = self.content_width(img.width(), img.height());
        let plane = (h * w) as usize;

        if self.input_channel == 1 {
            let gray = rgb_to_gray(img);
            let resized = imageops::resize(&gray, content_w, h, FilterType::CatmullRom);
            for y in 0..h {
                for x in 0..w {
                    let pixel = resized.get_pixel(x.min(content_w - 1), y);
                    out[(y * w + x) as usize] = normalize_pixel(pixel[0]);
                }
            }
        } else {
            let resized = imageops::resize(img, content_w, h, FilterType::CatmullRom);
            for y in 0..h {
                for x in 0..w {
                    let pixel = resized.get_pixel(x.min(content_w - 1), y);
                    for c in 0..3 {
                        out[c * plane + (y * w + x) as usize] = normalize_pixel(pixel[c]);
                    }
                }
            }
        }
    }

    /// Preprocesses a batch of images into a tensor on `device`.
    ///
    /// # Errors
    ///
    /// Returns `OCRError::InvalidInput` for an empty batch or an empty image.
    pub fn apply(&self, images: &[RgbImage], device: &Device) -> Result<Tensor, OCRError> {
        if images.is_empty() {
            return Err(OCRError::invalid_input("no images to preprocess"));
        }
        if let Some((i, img)) = images
            .iter()
            .enumerate()
            .find(|(_, img)| img.width() == 0 || img.height() == 0)
        {
            return Err(OCRError::invalid_input(format!(
                "image {} has zero size ({}x{})",
                i,
                img.width(),
                img.height()
            )));
        }

        let batch_size = images.len();
        let image_size = self.input_channel * (self.img_h * self.img_w) as usize;
        let mut data = vec![0.0f32; batch_size * image_size];

        if batch_size == 1 {
            self.write_normalized(&images[0], &mut data);
        } else {
            data.par_chunks_mut(image_size)
                .zip(images.par_iter())
                .for_each(|(out, img)| self.write_normalized(img, out));
        }

        Tensor::from_vec(
            data,
            (
                batch_size,
                self.input_channel,
                self.img_h as usize,
                self.img_w as usize,
            ),
            device,
        )
        .map_err(|e| {
            candle_to_ocr_processing(ProcessingStage::Normalization, "build image batch", e)
        })
    }
}
