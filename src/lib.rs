//! # OAR STR
//!
//! A modular scene text recognition network built on Candle.
//!
//! The network has four stages, each picked by a selector string in
//! [`RecognitionModelConfig`](models::RecognitionModelConfig):
//!
//! 1. **Transformation** (`"TPS"` or `"None"`): thin-plate-spline spatial
//!    transformer that rectifies curved or skewed text.
//! 2. **Feature extraction** (`"VGG"`, `"RCNN"`, `"ResNet"`): convolutional
//!    backbone producing a feature map.
//! 3. **Sequence modeling** (`"BiLSTM"` or `"None"`): stacked bidirectional
//!    LSTMs over the width axis.
//! 4. **Prediction** (`"CTC"`, `"Attn"`): per-column classifier or
//!    attention decoder.
//!
//! Unknown transformation and sequence selectors disable their stage; unknown
//! feature extraction and prediction selectors are configuration errors.
//!
//! ## Modules
//!
//! * [`core`] - Error handling, configuration validation and constants
//! * [`models`] - The network stages and the assembled model
//! * [`processors`] - Image preprocessing and label conversion
//! * [`predictor`] - The end-to-end [`TextRecognizer`](predictor::TextRecognizer)
//! * [`utils`] - Image loading, device selection and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oar_str::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RecognitionModelConfig {
//!     transformation: "TPS".to_string(),
//!     feature_extraction: "ResNet".to_string(),
//!     prediction: "Attn".to_string(),
//!     num_class: 38,
//!     ..Default::default()
//! };
//! let device = parse_device("cpu")?;
//! let recognizer = TextRecognizer::from_safetensors(
//!     "models/tps-resnet-bilstm-attn.safetensors",
//!     config,
//!     DEFAULT_CHARACTERS,
//!     device,
//! )?;
//!
//! let image = load_image(Path::new("word.png"))?;
//! for (text, confidence) in recognizer.recognize(&[image])? {
//!     println!("{text} ({confidence:.3})");
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod models;
pub mod predictor;
pub mod processors;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use oar_str::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::constants::DEFAULT_CHARACTERS;
    pub use crate::core::{OCRError, OcrResult};
    pub use crate::models::{RecognitionModelConfig, TextRecognitionModel};
    pub use crate::predictor::TextRecognizer;
    pub use crate::processors::{AttnLabelConverter, CTCLabelDecode, RecognitionPreprocessor};
    pub use crate::utils::{init_tracing, load_image, load_images, parse_device};
}
