//! Model stages of the text recognition network.
//!
//! Each stage lives in its own module and is loaded from a `VarBuilder`
//! under the parameter prefix used by the reference checkpoints:
//! - [`transformation`]: TPS spatial transformer (`Transformation.*`)
//! - [`feature_extraction`]: VGG, RCNN and ResNet backbones (`FeatureExtraction.*`)
//! - [`sequence_modeling`]: stacked bidirectional LSTMs (`SequenceModeling.*`)
//! - [`prediction`]: CTC and attention heads (`Prediction.*`)
//!
//! [`recognition`] wires them together.

pub mod feature_extraction;
pub(crate) mod layers;
pub mod prediction;
pub mod recognition;
pub mod sequence_modeling;
pub mod transformation;

pub use recognition::{RecognitionModelConfig, TextRecognitionModel};
