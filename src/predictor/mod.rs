//! Inference front end for the recognition network.
//!
//! [`TextRecognizer`] loads a checkpoint, preprocesses word crops, runs the
//! network in inference mode and decodes the class scores into text.

/// Text recognizer combining preprocessing, the network and label decoding
pub mod text_recognizer;

pub use text_recognizer::{LabelConverter, TextRecognizer};
