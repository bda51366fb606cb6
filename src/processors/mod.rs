//! Pre- and post-processing around the recognition network.
//!
//! * `normalization` - resizing and normalising word crops into an input batch
//! * `decode` - converting between text and class ids for the CTC and attention heads

mod decode;
mod normalization;

pub use decode::*;
pub use normalization::*;
