//! Constants used throughout the recognition network.
//!
//! This module defines default hyperparameters, special token ids, and
//! numerical constants shared between the model stages and label converters.

/// The default character set: digits followed by lowercase latin letters.
///
/// With the CTC blank this yields 37 classes, with the attention `[GO]` and
/// `[s]` tokens it yields 38.
pub const DEFAULT_CHARACTERS: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// Index of the CTC blank label.
pub const CTC_BLANK_INDEX: usize = 0;

/// Index of the attention decoder start token (`[GO]`).
pub const ATTN_GO_INDEX: usize = 0;

/// Index of the attention decoder end token (`[s]`).
pub const ATTN_EOS_INDEX: usize = 1;

/// Textual form of the attention start token.
pub const ATTN_GO_TOKEN: &str = "[GO]";

/// Textual form of the attention end token.
pub const ATTN_EOS_TOKEN: &str = "[s]";

/// Default recognition input height.
pub const DEFAULT_IMG_H: usize = 32;

/// Default recognition input width.
pub const DEFAULT_IMG_W: usize = 100;

/// Minimum input height: every backbone downsamples height by 16 and then
/// applies a 2x2 convolution.
pub const MIN_IMG_H: usize = 32;

/// Minimum input width accepted by every backbone.
pub const MIN_IMG_W: usize = 8;

/// Number of recurrent iterations inside each gated recurrent conv layer.
pub const GRCL_ITERATIONS: usize = 5;

/// Epsilon added inside the TPS radial basis logarithm.
pub const TPS_RBF_EPS: f64 = 1e-6;

/// Epsilon used by every batch-norm layer.
pub const BATCH_NORM_EPS: f64 = 1e-5;
