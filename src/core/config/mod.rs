//! Configuration validation for the recognition network.
//!
//! Model hyperparameters live next to the model in
//! [`crate::models::recognition::RecognitionModelConfig`]; this module holds the
//! shared error type and validation traits.

pub mod errors;

pub use errors::{ConfigError, ConfigValidator, ConfigValidatorExt};
