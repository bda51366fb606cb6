//! The core module of the recognition network.
//!
//! This module contains the fundamental components shared by every stage:
//! - Configuration validation
//! - Constants (default hyperparameters, special token ids)
//! - Error handling

pub mod config;
pub mod constants;
pub mod errors;

pub use config::{ConfigError, ConfigValidator, ConfigValidatorExt};
pub use constants::*;
pub use errors::{OCRError, ProcessingStage};

/// Convenient result alias for recognition operations.
pub type OcrResult<T> = Result<T, OCRError>;
