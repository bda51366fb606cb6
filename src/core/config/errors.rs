//! Configuration error types and validation traits.

use std::path::Path;
use thiserror::Error;

use crate::core::errors::OCRError;

/// Errors that can occur during configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error indicating that a weights or dictionary path does not exist.
    #[error("model path does not exist: {path}")]
    ModelPathNotFound { path: std::path::PathBuf },

    /// Error indicating that a configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// A trait for validating configuration parameters.
///
/// Implementors provide [`validate`](ConfigValidator::validate) and
/// [`get_defaults`](ConfigValidator::get_defaults); the remaining methods are
/// reusable checks for the individual fields.
pub trait ConfigValidator {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Returns the default configuration.
    fn get_defaults() -> Self
    where
        Self: Sized;

    /// Validates a model path.
    ///
    /// This method checks that the path exists and is a file.
    fn validate_model_path(&self, path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            Err(ConfigError::ModelPathNotFound {
                path: path.to_path_buf(),
            })
        } else if !path.is_file() {
            Err(ConfigError::InvalidConfig {
                message: format!("Model path is not a file: {}", path.display()),
            })
        } else {
            Ok(())
        }
    }

    /// Validates a usize value is positive.
    fn validate_positive_usize(&self, value: usize, field_name: &str) -> Result<(), ConfigError> {
        if value == 0 {
            Err(ConfigError::InvalidConfig {
                message: format!("{} must be greater than 0, got {}", field_name, value),
            })
        } else {
            Ok(())
        }
    }

    /// Validates a usize value is at least `min`.
    fn validate_min_usize(
        &self,
        value: usize,
        min: usize,
        field_name: &str,
    ) -> Result<(), ConfigError> {
        if value < min {
            Err(ConfigError::InvalidConfig {
                message: format!("{} must be at least {}, got {}", field_name, min, value),
            })
        } else {
            Ok(())
        }
    }

    /// Validates a usize value is a multiple of `divisor`.
    fn validate_multiple_of(
        &self,
        value: usize,
        divisor: usize,
        field_name: &str,
    ) -> Result<(), ConfigError> {
        if divisor == 0 || value % divisor != 0 {
            Err(ConfigError::InvalidConfig {
                message: format!(
                    "{} must be a multiple of {}, got {}",
                    field_name, divisor, value
                ),
            })
        } else {
            Ok(())
        }
    }
}

/// Extension trait for ConfigValidator that wraps validation errors into [`OCRError`].
pub trait ConfigValidatorExt: ConfigValidator {
    /// Validates configuration and wraps any errors into `OCRError::ConfigError`.
    fn validate_and_wrap_ocr_error(self) -> Result<Self, OCRError>
    where
        Self: Sized,
    {
        self.validate().map_err(|e| OCRError::ConfigError {
            message: e.to_string(),
        })?;
        Ok(self)
    }
}

impl<T: ConfigValidator> ConfigValidatorExt for T {}
