//! Recognition network configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::constants::{DEFAULT_IMG_H, DEFAULT_IMG_W, MIN_IMG_H, MIN_IMG_W};
use crate::core::{ConfigError, ConfigValidator, ConfigValidatorExt, OCRError, OcrResult};
use crate::models::feature_extraction::FeatureExtractionKind;
use crate::models::prediction::PredictionKind;
use crate::models::sequence_modeling::SequenceModelingKind;
use crate::models::transformation::TransformationKind;

/// Hyperparameters and stage selectors of the four-stage recognition network.
///
/// Selectors stay strings so checkpoint configs deserialize unchanged; they are
/// parsed into stage kinds when the model is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionModelConfig {
    /// Transformation stage (`"TPS"` or `"None"`)
    #[serde(default = "default_transformation")]
    pub transformation: String,

    /// Feature extraction backbone (`"VGG"`, `"RCNN"` or `"ResNet"`)
    #[serde(default = "default_feature_extraction")]
    pub feature_extraction: String,

    /// Sequence modeling stage (`"BiLSTM"` or `"None"`)
    #[serde(default = "default_sequence_modeling")]
    pub sequence_modeling: String,

    /// Prediction head (`"CTC"` or `"Attn"`)
    #[serde(default = "default_prediction")]
    pub prediction: String,

    /// Number of TPS fiducial points
    #[serde(default = "default_num_fiducial")]
    pub num_fiducial: usize,

    /// Input image height
    #[serde(default = "default_img_h")]
    pub img_h: usize,

    /// Input image width
    #[serde(default = "default_img_w")]
    pub img_w: usize,

    /// Number of image channels (1 for grayscale, 3 for RGB)
    #[serde(default = "default_input_channel")]
    pub input_channel: usize,

    /// Channels of the backbone output
    #[serde(default = "default_output_channel")]
    pub output_channel: usize,

    /// Hidden size of the BiLSTMs and the attention decoder
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,

    /// Number of output classes, special tokens included
    #[serde(default = "default_num_class")]
    pub num_class: usize,

    /// Maximum label length
    #[serde(default = "default_batch_max_length")]
    pub batch_max_length: usize,
}

fn default_transformation() -> String {
    "None".to_string()
}

fn default_feature_extraction() -> String {
    "VGG".to_string()
}

fn default_sequence_modeling() -> String {
    "BiLSTM".to_string()
}

fn default_prediction() -> String {
    "CTC".to_string()
}

fn default_num_fiducial() -> usize {
    20
}

fn default_img_h() -> usize {
    DEFAULT_IMG_H
}

fn default_img_w() -> usize {
    DEFAULT_IMG_W
}

fn default_input_channel() -> usize {
    1
}

fn default_output_channel() -> usize {
    512
}

fn default_hidden_size() -> usize {
    256
}

fn default_num_class() -> usize {
    37 // 36 characters + CTC blank
}

fn default_batch_max_length() -> usize {
    25
}

impl Default for RecognitionModelConfig {
    fn default() -> Self {
        Self {
            transformation: default_transformation(),
            feature_extraction: default_feature_extraction(),
            sequence_modeling: default_sequence_modeling(),
            prediction: default_prediction(),
            num_fiducial: default_num_fiducial(),
            img_h: default_img_h(),
            img_w: default_img_w(),
            input_channel: default_input_channel(),
            output_channel: default_output_channel(),
            hidden_size: default_hidden_size(),
            num_class: default_num_class(),
            batch_max_length: default_batch_max_length(),
        }
    }
}

impl RecognitionModelConfig {
    /// Load and validate configuration from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> OcrResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| OCRError::ConfigError {
            message: format!("Failed to read recognition config from {:?}: {}", path, e),
        })?;
        Self::from_json_str(&content)
    }

    /// Parse configuration from a JSON string. Missing fields take their
    /// defaults; the result is validated before it is returned.
    pub fn from_json_str(json: &str) -> OcrResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| OCRError::ConfigError {
            message: format!("Failed to parse recognition config: {}", e),
        })?;
        config.validate_and_wrap_ocr_error()
    }

    /// The transformation stage, or `None` when it is disabled.
    pub fn transformation_kind(&self) -> Option<TransformationKind> {
        TransformationKind::from_selector(&self.transformation)
    }

    /// The feature extraction backbone.
    pub fn feature_extraction_kind(&self) -> Result<FeatureExtractionKind, OCRError> {
        FeatureExtractionKind::from_selector(&self.feature_extraction)
            .ok_or_else(|| OCRError::config_error("No FeatureExtraction module specified"))
    }

    /// The sequence modeling stage, or `None` when it is disabled.
    pub fn sequence_modeling_kind(&self) -> Option<SequenceModelingKind> {
        SequenceModelingKind::from_selector(&self.sequence_modeling)
    }

    /// The prediction head.
    pub fn prediction_kind(&self) -> Result<PredictionKind, OCRError> {
        PredictionKind::from_selector(&self.prediction)
            .ok_or_else(|| OCRError::config_error("Prediction is neither CTC or Attn"))
    }

    /// Width of the features fed to the prediction head.
    pub fn sequence_output_size(&self) -> usize {
        match self.sequence_modeling_kind() {
            Some(_) => self.hidden_size,
            None => self.output_channel,
        }
    }

    /// Number of attention decoding steps (`batch_max_length` plus `[s]`).
    pub fn num_steps(&self) -> usize {
        self.batch_max_length + 1
    }
}

impl ConfigValidator for RecognitionModelConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_min_usize(self.img_h, MIN_IMG_H, "img_h")?;
        self.validate_min_usize(self.img_w, MIN_IMG_W, "img_w")?;
        self.validate_positive_usize(self.input_channel, "input_channel")?;
        self.validate_positive_usize(self.output_channel, "output_channel")?;
        self.validate_positive_usize(self.hidden_size, "hidden_size")?;
        self.validate_positive_usize(self.num_class, "num_class")?;
        self.validate_positive_usize(self.batch_max_length, "batch_max_length")?;

        if let Some(kind) = FeatureExtractionKind::from_selector(&self.feature_extraction) {
            self.validate_multiple_of(self.output_channel, kind.channel_divisor(), "output_channel")?;
        }

        if self.transformation_kind().is_some() {
            self.validate_min_usize(self.num_fiducial, 4, "num_fiducial")?;
            self.validate_multiple_of(self.num_fiducial, 2, "num_fiducial")?;
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RecognitionModelConfig::default();
        assert_eq!(config.transformation, "None");
        assert_eq!(config.feature_extraction, "VGG");
        assert_eq!(config.sequence_modeling, "BiLSTM");
        assert_eq!(config.prediction, "CTC");
        assert_eq!(config.num_class, 37);
        assert_eq!(config.num_steps(), 26);
        assert!(config.validate().is_ok());
        assert_eq!(RecognitionModelConfig::get_defaults(), config);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = RecognitionModelConfig::from_json_str(
            r#"{"transformation": "TPS", "prediction": "Attn", "num_class": 38}"#,
        )
        .unwrap();
        assert_eq!(config.transformation_kind(), Some(TransformationKind::Tps));
        assert_eq!(config.prediction_kind().unwrap(), PredictionKind::Attn);
        assert_eq!(config.num_class, 38);
        assert_eq!(config.img_w, 100);
        assert_eq!(config.hidden_size, 256);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"feature_extraction": "ResNet", "output_channel": 64}}"#).unwrap();
        let config = RecognitionModelConfig::from_path(file.path()).unwrap();
        assert_eq!(
            config.feature_extraction_kind().unwrap(),
            FeatureExtractionKind::ResNet
        );
        assert_eq!(config.output_channel, 64);
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = RecognitionModelConfig::from_path("/nonexistent/recognition.json").unwrap_err();
        assert!(matches!(err, OCRError::ConfigError { .. }));
    }

    #[test]
    fn test_from_json_str_validates() {
        let err = RecognitionModelConfig::from_json_str(r#"{"img_h": 16}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration: invalid configuration: img_h must be at least 32, got 16"
        );
        assert!(RecognitionModelConfig::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_invalid_selectors() {
        let config = RecognitionModelConfig {
            feature_extraction: "MobileNet".to_string(),
            prediction: "Seq2Seq".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.feature_extraction_kind().unwrap_err().to_string(),
            "configuration: No FeatureExtraction module specified"
        );
        assert_eq!(
            config.prediction_kind().unwrap_err().to_string(),
            "configuration: Prediction is neither CTC or Attn"
        );
    }

    #[test]
    fn test_sequence_output_size_follows_sequence_stage() {
        let mut config = RecognitionModelConfig {
            output_channel: 64,
            hidden_size: 32,
            ..Default::default()
        };
        assert_eq!(config.sequence_output_size(), 32);
        config.sequence_modeling = "None".to_string();
        assert_eq!(config.sequence_modeling_kind(), None);
        assert_eq!(config.sequence_output_size(), 64);
    }

    #[test]
    fn test_validation_rules() {
        let small_height = RecognitionModelConfig {
            img_h: 16,
            ..Default::default()
        };
        assert!(small_height.validate().is_err());

        let resnet_odd_channels = RecognitionModelConfig {
            feature_extraction: "ResNet".to_string(),
            output_channel: 40,
            ..Default::default()
        };
        assert!(resnet_odd_channels.validate().is_err());

        let vgg_40 = RecognitionModelConfig {
            output_channel: 40,
            ..Default::default()
        };
        assert!(vgg_40.validate().is_ok());

        let tps_odd = RecognitionModelConfig {
            transformation: "TPS".to_string(),
            num_fiducial: 7,
            ..Default::default()
        };
        assert!(tps_odd.validate().is_err());

        // num_fiducial is irrelevant without TPS
        let no_tps_odd = RecognitionModelConfig {
            num_fiducial: 7,
            ..Default::default()
        };
        assert!(no_tps_odd.validate().is_ok());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = RecognitionModelConfig {
            transformation: "TPS".to_string(),
            prediction: "Attn".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(RecognitionModelConfig::from_json_str(&json).unwrap(), config);
    }
}
