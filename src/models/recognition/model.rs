//! The four-stage text recognition network.
//!
//! Transformation -> feature extraction -> sequence modeling -> prediction.
//! The transformation and sequence stages are optional; the backbone and the
//! prediction head are always present.

use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;
use tracing::{debug, info, warn};

use crate::core::constants::{MIN_IMG_H, MIN_IMG_W};
use crate::core::{ConfigValidatorExt, OCRError};
use crate::models::feature_extraction::{FeatureExtractionKind, FeatureExtractor};
use crate::models::prediction::{Prediction, PredictionKind};
use crate::models::recognition::config::RecognitionModelConfig;
use crate::models::sequence_modeling::SequenceModeling;
use crate::models::transformation::TpsSpatialTransformer;
use crate::utils::candle_to_ocr_inference;

const MODEL_NAME: &str = "TextRecognitionModel";

/// Text recognition network assembled from [`RecognitionModelConfig`].
#[derive(Debug, Clone)]
pub struct TextRecognitionModel {
    config: RecognitionModelConfig,
    transformation: Option<TpsSpatialTransformer>,
    feature_extraction: FeatureExtractor,
    sequence_modeling: Option<SequenceModeling>,
    prediction: Prediction,
}

impl TextRecognitionModel {
    /// Builds the network and loads its weights from `vb`.
    ///
    /// Parameters are looked up under `Transformation`, `FeatureExtraction`,
    /// `SequenceModeling` and `Prediction`.
    ///
    /// # Errors
    ///
    /// Returns `OCRError::ConfigError` if the feature extraction or prediction
    /// selector is unknown or the configuration fails validation, and
    /// `OCRError::Inference` if a weight is missing or has the wrong shape.
    /// Unknown transformation and sequence modeling selectors are logged and
    /// disable their stage.
    pub fn new(config: RecognitionModelConfig, vb: VarBuilder) -> Result<Self, OCRError> {
        let transformation_kind = config.transformation_kind();
        if transformation_kind.is_none() {
            log_disabled_stage("No Transformation module specified", &config.transformation);
        }
        let feature_kind = config.feature_extraction_kind()?;
        let sequence_kind = config.sequence_modeling_kind();
        if sequence_kind.is_none() {
            log_disabled_stage("No SequenceModeling module specified", &config.sequence_modeling);
        }
        let prediction_kind = config.prediction_kind()?;
        let config = config.validate_and_wrap_ocr_error()?;

        let transformation = match transformation_kind {
            Some(_) => Some(TpsSpatialTransformer::load(
                config.num_fiducial,
                (config.img_h, config.img_w),
                config.input_channel,
                vb.pp("Transformation"),
            )?),
            None => None,
        };

        let feature_extraction = FeatureExtractor::load(
            feature_kind,
            config.input_channel,
            config.output_channel,
            vb.pp("FeatureExtraction"),
        )
        .map_err(|e| candle_to_ocr_inference(feature_kind.as_str(), "load weights", e))?;

        let sequence_modeling = match sequence_kind {
            Some(kind) => Some(
                SequenceModeling::load(
                    config.output_channel,
                    config.hidden_size,
                    vb.pp("SequenceModeling"),
                )
                .map_err(|e| candle_to_ocr_inference(kind.as_str(), "load weights", e))?,
            ),
            None => None,
        };

        let prediction = Prediction::load(
            prediction_kind,
            config.sequence_output_size(),
            config.hidden_size,
            config.num_class,
            vb.pp("Prediction"),
        )
        .map_err(|e| candle_to_ocr_inference(prediction_kind.as_str(), "load weights", e))?;

        info!(
            transformation = transformation_kind.map_or("None", |k| k.as_str()),
            feature_extraction = feature_kind.as_str(),
            sequence_modeling = sequence_kind.map_or("None", |k| k.as_str()),
            prediction = prediction_kind.as_str(),
            num_class = config.num_class,
            "Built text recognition model"
        );

        Ok(Self {
            config,
            transformation,
            feature_extraction,
            sequence_modeling,
            prediction,
        })
    }

    pub fn config(&self) -> &RecognitionModelConfig {
        &self.config
    }

    /// Whether the TPS transformation stage was constructed.
    pub fn has_transformation(&self) -> bool {
        self.transformation.is_some()
    }

    /// Whether the BiLSTM stage was constructed.
    pub fn has_sequence_modeling(&self) -> bool {
        self.sequence_modeling.is_some()
    }

    pub fn feature_extraction_kind(&self) -> FeatureExtractionKind {
        self.feature_extraction.kind()
    }

    pub fn prediction_kind(&self) -> PredictionKind {
        self.prediction.kind()
    }

    /// Runs the network.
    ///
    /// # Arguments
    ///
    /// * `input` - Image batch `[B, input_channel, H, W]`, normalised to `[-1, 1]`.
    ///   With TPS enabled `H x W` must equal `img_h x img_w`.
    /// * `text` - Class ids `[B, batch_max_length + 1]` starting with `[GO]`,
    ///   fed to the attention decoder when `is_train` is set. Ignored by CTC.
    /// * `is_train` - Teacher-forced attention decoding instead of greedy.
    ///
    /// # Returns
    ///
    /// Class scores `[B, T, num_class]`: `T` is the feature width for CTC and
    /// `batch_max_length + 1` for attention.
    pub fn forward(
        &self,
        input: &Tensor,
        text: Option<&Tensor>,
        is_train: bool,
    ) -> Result<Tensor, OCRError> {
        self.validate_input(input)?;

        let rectified = match &self.transformation {
            Some(tps) => tps
                .forward(input)
                .map_err(|e| candle_to_ocr_inference("TPS", "rectify input batch", e))?,
            None => input.clone(),
        };

        let visual = self.extract_visual_features(&rectified)?;
        debug!(shape = ?visual.dims(), "visual features");

        let contextual = match &self.sequence_modeling {
            Some(sequence) => sequence
                .forward(&visual)
                .map_err(|e| candle_to_ocr_inference("BiLSTM", "sequence modeling", e))?,
            None => visual,
        };

        match &self.prediction {
            Prediction::Ctc(linear) => linear
                .forward(&contextual)
                .map_err(|e| candle_to_ocr_inference("CTC", "prediction", e)),
            Prediction::Attn(attention) => {
                let num_steps = self.config.num_steps();
                if is_train {
                    let text = text.ok_or_else(|| {
                        OCRError::invalid_input(
                            "attention decoding in training mode requires target text",
                        )
                    })?;
                    self.validate_text(text, input.dims()[0])?;
                    attention
                        .forward_teacher_forced(&contextual, text, num_steps)
                        .map_err(|e| candle_to_ocr_inference("Attn", "teacher-forced decoding", e))
                } else {
                    attention
                        .forward_greedy(&contextual, num_steps)
                        .map_err(|e| candle_to_ocr_inference("Attn", "greedy decoding", e))
                }
            }
        }
    }

    /// Backbone features pooled over height: `[B, C, H', W']` -> `[B, W', C]`.
    fn extract_visual_features(&self, x: &Tensor) -> Result<Tensor, OCRError> {
        let kind = self.feature_extraction.kind().as_str();
        let features = self
            .feature_extraction
            .forward(x)
            .map_err(|e| candle_to_ocr_inference(kind, "feature extraction", e))?;
        features
            .permute((0, 3, 1, 2))
            .and_then(|t| t.mean(3))
            .and_then(|t| t.contiguous())
            .map_err(|e| candle_to_ocr_inference(kind, "pool feature map over height", e))
    }

    fn validate_input(&self, input: &Tensor) -> Result<(), OCRError> {
        let dims = input.dims();
        if dims.len() != 4 {
            return Err(OCRError::invalid_input(format!(
                "expected image batch [B, C, H, W], got shape {:?}",
                dims
            )));
        }
        let (batch, channels, height, width) = (dims[0], dims[1], dims[2], dims[3]);
        if batch == 0 {
            return Err(OCRError::invalid_input("image batch is empty"));
        }
        if channels != self.config.input_channel {
            return Err(OCRError::validation_error(
                MODEL_NAME,
                "channels",
                &self.config.input_channel.to_string(),
                &channels.to_string(),
            ));
        }
        if self.transformation.is_some()
            && (height != self.config.img_h || width != self.config.img_w)
        {
            return Err(OCRError::validation_error(
                MODEL_NAME,
                "image size",
                &format!("{}x{}", self.config.img_h, self.config.img_w),
                &format!("{}x{}", height, width),
            ));
        }
        if height < MIN_IMG_H || width < MIN_IMG_W {
            return Err(OCRError::invalid_input(format!(
                "image size {}x{} is below the minimum {}x{}",
                height, width, MIN_IMG_H, MIN_IMG_W
            )));
        }
        Ok(())
    }

    fn validate_text(&self, text: &Tensor, batch: usize) -> Result<(), OCRError> {
        let dims = text.dims();
        let num_steps = self.config.num_steps();
        if dims.len() != 2 || dims[0] != batch || dims[1] < num_steps {
            return Err(OCRError::invalid_input(format!(
                "expected target text [{}, {}], got shape {:?}",
                batch, num_steps, dims
            )));
        }
        Ok(())
    }
}

fn log_disabled_stage(message: &str, selector: &str) {
    if selector == "None" {
        info!("{}", message);
    } else {
        warn!(selector, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn small_config(
        transformation: &str,
        feature_extraction: &str,
        sequence_modeling: &str,
        prediction: &str,
    ) -> RecognitionModelConfig {
        RecognitionModelConfig {
            transformation: transformation.to_string(),
            feature_extraction: feature_extraction.to_string(),
            sequence_modeling: sequence_modeling.to_string(),
            prediction: prediction.to_string(),
            num_fiducial: 20,
            img_h: 32,
            img_w: 100,
            input_channel: 1,
            output_channel: 32,
            hidden_size: 16,
            num_class: 10,
            batch_max_length: 5,
        }
    }

    fn build(config: RecognitionModelConfig) -> Result<TextRecognitionModel, OCRError> {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        TextRecognitionModel::new(config, vb)
    }

    fn image_batch(batch: usize, channels: usize, h: usize, w: usize) -> Tensor {
        Tensor::zeros((batch, channels, h, w), DType::F32, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_every_valid_combination_builds_and_runs() {
        for transformation in ["None", "TPS"] {
            for feature_extraction in ["VGG", "RCNN", "ResNet"] {
                for sequence_modeling in ["None", "BiLSTM"] {
                    for prediction in ["CTC", "Attn"] {
                        let config = small_config(
                            transformation,
                            feature_extraction,
                            sequence_modeling,
                            prediction,
                        );
                        let model = build(config).unwrap();
                        let out = model.forward(&image_batch(1, 1, 32, 100), None, false).unwrap();
                        let expected_steps = match (prediction, feature_extraction) {
                            ("Attn", _) => 6,
                            (_, "VGG") => 24,
                            _ => 26,
                        };
                        assert_eq!(
                            out.dims(),
                            &[1, expected_steps, 10],
                            "{transformation}-{feature_extraction}-{sequence_modeling}-{prediction}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_stage_accessors() {
        let model = build(small_config("TPS", "ResNet", "BiLSTM", "Attn")).unwrap();
        assert!(model.has_transformation());
        assert!(model.has_sequence_modeling());
        assert_eq!(model.feature_extraction_kind(), FeatureExtractionKind::ResNet);
        assert_eq!(model.prediction_kind(), PredictionKind::Attn);
        assert_eq!(model.config().num_class, 10);
    }

    #[test]
    fn test_unknown_feature_extraction_fails() {
        let err = build(small_config("None", "MobileNet", "BiLSTM", "CTC")).unwrap_err();
        assert!(matches!(err, OCRError::ConfigError { .. }));
        assert!(err.to_string().contains("No FeatureExtraction module specified"));
    }

    #[test]
    fn test_unknown_prediction_fails() {
        let err = build(small_config("None", "VGG", "BiLSTM", "Transformer")).unwrap_err();
        assert!(matches!(err, OCRError::ConfigError { .. }));
        assert!(err.to_string().contains("Prediction is neither CTC or Attn"));
    }

    #[test]
    fn test_unknown_transformation_and_sequence_are_disabled() {
        let model = build(small_config("STN", "VGG", "Transformer", "CTC")).unwrap();
        assert!(!model.has_transformation());
        assert!(!model.has_sequence_modeling());
        let out = model.forward(&image_batch(2, 1, 32, 100), None, false).unwrap();
        assert_eq!(out.dims(), &[2, 24, 10]);
    }

    #[test]
    fn test_invalid_config_fails_before_loading() {
        let mut config = small_config("None", "ResNet", "BiLSTM", "CTC");
        config.output_channel = 40;
        let err = build(config).unwrap_err();
        assert!(err.to_string().contains("output_channel"));
    }

    #[test]
    fn test_attention_teacher_forced() {
        let model = build(small_config("None", "VGG", "BiLSTM", "Attn")).unwrap();
        let text = Tensor::new(
            &[[0u32, 4, 5, 1, 0, 0, 0], [0, 2, 1, 0, 0, 0, 0]],
            &Device::Cpu,
        )
        .unwrap();
        let out = model
            .forward(&image_batch(2, 1, 32, 100), Some(&text), true)
            .unwrap();
        assert_eq!(out.dims(), &[2, 6, 10]);
    }

    #[test]
    fn test_attention_training_without_text_is_rejected() {
        let model = build(small_config("None", "VGG", "None", "Attn")).unwrap();
        let err = model
            .forward(&image_batch(1, 1, 32, 100), None, true)
            .unwrap_err();
        assert!(matches!(err, OCRError::InvalidInput { .. }));
    }

    #[test]
    fn test_attention_rejects_short_text() {
        let model = build(small_config("None", "VGG", "None", "Attn")).unwrap();
        let text = Tensor::new(&[[0u32, 1]], &Device::Cpu).unwrap();
        let err = model
            .forward(&image_batch(1, 1, 32, 100), Some(&text), true)
            .unwrap_err();
        assert!(matches!(err, OCRError::InvalidInput { .. }));
    }

    #[test]
    fn test_ctc_ignores_text_and_mode() {
        let model = build(small_config("None", "RCNN", "BiLSTM", "CTC")).unwrap();
        let out = model.forward(&image_batch(1, 1, 32, 100), None, true).unwrap();
        assert_eq!(out.dims(), &[1, 26, 10]);
    }

    #[test]
    fn test_input_validation() {
        let model = build(small_config("TPS", "VGG", "BiLSTM", "CTC")).unwrap();
        let wrong_channels = model.forward(&image_batch(1, 3, 32, 100), None, false);
        assert!(matches!(wrong_channels, Err(OCRError::InvalidInput { .. })));
        let wrong_size = model.forward(&image_batch(1, 1, 32, 128), None, false);
        assert!(matches!(wrong_size, Err(OCRError::InvalidInput { .. })));
        let wrong_rank = Tensor::zeros((1, 32, 100), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            model.forward(&wrong_rank, None, false),
            Err(OCRError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_wider_input_without_transformation() {
        let model = build(small_config("None", "VGG", "BiLSTM", "CTC")).unwrap();
        let out = model.forward(&image_batch(1, 1, 32, 200), None, false).unwrap();
        // VGG width: 200 / 4 - 1 = 49
        assert_eq!(out.dims(), &[1, 49, 10]);
    }

    #[test]
    fn test_rgb_input() {
        let mut config = small_config("TPS", "ResNet", "BiLSTM", "CTC");
        config.input_channel = 3;
        let model = build(config).unwrap();
        let out = model.forward(&image_batch(2, 3, 32, 100), None, false).unwrap();
        assert_eq!(out.dims(), &[2, 26, 10]);
    }
}
