//! End-to-end text recognizer: preprocessing, the recognition network and
//! label decoding behind one call.

use candle_core::{D, DType, Device};
use candle_nn::VarBuilder;
use image::RgbImage;
use std::path::Path;
use tracing::{debug, info};

use crate::core::{ConfigValidator, OCRError, OcrResult, ProcessingStage};
use crate::models::prediction::PredictionKind;
use crate::models::{RecognitionModelConfig, TextRecognitionModel};
use crate::processors::{AttnLabelConverter, CTCLabelDecode, RecognitionPreprocessor};
use crate::utils::{candle_to_ocr_inference, candle_to_ocr_processing, load_images};

/// Label converter matching the prediction head.
#[derive(Debug, Clone)]
pub enum LabelConverter {
    Ctc(CTCLabelDecode),
    Attn(AttnLabelConverter),
}

impl LabelConverter {
    pub fn new(kind: PredictionKind, characters: &str) -> Self {
        match kind {
            PredictionKind::Ctc => Self::Ctc(CTCLabelDecode::new(characters)),
            PredictionKind::Attn => Self::Attn(AttnLabelConverter::new(characters)),
        }
    }

    pub fn num_class(&self) -> usize {
        match self {
            Self::Ctc(decoder) => decoder.num_class(),
            Self::Attn(converter) => converter.num_class(),
        }
    }

    /// Decodes softmaxed `[B, T, num_class]` scores into `(text, confidence)` pairs.
    pub fn apply(&self, probs: &candle_core::Tensor) -> OcrResult<Vec<(String, f32)>> {
        match self {
            Self::Ctc(decoder) => decoder.apply(probs),
            Self::Attn(converter) => converter.apply(probs),
        }
    }
}

/// Name of a parameter every checkpoint of `kind` carries, used to detect the
/// `module.` prefix left by data-parallel training.
fn probe_parameter(kind: PredictionKind) -> &'static str {
    match kind {
        PredictionKind::Ctc => "Prediction.weight",
        PredictionKind::Attn => "Prediction.generator.weight",
    }
}

/// Recognizes the text in word crops.
#[derive(Debug, Clone)]
pub struct TextRecognizer {
    model: TextRecognitionModel,
    preprocessor: RecognitionPreprocessor,
    converter: LabelConverter,
    device: Device,
}

impl TextRecognizer {
    /// Wraps an already built model.
    ///
    /// `characters` lists the dictionary in class-id order without special
    /// tokens. Images are stretched to the model input size.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the dictionary does not match the
    /// model's `num_class`.
    pub fn new(
        model: TextRecognitionModel,
        characters: &str,
        device: Device,
    ) -> OcrResult<Self> {
        let converter = LabelConverter::new(model.prediction_kind(), characters);
        let num_class = model.config().num_class;
        if converter.num_class() != num_class {
            return Err(OCRError::config_error_with_context(
                "num_class",
                &num_class.to_string(),
                &format!(
                    "{} characters with {} prediction need {} classes",
                    characters.chars().count(),
                    model.prediction_kind().as_str(),
                    converter.num_class()
                ),
            ));
        }
        let preprocessor = RecognitionPreprocessor::from_config(model.config(), false)?;
        Ok(Self {
            model,
            preprocessor,
            converter,
            device,
        })
    }

    /// Loads a recognizer from a safetensors checkpoint.
    ///
    /// Parameter names may carry a leading `module.`; it is stripped.
    pub fn from_safetensors(
        weights: impl AsRef<Path>,
        config: RecognitionModelConfig,
        characters: &str,
        device: Device,
    ) -> OcrResult<Self> {
        let weights = weights.as_ref();
        config.validate_model_path(weights)?;
        let prediction_kind = config.prediction_kind()?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                .map_err(|e| candle_to_ocr_inference("TextRecognizer", "load safetensors", e))?
        };
        let prefixed = format!("module.{}", probe_parameter(prediction_kind));
        let vb = if vb.contains_tensor(&prefixed) {
            debug!("Stripping 'module.' prefix from checkpoint parameters");
            vb.pp("module")
        } else {
            vb
        };

        let model = TextRecognitionModel::new(config, vb)?;
        info!(weights = %weights.display(), "Loaded text recognizer");
        Self::new(model, characters, device)
    }

    /// Keeps the aspect ratio of the crops and pads on the right instead of
    /// stretching them.
    pub fn with_keep_ratio(mut self, keep_ratio_with_pad: bool) -> OcrResult<Self> {
        self.preprocessor =
            RecognitionPreprocessor::from_config(self.model.config(), keep_ratio_with_pad)?;
        Ok(self)
    }

    pub fn model(&self) -> &TextRecognitionModel {
        &self.model
    }

    pub fn converter(&self) -> &LabelConverter {
        &self.converter
    }

    /// Recognizes a batch of word crops, returning `(text, confidence)` per image.
    pub fn recognize(&self, images: &[RgbImage]) -> OcrResult<Vec<(String, f32)>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.preprocessor.apply(images, &self.device)?;
        let logits = self.model.forward(&batch, None, false)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1).map_err(|e| {
            candle_to_ocr_processing(ProcessingStage::PostProcessing, "softmax class scores", e)
        })?;
        let results = self.converter.apply(&probs)?;
        debug!(batch_size = images.len(), "Recognized batch");
        Ok(results)
    }

    /// Loads images from disk and recognizes them.
    pub fn recognize_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> OcrResult<Vec<(String, f32)>> {
        let images = load_images(paths)?;
        self.recognize(&images)
    }
}
