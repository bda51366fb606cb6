//! Label conversion between text and class ids.
//!
//! Two converters cover the two prediction heads:
//! - [`CTCLabelDecode`]: blank at id 0, characters from id 1; greedy CTC
//!   decoding collapses repeats and drops blanks.
//! - [`AttnLabelConverter`]: `[GO]` at id 0, `[s]` at id 1, characters from
//!   id 2; encodes targets for teacher forcing and decodes up to the first `[s]`.

use candle_core::{DType, Device, Tensor};
use std::collections::HashMap;
use std::path::Path;

use crate::core::constants::{
    ATTN_EOS_INDEX, ATTN_EOS_TOKEN, ATTN_GO_INDEX, ATTN_GO_TOKEN, CTC_BLANK_INDEX,
};
use crate::core::{OCRError, ProcessingStage};
use crate::utils::candle_to_ocr_processing;

/// Reads a character dictionary: one character per line, blank lines skipped.
pub fn read_character_dict(path: &Path) -> Result<String, OCRError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|line| line.chars().next())
        .collect())
}

/// Per-step argmax ids and their probabilities from a `[B, T, C]` tensor.
pub fn greedy_max(probs: &Tensor) -> Result<(Vec<Vec<usize>>, Vec<Vec<f32>>), OCRError> {
    let to_err = |e: candle_core::Error| {
        candle_to_ocr_processing(ProcessingStage::PostProcessing, "greedy max", e)
    };
    if probs.rank() != 3 {
        return Err(OCRError::invalid_input(format!(
            "expected class scores [B, T, C], got shape {:?}",
            probs.dims()
        )));
    }
    let probs = probs.to_dtype(DType::F32).map_err(to_err)?;
    let ids = probs
        .argmax(2)
        .and_then(|t| t.to_vec2::<u32>())
        .map_err(to_err)?;
    let max = probs
        .max(2)
        .and_then(|t| t.to_vec2::<f32>())
        .map_err(to_err)?;
    let ids = ids
        .into_iter()
        .map(|row| row.into_iter().map(|id| id as usize).collect())
        .collect();
    Ok((ids, max))
}

/// Decoder for CTC predictions.
#[derive(Debug, Clone)]
pub struct CTCLabelDecode {
    /// Index 0 is the blank (`'\0'`).
    character: Vec<char>,
}

impl CTCLabelDecode {
    /// Creates a decoder over `characters` (in class-id order, blank excluded).
    pub fn new(characters: &str) -> Self {
        let mut character = vec!['\0'];
        character.extend(characters.chars());
        Self { character }
    }

    /// Creates a decoder from a dictionary file (one character per line).
    pub fn from_dict_file(path: &Path) -> Result<Self, OCRError> {
        Ok(Self::new(&read_character_dict(path)?))
    }

    /// Number of classes the CTC head must predict (characters + blank).
    pub fn num_class(&self) -> usize {
        self.character.len()
    }

    /// Decodes greedy CTC paths.
    ///
    /// Repeated ids are collapsed, then blanks removed. The confidence is the
    /// product of the probabilities of the kept steps, or 0 for an empty result.
    pub fn decode(&self, text_index: &[Vec<usize>], text_prob: &[Vec<f32>]) -> Vec<(String, f32)> {
        text_index
            .iter()
            .enumerate()
            .map(|(batch_idx, indices)| {
                let probs = text_prob.get(batch_idx);
                let mut text = String::new();
                let mut confidence = 1.0f32;
                let mut kept = 0usize;
                for (i, &idx) in indices.iter().enumerate() {
                    if idx == CTC_BLANK_INDEX || (i > 0 && indices[i - 1] == idx) {
                        continue;
                    }
                    let Some(&ch) = self.character.get(idx) else {
                        continue;
                    };
                    text.push(ch);
                    confidence *= probs.and_then(|p| p.get(i)).copied().unwrap_or(1.0);
                    kept += 1;
                }
                if kept == 0 {
                    confidence = 0.0;
                }
                (text, confidence)
            })
            .collect()
    }

    /// Decodes softmaxed `[B, T, num_class]` scores.
    pub fn apply(&self, probs: &Tensor) -> Result<Vec<(String, f32)>, OCRError> {
        let (ids, max) = greedy_max(probs)?;
        Ok(self.decode(&ids, &max))
    }
}

/// Converter between text and attention decoder class ids.
#[derive(Debug, Clone)]
pub struct AttnLabelConverter {
    /// Characters in id order starting at id 2.
    character: Vec<char>,
    dict: HashMap<char, usize>,
}

impl AttnLabelConverter {
    /// Creates a converter over `characters` (special tokens excluded).
    pub fn new(characters: &str) -> Self {
        let character: Vec<char> = characters.chars().collect();
        let dict = character
            .iter()
            .enumerate()
            .map(|(i, &ch)| (ch, i + 2))
            .collect();
        Self { character, dict }
    }

    /// Creates a converter from a dictionary file (one character per line).
    pub fn from_dict_file(path: &Path) -> Result<Self, OCRError> {
        Ok(Self::new(&read_character_dict(path)?))
    }

    /// Number of classes the attention head must predict (characters + `[GO]` + `[s]`).
    pub fn num_class(&self) -> usize {
        self.character.len() + 2
    }

    /// Token for a class id; the special tokens map to their bracketed names.
    pub fn token(&self, id: usize) -> Option<String> {
        match id {
            ATTN_GO_INDEX => Some(ATTN_GO_TOKEN.to_string()),
            ATTN_EOS_INDEX => Some(ATTN_EOS_TOKEN.to_string()),
            _ => self.character.get(id - 2).map(|ch| ch.to_string()),
        }
    }

    /// Encodes target texts for teacher-forced decoding.
    ///
    /// Returns `[B, batch_max_length + 2]` u32 ids (`[GO]`, the characters,
    /// `[s]`, then zero padding) and the per-text lengths including `[s]`.
    /// The decoder consumes the first `batch_max_length + 1` columns; the
    /// training target is the same tensor shifted left by one.
    pub fn encode(
        &self,
        texts: &[&str],
        batch_max_length: usize,
        device: &Device,
    ) -> Result<(Tensor, Vec<usize>), OCRError> {
        let width = batch_max_length + 2;
        let mut ids = vec![ATTN_GO_INDEX as u32; texts.len() * width];
        let mut lengths = Vec::with_capacity(texts.len());
        for (row, text) in texts.iter().enumerate() {
            let chars: Vec<char> = text.chars().collect();
            if chars.len() > batch_max_length {
                return Err(OCRError::invalid_input(format!(
                    "text '{}' has {} characters, more than batch_max_length {}",
                    text,
                    chars.len(),
                    batch_max_length
                )));
            }
            let start = row * width + 1;
            for (i, ch) in chars.iter().enumerate() {
                let id = self.dict.get(ch).ok_or_else(|| {
                    OCRError::invalid_input(format!(
                        "character '{}' in '{}' is not in the dictionary",
                        ch, text
                    ))
                })?;
                ids[start + i] = *id as u32;
            }
            ids[start + chars.len()] = ATTN_EOS_INDEX as u32;
            lengths.push(chars.len() + 1);
        }
        let tensor = Tensor::from_vec(ids, (texts.len(), width), device).map_err(|e| {
            candle_to_ocr_processing(ProcessingStage::TensorOperation, "encode target text", e)
        })?;
        Ok((tensor, lengths))
    }

    /// Decodes greedy attention outputs, stopping at the first `[s]`.
    ///
    /// The confidence is the product of the step probabilities before `[s]`.
    /// An empty text scores 0, including one made only of `[GO]` steps.
    pub fn decode(&self, text_index: &[Vec<usize>], text_prob: &[Vec<f32>]) -> Vec<(String, f32)> {
        text_index
            .iter()
            .enumerate()
            .map(|(batch_idx, indices)| {
                let end = indices
                    .iter()
                    .position(|&id| id == ATTN_EOS_INDEX)
                    .unwrap_or(indices.len());
                let probs = text_prob.get(batch_idx);
                let text: String = indices[..end]
                    .iter()
                    .filter_map(|&id| id.checked_sub(2).and_then(|i| self.character.get(i)))
                    .collect();
                let confidence = if text.is_empty() {
                    0.0
                } else {
                    (0..end)
                        .map(|i| probs.and_then(|p| p.get(i)).copied().unwrap_or(1.0))
                        .product()
                };
                (text, confidence)
            })
            .collect()
    }

    /// Decodes softmaxed `[B, T, num_class]` scores.
    pub fn apply(&self, probs: &Tensor) -> Result<Vec<(String, f32)>, OCRError> {
        let (ids, max) = greedy_max(probs)?;
        Ok(self.decode(&ids, &max))
    }
}
