//! Sequence modeling stage: contextualises the column features along the width axis.

pub mod bilstm;

use candle_core::{Module, Result, Tensor};
use candle_nn::VarBuilder;

pub use bilstm::BidirectionalLstm;

/// Sequence model selected by the `sequence_modeling` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceModelingKind {
    /// Two stacked bidirectional LSTMs.
    BiLstm,
}

impl SequenceModelingKind {
    /// Parses a selector string. Unknown selectors (including `"None"`) yield `None`.
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector {
            "BiLSTM" => Some(Self::BiLstm),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BiLstm => "BiLSTM",
        }
    }
}

/// Two stacked [`BidirectionalLstm`]s: `input_size -> hidden -> hidden`.
#[derive(Debug, Clone)]
pub struct SequenceModeling {
    layers: Vec<BidirectionalLstm>,
    output_size: usize,
}

impl SequenceModeling {
    /// Loads the stack from `vb` (the `SequenceModeling` prefix).
    pub fn load(input_size: usize, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let layers = vec![
            BidirectionalLstm::load(input_size, hidden_size, hidden_size, vb.pp(0))?,
            BidirectionalLstm::load(hidden_size, hidden_size, hidden_size, vb.pp(1))?,
        ];
        Ok(Self {
            layers,
            output_size: hidden_size,
        })
    }

    /// Width of the contextual features produced by this stage.
    pub fn output_size(&self) -> usize {
        self.output_size
    }
}

impl Module for SequenceModeling {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.layers
            .iter()
            .try_fold(x.clone(), |x, layer| layer.forward(&x))
    }
}
