//! Prediction stage: maps contextual features to per-step class scores.

pub mod attention;

use candle_core::Result;
use candle_nn::{Linear, VarBuilder};

pub use attention::Attention;

/// Decoder selected by the `prediction` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionKind {
    /// Per-column linear classifier trained with a CTC loss.
    Ctc,
    /// Attention decoder emitting one token per step.
    Attn,
}

impl PredictionKind {
    /// Parses a selector string (`"CTC"`, `"Attn"`).
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector {
            "CTC" => Some(Self::Ctc),
            "Attn" => Some(Self::Attn),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ctc => "CTC",
            Self::Attn => "Attn",
        }
    }
}

/// A constructed prediction head.
#[derive(Debug, Clone)]
pub enum Prediction {
    Ctc(Linear),
    Attn(Attention),
}

impl Prediction {
    /// Loads the head from `vb` (the `Prediction` prefix).
    pub fn load(
        kind: PredictionKind,
        input_size: usize,
        hidden_size: usize,
        num_class: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(match kind {
            PredictionKind::Ctc => Self::Ctc(candle_nn::linear(input_size, num_class, vb)?),
            PredictionKind::Attn => {
                Self::Attn(Attention::load(input_size, hidden_size, num_class, vb)?)
            }
        })
    }

    pub fn kind(&self) -> PredictionKind {
        match self {
            Self::Ctc(_) => PredictionKind::Ctc,
            Self::Attn(_) => PredictionKind::Attn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Module, Tensor};

    #[test]
    fn test_from_selector() {
        assert_eq!(PredictionKind::from_selector("CTC"), Some(PredictionKind::Ctc));
        assert_eq!(PredictionKind::from_selector("Attn"), Some(PredictionKind::Attn));
        assert_eq!(PredictionKind::from_selector("ctc"), None);
        assert_eq!(PredictionKind::from_selector("Transformer"), None);
    }

    #[test]
    fn test_ctc_head_shape() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let head = Prediction::load(PredictionKind::Ctc, 16, 8, 11, vb).unwrap();
        assert_eq!(head.kind(), PredictionKind::Ctc);
        let x = Tensor::zeros((2, 24, 16), DType::F32, &device).unwrap();
        let Prediction::Ctc(linear) = head else {
            panic!("expected a CTC head");
        };
        assert_eq!(linear.forward(&x).unwrap().dims(), &[2, 24, 11]);
    }

    #[test]
    fn test_attn_head_kind() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let head = Prediction::load(PredictionKind::Attn, 16, 8, 11, vb).unwrap();
        assert_eq!(head.kind(), PredictionKind::Attn);
    }
}
