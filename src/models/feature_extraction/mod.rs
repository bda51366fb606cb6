//! Feature extraction stage: convolutional backbones that turn an image into a
//! `[B, C, H', W']` feature map.

pub mod rcnn;
pub mod resnet;
pub mod vgg;

use candle_core::{Module, Result, Tensor};
use candle_nn::VarBuilder;

pub use rcnn::RcnnFeatureExtractor;
pub use resnet::ResNetFeatureExtractor;
pub use vgg::VggFeatureExtractor;

/// Backbone selected by the `feature_extraction` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureExtractionKind {
    Vgg,
    Rcnn,
    ResNet,
}

impl FeatureExtractionKind {
    /// Parses a selector string (`"VGG"`, `"RCNN"`, `"ResNet"`).
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector {
            "VGG" => Some(Self::Vgg),
            "RCNN" => Some(Self::Rcnn),
            "ResNet" => Some(Self::ResNet),
            _ => None,
        }
    }

    /// The selector string for this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vgg => "VGG",
            Self::Rcnn => "RCNN",
            Self::ResNet => "ResNet",
        }
    }

    /// `output_channel` must be a multiple of this value.
    pub const fn channel_divisor(&self) -> usize {
        match self {
            Self::ResNet => 16,
            Self::Vgg | Self::Rcnn => 8,
        }
    }
}

/// A constructed backbone.
#[derive(Debug, Clone)]
pub enum FeatureExtractor {
    Vgg(VggFeatureExtractor),
    Rcnn(RcnnFeatureExtractor),
    ResNet(ResNetFeatureExtractor),
}

impl FeatureExtractor {
    /// Loads the backbone of the given kind from `vb` (the `FeatureExtraction` prefix).
    pub fn load(
        kind: FeatureExtractionKind,
        input_channel: usize,
        output_channel: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(match kind {
            FeatureExtractionKind::Vgg => {
                Self::Vgg(VggFeatureExtractor::load(input_channel, output_channel, vb)?)
            }
            FeatureExtractionKind::Rcnn => {
                Self::Rcnn(RcnnFeatureExtractor::load(input_channel, output_channel, vb)?)
            }
            FeatureExtractionKind::ResNet => {
                Self::ResNet(ResNetFeatureExtractor::load(input_channel, output_channel, vb)?)
            }
        })
    }

    pub fn kind(&self) -> FeatureExtractionKind {
        match self {
            Self::Vgg(_) => FeatureExtractionKind::Vgg,
            Self::Rcnn(_) => FeatureExtractionKind::Rcnn,
            Self::ResNet(_) => FeatureExtractionKind::ResNet,
        }
    }
}

impl Module for FeatureExtractor {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            Self::Vgg(net) => net.forward(x),
            Self::Rcnn(net) => net.forward(x),
            Self::ResNet(net) => net.forward(x),
        }
    }
}
