//! Building blocks shared by the stage implementations.
//!
//! Candle's convolution and pooling primitives take a single stride/padding for
//! both spatial axes and pool without padding. The recognition backbones use
//! rectangular kernels, `(2, 1)` strides and `(0, 1)` paddings, so those cases
//! are expressed here on top of the square primitives.

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, VarBuilder};

use crate::core::constants::BATCH_NORM_EPS;

/// Loads a square 2D convolution.
pub(crate) fn conv2d(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    bias: bool,
    vb: VarBuilder,
) -> Result<Conv2d> {
    let cfg = Conv2dConfig {
        stride,
        padding,
        ..Default::default()
    };
    if bias {
        candle_nn::conv2d(in_channels, out_channels, kernel_size, cfg, vb)
    } else {
        candle_nn::conv2d_no_bias(in_channels, out_channels, kernel_size, cfg, vb)
    }
}

/// Loads a batch-norm layer (`weight`, `bias`, `running_mean`, `running_var`).
pub(crate) fn batch_norm(num_features: usize, vb: VarBuilder) -> Result<BatchNorm> {
    let cfg = BatchNormConfig {
        eps: BATCH_NORM_EPS,
        ..Default::default()
    };
    candle_nn::batch_norm(num_features, cfg, vb)
}

/// Applies a batch-norm layer with its running statistics.
pub(crate) fn bn_eval(bn: &BatchNorm, x: &Tensor) -> Result<Tensor> {
    bn.forward_t(x, false)
}

/// Convolution + BatchNorm + ReLU, stored under two sibling prefixes.
#[derive(Debug, Clone)]
pub(crate) struct ConvBnRelu {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBnRelu {
    /// Loads a bias-free 3x3 convolution (stride 1, padding 1) followed by a batch norm.
    pub(crate) fn load_3x3(
        in_channels: usize,
        out_channels: usize,
        conv_vb: VarBuilder,
        bn_vb: VarBuilder,
    ) -> Result<Self> {
        let conv = conv2d(in_channels, out_channels, 3, 1, 1, false, conv_vb)?;
        let bn = batch_norm(out_channels, bn_vb)?;
        Ok(Self { conv, bn })
    }

    pub(crate) fn from_parts(conv: Conv2d, bn: BatchNorm) -> Self {
        Self { conv, bn }
    }
}

impl Module for ConvBnRelu {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.conv.forward(x)?;
        bn_eval(&self.bn, &x)?.relu()
    }
}

/// Pads `x` along `dim` with a constant value.
fn pad_constant(x: &Tensor, dim: usize, left: usize, right: usize, value: f32) -> Result<Tensor> {
    if left == 0 && right == 0 {
        return Ok(x.clone());
    }
    let mut parts = Vec::with_capacity(3);
    let mut dims = x.dims().to_vec();
    if left > 0 {
        dims[dim] = left;
        parts.push(Tensor::full(value, dims.clone(), x.device())?.to_dtype(x.dtype())?);
    }
    parts.push(x.clone());
    if right > 0 {
        dims[dim] = right;
        parts.push(Tensor::full(value, dims, x.device())?.to_dtype(x.dtype())?);
    }
    Tensor::cat(&parts, dim)
}

/// Keeps every `step`-th slice of `x` along `dim`, starting at 0.
fn take_every(x: &Tensor, dim: usize, step: usize) -> Result<Tensor> {
    if step == 1 {
        return Ok(x.clone());
    }
    let len = x.dim(dim)?;
    let idx: Vec<u32> = (0..len as u32).step_by(step).collect();
    let idx = Tensor::new(idx.as_slice(), x.device())?;
    x.index_select(&idx, dim)
}

/// Max pooling over `(B, C, H, W)` with per-axis kernel, stride and padding.
///
/// Padding is filled with `-inf` so padded cells never win the max.
pub(crate) fn max_pool2d(
    x: &Tensor,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
) -> Result<Tensor> {
    let x = pad_constant(x, 2, padding.0, padding.0, f32::NEG_INFINITY)?;
    let x = pad_constant(&x, 3, padding.1, padding.1, f32::NEG_INFINITY)?;
    x.max_pool2d_with_stride(kernel, stride)
}

/// Global average pooling over the spatial axes: `(B, C, H, W)` -> `(B, C)`.
pub(crate) fn global_avg_pool(x: &Tensor) -> Result<Tensor> {
    x.mean(3)?.mean(2)
}

/// Square-kernel convolution with a per-axis stride and zero padding.
///
/// Runs a stride-1 convolution on the zero-padded input and keeps every
/// `stride`-th output row/column, which yields the same output positions as a
/// strided convolution.
#[derive(Debug, Clone)]
pub(crate) struct StridedConv2d {
    conv: Conv2d,
    stride: (usize, usize),
    padding: (usize, usize),
}

impl StridedConv2d {
    pub(crate) fn load_no_bias(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: (usize, usize),
        padding: (usize, usize),
        vb: VarBuilder,
    ) -> Result<Self> {
        let conv = conv2d(in_channels, out_channels, kernel_size, 1, 0, false, vb)?;
        Ok(Self {
            conv,
            stride,
            padding,
        })
    }
}

impl Module for StridedConv2d {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = x
            .pad_with_zeros(2, self.padding.0, self.padding.0)?
            .pad_with_zeros(3, self.padding.1, self.padding.1)?;
        let y = self.conv.forward(&x)?;
        let y = take_every(&y, 2, self.stride.0)?;
        take_every(&y, 3, self.stride.1)
    }
}
