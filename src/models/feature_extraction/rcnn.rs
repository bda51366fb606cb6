//! Gated recurrent convolutional backbone (GRCNN).

use candle_core::{Module, Result, Tensor};
use candle_nn::{BatchNorm, Conv2d, VarBuilder};

use crate::core::constants::GRCL_ITERATIONS;
use crate::models::layers::{ConvBnRelu, batch_norm, bn_eval, conv2d, max_pool2d};

/// One recurrent iteration of a gated recurrent convolution layer.
#[derive(Debug, Clone)]
struct GrclUnit {
    bn_gfu: BatchNorm,
    bn_grx: BatchNorm,
    bn_fu: BatchNorm,
    bn_rx: BatchNorm,
    bn_gx: BatchNorm,
}

impl GrclUnit {
    fn load(channels: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            bn_gfu: batch_norm(channels, vb.pp("BN_gfu"))?,
            bn_grx: batch_norm(channels, vb.pp("BN_grx"))?,
            bn_fu: batch_norm(channels, vb.pp("BN_fu"))?,
            bn_rx: batch_norm(channels, vb.pp("BN_rx"))?,
            bn_gx: batch_norm(channels, vb.pp("BN_Gx"))?,
        })
    }

    fn forward(
        &self,
        wgf_u: &Tensor,
        wgr_x: &Tensor,
        wf_u: &Tensor,
        wr_x: &Tensor,
    ) -> Result<Tensor> {
        let gate = (bn_eval(&self.bn_gfu, wgf_u)? + bn_eval(&self.bn_grx, wgr_x)?)?;
        let gate = candle_nn::ops::sigmoid(&gate)?;
        let feed_forward = bn_eval(&self.bn_fu, wf_u)?;
        let recurrent = bn_eval(&self.bn_rx, wr_x)?.mul(&gate)?;
        let recurrent = bn_eval(&self.bn_gx, &recurrent)?;
        (feed_forward + recurrent)?.relu()
    }
}

/// Gated recurrent convolution layer.
#[derive(Debug, Clone)]
struct Grcl {
    wgf_u: Conv2d,
    wgr_x: Conv2d,
    wf_u: Conv2d,
    wr_x: Conv2d,
    bn_x_init: BatchNorm,
    units: Vec<GrclUnit>,
}

impl Grcl {
    fn load(
        input_channel: usize,
        output_channel: usize,
        num_iteration: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let units = (0..num_iteration)
            .map(|i| GrclUnit::load(output_channel, vb.pp("GRCL").pp(i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            wgf_u: conv2d(input_channel, output_channel, 1, 1, 0, false, vb.pp("wgf_u"))?,
            wgr_x: conv2d(output_channel, output_channel, 1, 1, 0, false, vb.pp("wgr_x"))?,
            wf_u: conv2d(input_channel, output_channel, 3, 1, 1, false, vb.pp("wf_u"))?,
            wr_x: conv2d(output_channel, output_channel, 3, 1, 1, false, vb.pp("wr_x"))?,
            bn_x_init: batch_norm(output_channel, vb.pp("BN_x_init"))?,
            units,
        })
    }
}

impl Module for Grcl {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let wgf_u = self.wgf_u.forward(input)?;
        let wf_u = self.wf_u.forward(input)?;
        let mut x = bn_eval(&self.bn_x_init, &wf_u)?.relu()?;
        for unit in &self.units {
            let wgr_x = self.wgr_x.forward(&x)?;
            let wr_x = self.wr_x.forward(&x)?;
            x = unit.forward(&wgf_u, &wgr_x, &wf_u, &wr_x)?;
        }
        Ok(x)
    }
}

/// GRCNN backbone: `[B, C_in, 32, W]` -> `[B, output_channel, 1, W/4 + 1]`.
#[derive(Debug, Clone)]
pub struct RcnnFeatureExtractor {
    conv0: Conv2d,
    grcl1: Grcl,
    grcl2: Grcl,
    grcl3: Grcl,
    head: ConvBnRelu,
}

impl RcnnFeatureExtractor {
    pub fn load(input_channel: usize, output_channel: usize, vb: VarBuilder) -> Result<Self> {
        let net = vb.pp("ConvNet");
        let c = [
            output_channel / 8,
            output_channel / 4,
            output_channel / 2,
            output_channel,
        ];
        let head = ConvBnRelu::from_parts(
            conv2d(c[2], c[3], 2, 1, 0, false, net.pp(9))?,
            batch_norm(c[3], net.pp(10))?,
        );
        Ok(Self {
            conv0: conv2d(input_channel, c[0], 3, 1, 1, true, net.pp(0))?,
            grcl1: Grcl::load(c[0], c[0], GRCL_ITERATIONS, net.pp(3))?,
            grcl2: Grcl::load(c[0], c[1], GRCL_ITERATIONS, net.pp(5))?,
            grcl3: Grcl::load(c[1], c[2], GRCL_ITERATIONS, net.pp(7))?,
            head,
        })
    }
}

impl Module for RcnnFeatureExtractor {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.conv0.forward(x)?.relu()?;
        let x = max_pool2d(&x, (2, 2), (2, 2), (0, 0))?;
        let x = self.grcl1.forward(&x)?;
        let x = max_pool2d(&x, (2, 2), (2, 2), (0, 0))?;
        let x = self.grcl2.forward(&x)?;
        let x = max_pool2d(&x, (2, 2), (2, 1), (0, 1))?;
        let x = self.grcl3.forward(&x)?;
        let x = max_pool2d(&x, (2, 2), (2, 1), (0, 1))?;
        self.head.forward(&x)
    }
}
