//! ResNet backbone used for scene text recognition (FAN-style, layers `[1, 2, 5, 3]`).

use candle_core::{Module, Result, Tensor};
use candle_nn::{BatchNorm, Conv2d, VarBuilder};

use crate::models::layers::{
    ConvBnRelu, StridedConv2d, batch_norm, bn_eval, conv2d, max_pool2d,
};

const LAYERS: [usize; 4] = [1, 2, 5, 3];

/// Residual block with two 3x3 convolutions.
#[derive(Debug, Clone)]
struct BasicBlock {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    downsample: Option<(Conv2d, BatchNorm)>,
}

impl BasicBlock {
    fn load(inplanes: usize, planes: usize, vb: VarBuilder) -> Result<Self> {
        let downsample = if inplanes != planes {
            let ds = vb.pp("downsample");
            Some((
                conv2d(inplanes, planes, 1, 1, 0, false, ds.pp(0))?,
                batch_norm(planes, ds.pp(1))?,
            ))
        } else {
            None
        };
        Ok(Self {
            conv1: conv2d(inplanes, planes, 3, 1, 1, false, vb.pp("conv1"))?,
            bn1: batch_norm(planes, vb.pp("bn1"))?,
            conv2: conv2d(planes, planes, 3, 1, 1, false, vb.pp("conv2"))?,
            bn2: batch_norm(planes, vb.pp("bn2"))?,
            downsample,
        })
    }
}

impl Module for BasicBlock {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let out = bn_eval(&self.bn1, &self.conv1.forward(x)?)?.relu()?;
        let out = bn_eval(&self.bn2, &self.conv2.forward(&out)?)?;
        let residual = match &self.downsample {
            Some((conv, bn)) => bn_eval(bn, &conv.forward(x)?)?,
            None => x.clone(),
        };
        (out + residual)?.relu()
    }
}

/// Builds one residual stage and advances `inplanes` to its output width.
fn make_layer(
    inplanes: &mut usize,
    planes: usize,
    blocks: usize,
    vb: VarBuilder,
) -> Result<Vec<BasicBlock>> {
    let mut layer = Vec::with_capacity(blocks);
    for i in 0..blocks {
        layer.push(BasicBlock::load(*inplanes, planes, vb.pp(i))?);
        *inplanes = planes;
    }
    Ok(layer)
}

fn forward_layer(layer: &[BasicBlock], x: &Tensor) -> Result<Tensor> {
    layer.iter().try_fold(x.clone(), |x, block| block.forward(&x))
}

/// ResNet backbone: `[B, C_in, 32, W]` -> `[B, output_channel, 1, W/4 + 1]`.
#[derive(Debug, Clone)]
pub struct ResNetFeatureExtractor {
    stem1: ConvBnRelu,
    stem2: ConvBnRelu,
    layer1: Vec<BasicBlock>,
    block1: ConvBnRelu,
    layer2: Vec<BasicBlock>,
    block2: ConvBnRelu,
    layer3: Vec<BasicBlock>,
    block3: ConvBnRelu,
    layer4: Vec<BasicBlock>,
    conv4_1: StridedConv2d,
    bn4_1: BatchNorm,
    block4_2: ConvBnRelu,
}

impl ResNetFeatureExtractor {
    pub fn load(input_channel: usize, output_channel: usize, vb: VarBuilder) -> Result<Self> {
        let net = vb.pp("ConvNet");
        let blocks = [
            output_channel / 4,
            output_channel / 2,
            output_channel,
            output_channel,
        ];
        let mut inplanes = output_channel / 8;

        let stem1 = ConvBnRelu::load_3x3(
            input_channel,
            output_channel / 16,
            net.pp("conv0_1"),
            net.pp("bn0_1"),
        )?;
        let stem2 =
            ConvBnRelu::load_3x3(output_channel / 16, inplanes, net.pp("conv0_2"), net.pp("bn0_2"))?;

        let layer1 = make_layer(&mut inplanes, blocks[0], LAYERS[0], net.pp("layer1"))?;
        let block1 = ConvBnRelu::load_3x3(blocks[0], blocks[0], net.pp("conv1"), net.pp("bn1"))?;
        let layer2 = make_layer(&mut inplanes, blocks[1], LAYERS[1], net.pp("layer2"))?;
        let block2 = ConvBnRelu::load_3x3(blocks[1], blocks[1], net.pp("conv2"), net.pp("bn2"))?;
        let layer3 = make_layer(&mut inplanes, blocks[2], LAYERS[2], net.pp("layer3"))?;
        let block3 = ConvBnRelu::load_3x3(blocks[2], blocks[2], net.pp("conv3"), net.pp("bn3"))?;
        let layer4 = make_layer(&mut inplanes, blocks[3], LAYERS[3], net.pp("layer4"))?;

        let conv4_1 =
            StridedConv2d::load_no_bias(blocks[3], blocks[3], 2, (2, 1), (0, 1), net.pp("conv4_1"))?;
        let bn4_1 = batch_norm(blocks[3], net.pp("bn4_1"))?;
        let block4_2 = ConvBnRelu::from_parts(
            conv2d(blocks[3], blocks[3], 2, 1, 0, false, net.pp("conv4_2"))?,
            batch_norm(blocks[3], net.pp("bn4_2"))?,
        );

        Ok(Self {
            stem1,
            stem2,
            layer1,
            block1,
            layer2,
            block2,
            layer3,
            block3,
            layer4,
            conv4_1,
            bn4_1,
            block4_2,
        })
    }
}

impl Module for ResNetFeatureExtractor {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.stem2.forward(&self.stem1.forward(x)?)?;
        let x = max_pool2d(&x, (2, 2), (2, 2), (0, 0))?;

        let x = self.block1.forward(&forward_layer(&self.layer1, &x)?)?;
        let x = max_pool2d(&x, (2, 2), (2, 2), (0, 0))?;

        let x = self.block2.forward(&forward_layer(&self.layer2, &x)?)?;
        let x = max_pool2d(&x, (2, 2), (2, 1), (0, 1))?;

        let x = self.block3.forward(&forward_layer(&self.layer3, &x)?)?;

        let x = forward_layer(&self.layer4, &x)?;
        let x = bn_eval(&self.bn4_1, &self.conv4_1.forward(&x)?)?.relu()?;
        self.block4_2.forward(&x)
    }
}
