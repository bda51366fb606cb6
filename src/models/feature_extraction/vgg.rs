//! VGG-style convolutional backbone (the CRNN feature extractor).

use candle_core::{Module, Result, Tensor};
use candle_nn::{Conv2d, VarBuilder};

use crate::models::layers::{ConvBnRelu, conv2d, max_pool2d};

/// VGG backbone: `[B, C_in, 32, W]` -> `[B, output_channel, 1, W/4 - 1]`.
///
/// Parameters follow the reference `ConvNet` Sequential indices.
#[derive(Debug, Clone)]
pub struct VggFeatureExtractor {
    conv0: Conv2d,
    conv1: Conv2d,
    conv2: Conv2d,
    conv3: Conv2d,
    block4: ConvBnRelu,
    block5: ConvBnRelu,
    conv6: Conv2d,
}

impl VggFeatureExtractor {
    pub fn load(input_channel: usize, output_channel: usize, vb: VarBuilder) -> Result<Self> {
        let net = vb.pp("ConvNet");
        let c = [
            output_channel / 8,
            output_channel / 4,
            output_channel / 2,
            output_channel,
        ];
        Ok(Self {
            conv0: conv2d(input_channel, c[0], 3, 1, 1, true, net.pp(0))?,
            conv1: conv2d(c[0], c[1], 3, 1, 1, true, net.pp(3))?,
            conv2: conv2d(c[1], c[2], 3, 1, 1, true, net.pp(6))?,
            conv3: conv2d(c[2], c[2], 3, 1, 1, true, net.pp(8))?,
            block4: ConvBnRelu::load_3x3(c[2], c[3], net.pp(11), net.pp(12))?,
            block5: ConvBnRelu::load_3x3(c[3], c[3], net.pp(14), net.pp(15))?,
            conv6: conv2d(c[3], c[3], 2, 1, 0, true, net.pp(18))?,
        })
    }
}

impl Module for VggFeatureExtractor {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.conv0.forward(x)?.relu()?;
        let x = max_pool2d(&x, (2, 2), (2, 2), (0, 0))?;
        let x = self.conv1.forward(&x)?.relu()?;
        let x = max_pool2d(&x, (2, 2), (2, 2), (0, 0))?;
        let x = self.conv2.forward(&x)?.relu()?;
        let x = self.conv3.forward(&x)?.relu()?;
        let x = max_pool2d(&x, (2, 1), (2, 1), (0, 0))?;
        let x = self.block4.forward(&x)?;
        let x = self.block5.forward(&x)?;
        let x = max_pool2d(&x, (2, 1), (2, 1), (0, 0))?;
        self.conv6.forward(&x)?.relu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_vgg_output_shape() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let net = VggFeatureExtractor::load(1, 32, vb).unwrap();
        let x = Tensor::zeros((2, 1, 32, 100), DType::F32, &device).unwrap();
        let y = net.forward(&x).unwrap();
        assert_eq!(y.dims(), &[2, 32, 1, 24]);
    }

    #[test]
    fn test_vgg_taller_input_keeps_height() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let net = VggFeatureExtractor::load(3, 16, vb).unwrap();
        let x = Tensor::zeros((1, 3, 64, 128), DType::F32, &device).unwrap();
        let y = net.forward(&x).unwrap();
        // 64 -> 32 -> 16 -> 8 -> 4 -> conv 2x2 -> 3; 128 -> 64 -> 32 -> conv -> 31
        assert_eq!(y.dims(), &[1, 16, 3, 31]);
    }
}
