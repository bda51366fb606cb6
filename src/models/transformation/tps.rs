//! Thin-plate-spline (TPS) spatial transformer network.
//!
//! A localization network regresses `F` fiducial points on the input image;
//! the grid generator maps the fixed fiducials of the rectified image onto the
//! predicted ones with a thin-plate spline, and the input is resampled on the
//! resulting grid. The rectified image has the same size as the input.

use candle_core::{D, DType, Device, Module, Result, Tensor};
use candle_nn::{Linear, VarBuilder};
use nalgebra::DMatrix;

use crate::core::OCRError;
use crate::core::constants::TPS_RBF_EPS;
use crate::models::layers::{ConvBnRelu, global_avg_pool, max_pool2d};

/// Regresses fiducial points `[B, F, 2]` from an image batch.
#[derive(Debug, Clone)]
struct LocalizationNetwork {
    convs: Vec<ConvBnRelu>,
    fc1: Linear,
    fc2: Linear,
    num_fiducial: usize,
}

impl LocalizationNetwork {
    const CHANNELS: [usize; 4] = [64, 128, 256, 512];

    fn load(num_fiducial: usize, input_channel: usize, vb: VarBuilder) -> Result<Self> {
        let conv_vb = vb.pp("conv");
        let mut convs = Vec::with_capacity(Self::CHANNELS.len());
        let mut in_channels = input_channel;
        // conv/bn pairs sit at Sequential indices 0/1, 4/5, 8/9, 12/13.
        for (i, &out_channels) in Self::CHANNELS.iter().enumerate() {
            convs.push(ConvBnRelu::load_3x3(
                in_channels,
                out_channels,
                conv_vb.pp(4 * i),
                conv_vb.pp(4 * i + 1),
            )?);
            in_channels = out_channels;
        }
        let fc1 = candle_nn::linear(512, 256, vb.pp("localization_fc1").pp(0))?;
        let fc2 = candle_nn::linear(256, num_fiducial * 2, vb.pp("localization_fc2"))?;
        Ok(Self {
            convs,
            fc1,
            fc2,
            num_fiducial,
        })
    }
}

impl Module for LocalizationNetwork {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let batch_size = x.dim(0)?;
        let mut x = x.clone();
        let last = self.convs.len() - 1;
        for (i, conv) in self.convs.iter().enumerate() {
            x = conv.forward(&x)?;
            if i < last {
                x = max_pool2d(&x, (2, 2), (2, 2), (0, 0))?;
            }
        }
        let features = global_avg_pool(&x)?;
        let hidden = self.fc1.forward(&features)?.relu()?;
        self.fc2
            .forward(&hidden)?
            .reshape((batch_size, self.num_fiducial, 2))
    }
}

/// Fiducial points of the rectified image: `F/2` along the top edge and
/// `F/2` along the bottom edge, evenly spaced in `x`.
fn build_fiducials(num_fiducial: usize) -> Vec<[f64; 2]> {
    let half = num_fiducial / 2;
    let xs: Vec<f64> = (0..half)
        .map(|i| {
            if half == 1 {
                -1.0
            } else {
                -1.0 + 2.0 * i as f64 / (half - 1) as f64
            }
        })
        .collect();
    let top = xs.iter().map(|&x| [x, -1.0]);
    let bottom = xs.iter().map(|&x| [x, 1.0]);
    top.chain(bottom).collect()
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Inverse of the `(F+3) x (F+3)` TPS system matrix.
fn build_inv_delta_c(fiducials: &[[f64; 2]]) -> std::result::Result<DMatrix<f64>, OCRError> {
    let f = fiducials.len();
    let mut delta = DMatrix::<f64>::zeros(f + 3, f + 3);
    for i in 0..f {
        delta[(i, 0)] = 1.0;
        delta[(i, 1)] = fiducials[i][0];
        delta[(i, 2)] = fiducials[i][1];
        for j in 0..f {
            // r^2 log r, with the diagonal set to r = 1 (so 0).
            let r = if i == j {
                1.0
            } else {
                distance(fiducials[i], fiducials[j])
            };
            delta[(i, 3 + j)] = r * r * r.ln();
        }
        delta[(f, 3 + i)] = fiducials[i][0];
        delta[(f + 1, 3 + i)] = fiducials[i][1];
        delta[(f + 2, 3 + i)] = 1.0;
    }
    delta.try_inverse().ok_or_else(|| {
        OCRError::config_error(format!(
            "TPS system with {} fiducial points is singular",
            f
        ))
    })
}

/// `P_hat`: for every output pixel centre `p`, the row `[1, p.x, p.y, U(|p - c_k|)...]`.
fn build_p_hat(fiducials: &[[f64; 2]], height: usize, width: usize) -> Vec<f32> {
    let f = fiducials.len();
    let grid = |size: usize, i: usize| (2.0 * i as f64 - size as f64 + 1.0) / size as f64;
    let mut out = Vec::with_capacity(height * width * (f + 3));
    for y in 0..height {
        let py = grid(height, y);
        for x in 0..width {
            let px = grid(width, x);
            out.push(1.0);
            out.push(px as f32);
            out.push(py as f32);
            for c in fiducials {
                let r = distance([px, py], *c);
                out.push((r * r * (r + TPS_RBF_EPS).ln()) as f32);
            }
        }
    }
    out
}

/// Maps predicted fiducials to a sampling grid over the rectified image.
#[derive(Debug, Clone)]
struct GridGenerator {
    /// `(F+3, F+3)`
    inv_delta_c: Tensor,
    /// `(H*W, F+3)`
    p_hat: Tensor,
    num_fiducial: usize,
    height: usize,
    width: usize,
}

impl GridGenerator {
    fn new(
        num_fiducial: usize,
        height: usize,
        width: usize,
        device: &Device,
        dtype: DType,
    ) -> std::result::Result<Self, OCRError> {
        let fiducials = build_fiducials(num_fiducial);
        let inv = build_inv_delta_c(&fiducials)?;
        let k = num_fiducial + 3;
        let mut inv_data = Vec::with_capacity(k * k);
        for i in 0..k {
            for j in 0..k {
                inv_data.push(inv[(i, j)] as f32);
            }
        }
        let build = || -> Result<(Tensor, Tensor)> {
            let inv_delta_c = Tensor::from_vec(inv_data, (k, k), device)?.to_dtype(dtype)?;
            let p_hat = Tensor::from_vec(
                build_p_hat(&fiducials, height, width),
                (height * width, k),
                device,
            )?
            .to_dtype(dtype)?;
            Ok((inv_delta_c, p_hat))
        };
        let (inv_delta_c, p_hat) = build().map_err(|e| {
            OCRError::inference_error("TPS", "build grid generator buffers", e)
        })?;
        Ok(Self {
            inv_delta_c,
            p_hat,
            num_fiducial,
            height,
            width,
        })
    }

    /// `[B, F, 2]` fiducials -> `[B, H, W, 2]` sampling grid in `[-1, 1]`.
    fn build_grid(&self, c_prime: &Tensor) -> Result<Tensor> {
        let batch_size = c_prime.dim(0)?;
        let k = self.num_fiducial + 3;
        let zeros = Tensor::zeros((batch_size, 3, 2), c_prime.dtype(), c_prime.device())?;
        let c_prime = Tensor::cat(&[c_prime, &zeros], 1)?;
        let inv = self
            .inv_delta_c
            .unsqueeze(0)?
            .broadcast_as((batch_size, k, k))?
            .contiguous()?;
        let transform = inv.matmul(&c_prime)?;
        let n = self.height * self.width;
        let p_hat = self
            .p_hat
            .unsqueeze(0)?
            .broadcast_as((batch_size, n, k))?
            .contiguous()?;
        p_hat
            .matmul(&transform)?
            .reshape((batch_size, self.height, self.width, 2))
    }
}

/// Bilinear sampling with border padding and `align_corners = false`.
///
/// `input` is `[B, C, H, W]`, `grid` is `[B, Ho, Wo, 2]` holding normalised
/// `(x, y)` coordinates; the result is `[B, C, Ho, Wo]`.
pub(crate) fn grid_sample_bilinear_border(input: &Tensor, grid: &Tensor) -> Result<Tensor> {
    let (b, c, h, w) = input.dims4()?;
    let (_, out_h, out_w, _) = grid.dims4()?;
    let n = out_h * out_w;
    let grid = grid.reshape((b, n, 2))?.to_dtype(DType::F32)?;

    // Unnormalise to pixel coordinates and clamp to the border.
    let ix = grid
        .narrow(D::Minus1, 0, 1)?
        .squeeze(D::Minus1)?
        .affine(w as f64 / 2.0, (w as f64 - 1.0) / 2.0)?
        .clamp(0f32, (w - 1) as f32)?;
    let iy = grid
        .narrow(D::Minus1, 1, 1)?
        .squeeze(D::Minus1)?
        .affine(h as f64 / 2.0, (h as f64 - 1.0) / 2.0)?
        .clamp(0f32, (h - 1) as f32)?;

    let x0 = ix.floor()?;
    let y0 = iy.floor()?;
    let x1 = (&x0 + 1.0)?.clamp(0f32, (w - 1) as f32)?;
    let y1 = (&y0 + 1.0)?.clamp(0f32, (h - 1) as f32)?;
    let wx1 = (&ix - &x0)?;
    let wy1 = (&iy - &y0)?;
    let wx0 = wx1.affine(-1.0, 1.0)?;
    let wy0 = wy1.affine(-1.0, 1.0)?;

    let flat = input.reshape((b, c, h * w))?;
    let gather = |yy: &Tensor, xx: &Tensor| -> Result<Tensor> {
        let idx = yy
            .affine(w as f64, 0.0)?
            .add(xx)?
            .to_dtype(DType::U32)?
            .unsqueeze(1)?
            .broadcast_as((b, c, n))?
            .contiguous()?;
        flat.gather(&idx, 2)
    };
    let weight = |a: &Tensor, bb: &Tensor| -> Result<Tensor> {
        a.mul(bb)?.to_dtype(input.dtype())?.unsqueeze(1)
    };

    let v00 = gather(&y0, &x0)?.broadcast_mul(&weight(&wy0, &wx0)?)?;
    let v01 = gather(&y0, &x1)?.broadcast_mul(&weight(&wy0, &wx1)?)?;
    let v10 = gather(&y1, &x0)?.broadcast_mul(&weight(&wy1, &wx0)?)?;
    let v11 = gather(&y1, &x1)?.broadcast_mul(&weight(&wy1, &wx1)?)?;
    let out = (((v00 + v01)? + v10)? + v11)?;
    out.reshape((b, c, out_h, out_w))
}

/// TPS spatial transformer: rectifies `[B, C, H, W]` into `[B, C, H, W]`.
#[derive(Debug, Clone)]
pub struct TpsSpatialTransformer {
    localization: LocalizationNetwork,
    grid_generator: GridGenerator,
}

impl TpsSpatialTransformer {
    /// Builds the transformer.
    ///
    /// # Arguments
    ///
    /// * `num_fiducial` - Number of fiducial points `F` (even, at least 4).
    /// * `image_size` - `(height, width)` of both the input and the rectified image.
    /// * `input_channel` - Number of image channels.
    /// * `vb` - Weights under the `Transformation` prefix.
    pub fn load(
        num_fiducial: usize,
        image_size: (usize, usize),
        input_channel: usize,
        vb: VarBuilder,
    ) -> std::result::Result<Self, OCRError> {
        if num_fiducial < 4 || num_fiducial % 2 != 0 {
            return Err(OCRError::config_error_with_context(
                "num_fiducial",
                &num_fiducial.to_string(),
                "TPS needs an even number of at least 4 fiducial points",
            ));
        }
        let grid_generator = GridGenerator::new(
            num_fiducial,
            image_size.0,
            image_size.1,
            vb.device(),
            vb.dtype(),
        )?;
        let localization =
            LocalizationNetwork::load(num_fiducial, input_channel, vb.pp("LocalizationNetwork"))
                .map_err(|e| OCRError::inference_error("TPS", "load localization network", e))?;
        Ok(Self {
            localization,
            grid_generator,
        })
    }
}

impl Module for TpsSpatialTransformer {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let c_prime = self.localization.forward(x)?;
        let grid = self.grid_generator.build_grid(&c_prime)?;
        grid_sample_bilinear_border(x, &grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fiducials_layout() {
        let c = build_fiducials(4);
        assert_eq!(c, vec![[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]]);
        assert_eq!(build_fiducials(20).len(), 20);
    }

    #[test]
    fn test_inv_delta_c_is_inverse() {
        let fiducials = build_fiducials(20);
        let inv = build_inv_delta_c(&fiducials).unwrap();
        let inv_again = inv.clone().try_inverse().unwrap();
        let identity = inv * inv_again;
        for i in 0..23 {
            for j in 0..23 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((identity[(i, j)] - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_identity_fiducials_reproduce_pixel_grid() {
        // Feeding the rest-position fiducials back in must give back P itself.
        let device = Device::Cpu;
        let gen_ = GridGenerator::new(10, 4, 6, &device, DType::F32).unwrap();
        let fiducials: Vec<f32> = build_fiducials(10)
            .into_iter()
            .flat_map(|p| [p[0] as f32, p[1] as f32])
            .collect();
        let c = Tensor::from_vec(fiducials, (1, 10, 2), &device).unwrap();
        let grid = gen_.build_grid(&c).unwrap();
        assert_eq!(grid.dims(), &[1, 4, 6, 2]);
        let values = grid.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        // first pixel centre: x = -5/6, y = -3/4
        assert!((values[0] + 5.0 / 6.0).abs() < 1e-3, "got {}", values[0]);
        assert!((values[1] + 0.75).abs() < 1e-3, "got {}", values[1]);
    }

    #[test]
    fn test_grid_sample_identity_grid() {
        let device = Device::Cpu;
        let (h, w) = (3usize, 4usize);
        let data: Vec<f32> = (0..h * w).map(|v| v as f32).collect();
        let input = Tensor::from_vec(data.clone(), (1, 1, h, w), &device).unwrap();
        let mut grid = Vec::new();
        for y in 0..h {
            for x in 0..w {
                grid.push((2.0 * x as f32 + 1.0) / w as f32 - 1.0);
                grid.push((2.0 * y as f32 + 1.0) / h as f32 - 1.0);
            }
        }
        let grid = Tensor::from_vec(grid, (1, h, w, 2), &device).unwrap();
        let out = grid_sample_bilinear_border(&input, &grid).unwrap();
        let out = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for (a, b) in out.iter().zip(data.iter()) {
            assert!((a - b).abs() < 1e-5, "{a} != {b}");
        }
    }

    #[test]
    fn test_grid_sample_clamps_to_border() {
        let device = Device::Cpu;
        let input = Tensor::from_vec(vec![1f32, 2., 3., 4.], (1, 1, 2, 2), &device).unwrap();
        let grid = Tensor::from_vec(vec![-5f32, -5., 5., 5.], (1, 1, 2, 2), &device).unwrap();
        let out = grid_sample_bilinear_border(&input, &grid).unwrap();
        assert_eq!(
            out.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![1.0, 4.0]
        );
    }

    #[test]
    fn test_tps_rejects_odd_fiducials() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let result = TpsSpatialTransformer::load(7, (32, 100), 1, vb);
        assert!(matches!(result, Err(OCRError::ConfigError { .. })));
    }

    #[test]
    fn test_tps_forward_keeps_shape() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let tps = TpsSpatialTransformer::load(20, (32, 100), 1, vb).unwrap();
        let x = Tensor::ones((2, 1, 32, 100), DType::F32, &device).unwrap();
        let y = tps.forward(&x).unwrap();
        assert_eq!(y.dims(), &[2, 1, 32, 100]);
    }
}
