//! Bidirectional LSTM over the width axis of the visual features.

use candle_core::{Module, Result, Tensor};
use candle_nn::rnn::{Direction, LSTM, LSTMConfig, RNN};
use candle_nn::{Linear, VarBuilder};

/// Reverses a `[B, T, C]` tensor along `T`.
fn reverse_time(x: &Tensor) -> Result<Tensor> {
    let len = x.dim(1)?;
    let idx: Vec<u32> = (0..len as u32).rev().collect();
    let idx = Tensor::new(idx.as_slice(), x.device())?;
    x.index_select(&idx, 1)
}

/// Bidirectional single-layer LSTM followed by a linear projection.
///
/// `[B, T, input_size]` -> `[B, T, output_size]`. Weights use the PyTorch
/// layout (`rnn.weight_ih_l0`, `rnn.weight_ih_l0_reverse`, `linear.weight`).
#[derive(Debug, Clone)]
pub struct BidirectionalLstm {
    fwd: LSTM,
    bwd: LSTM,
    linear: Linear,
}

impl BidirectionalLstm {
    pub fn load(
        input_size: usize,
        hidden_size: usize,
        output_size: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let rnn = vb.pp("rnn");
        let fwd = candle_nn::lstm(input_size, hidden_size, LSTMConfig::default(), rnn.clone())?;
        let bwd = candle_nn::lstm(
            input_size,
            hidden_size,
            LSTMConfig {
                direction: Direction::Backward,
                ..Default::default()
            },
            rnn,
        )?;
        let linear = candle_nn::linear(hidden_size * 2, output_size, vb.pp("linear"))?;
        Ok(Self { fwd, bwd, linear })
    }
}

impl Module for BidirectionalLstm {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = x.contiguous()?;
        let forward_states = self.fwd.seq(&x)?;
        let forward_out = self.fwd.states_to_tensor(&forward_states)?;

        let reversed = reverse_time(&x)?;
        let backward_states = self.bwd.seq(&reversed)?;
        let backward_out = reverse_time(&self.bwd.states_to_tensor(&backward_states)?)?;

        let recurrent = Tensor::cat(&[&forward_out, &backward_out], 2)?;
        self.linear.forward(&recurrent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use std::collections::HashMap;

    fn sigmoid(x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }

    /// One input and one hidden unit per direction. Every gate reads the input
    /// with weight 1 and ignores the previous state; the projection is the
    /// identity, so the output is `[h_forward, h_backward]`.
    fn single_unit_lstm(device: &Device) -> BidirectionalLstm {
        let mut tensors = HashMap::new();
        for suffix in ["", "_reverse"] {
            let w_ih = Tensor::ones((4, 1), DType::F32, device).unwrap();
            let w_hh = Tensor::zeros((4, 1), DType::F32, device).unwrap();
            let bias = Tensor::zeros(4, DType::F32, device).unwrap();
            tensors.insert(format!("rnn.weight_ih_l0{suffix}"), w_ih);
            tensors.insert(format!("rnn.weight_hh_l0{suffix}"), w_hh);
            tensors.insert(format!("rnn.bias_ih_l0{suffix}"), bias.clone());
            tensors.insert(format!("rnn.bias_hh_l0{suffix}"), bias);
        }
        let identity = Tensor::new(&[[1f32, 0.0], [0.0, 1.0]], device).unwrap();
        tensors.insert("linear.weight".to_string(), identity);
        tensors.insert(
            "linear.bias".to_string(),
            Tensor::zeros(2, DType::F32, device).unwrap(),
        );
        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        BidirectionalLstm::load(1, 1, 2, vb).unwrap()
    }

    #[test]
    fn test_reverse_time() {
        let x = Tensor::arange(0f32, 6f32, &Device::Cpu)
            .unwrap()
            .reshape((1, 3, 2))
            .unwrap();
        let y = reverse_time(&x).unwrap();
        assert_eq!(
            y.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![4.0, 5.0, 2.0, 3.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_bilstm_output_shape() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let lstm = BidirectionalLstm::load(12, 8, 5, vb).unwrap();
        let x = Tensor::ones((3, 7, 12), DType::F32, &device).unwrap();
        let y = lstm.forward(&x).unwrap();
        assert_eq!(y.dims(), &[3, 7, 5]);
    }

    #[test]
    fn test_backward_direction_reads_the_future() {
        let device = Device::Cpu;
        let lstm = single_unit_lstm(&device);
        // Only the last step carries a signal.
        let x = Tensor::new(&[[[0f32], [0.0], [1.0]]], &device).unwrap();
        let y = lstm.forward(&x).unwrap().squeeze(0).unwrap();
        let y = y.to_vec2::<f32>().unwrap();

        // Step fed 1 from a zero state: every gate is sigmoid(1), the cell
        // candidate tanh(1). Steps fed 0 halve the cell and use an output
        // gate of 0.5.
        let c_hit = sigmoid(1.0) * 1f32.tanh();
        let h_hit = sigmoid(1.0) * c_hit.tanh();
        let h_two_after = 0.5 * (0.25 * c_hit).tanh();

        // The forward direction has seen nothing yet at t = 0.
        assert_eq!(y[0][0], 0.0);
        assert_eq!(y[1][0], 0.0);
        assert!((y[2][0] - h_hit).abs() < 1e-5);

        // The backward direction starts at t = 2 and carries it back to t = 0.
        assert!((y[2][1] - h_hit).abs() < 1e-5);
        assert!((y[0][1] - h_two_after).abs() < 1e-5);
        assert!(y[0][1] > 0.01);
    }
}
