//! Attention decoder: an LSTM cell attending over the contextual features and
//! emitting one class per step.

use candle_core::{DType, Module, Result, Tensor};
use candle_nn::{Linear, VarBuilder};

/// Single LSTM cell with the PyTorch `LSTMCell` parameter layout
/// (`weight_ih`, `weight_hh`, `bias_ih`, `bias_hh`, gates ordered `i, f, g, o`).
#[derive(Debug, Clone)]
struct LstmCell {
    weight_ih: Tensor,
    weight_hh: Tensor,
    bias_ih: Tensor,
    bias_hh: Tensor,
}

impl LstmCell {
    fn load(input_size: usize, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            weight_ih: vb.get((4 * hidden_size, input_size), "weight_ih")?,
            weight_hh: vb.get((4 * hidden_size, hidden_size), "weight_hh")?,
            bias_ih: vb.get(4 * hidden_size, "bias_ih")?,
            bias_hh: vb.get(4 * hidden_size, "bias_hh")?,
        })
    }

    /// One step: `x [B, in]`, `(h, c) [B, H]` -> new `(h, c)`.
    fn step(&self, x: &Tensor, h: &Tensor, c: &Tensor) -> Result<(Tensor, Tensor)> {
        let gates = x
            .matmul(&self.weight_ih.t()?)?
            .broadcast_add(&self.bias_ih)?;
        let gates = (gates
            + h.matmul(&self.weight_hh.t()?)?
                .broadcast_add(&self.bias_hh)?)?;
        let chunks = gates.chunk(4, 1)?;
        let input_gate = candle_nn::ops::sigmoid(&chunks[0])?;
        let forget_gate = candle_nn::ops::sigmoid(&chunks[1])?;
        let cell_gate = chunks[2].tanh()?;
        let output_gate = candle_nn::ops::sigmoid(&chunks[3])?;

        let next_c = ((forget_gate * c)? + (input_gate * cell_gate)?)?;
        let next_h = (output_gate * next_c.tanh()?)?;
        Ok((next_h, next_c))
    }
}

#[derive(Debug, Clone)]
struct AttentionCell {
    i2h: Linear,
    h2h: Linear,
    score: Linear,
    rnn: LstmCell,
}

impl AttentionCell {
    fn load(
        input_size: usize,
        hidden_size: usize,
        num_embeddings: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            i2h: candle_nn::linear_no_bias(input_size, hidden_size, vb.pp("i2h"))?,
            h2h: candle_nn::linear(hidden_size, hidden_size, vb.pp("h2h"))?,
            score: candle_nn::linear_no_bias(hidden_size, 1, vb.pp("score"))?,
            rnn: LstmCell::load(input_size + num_embeddings, hidden_size, vb.pp("rnn"))?,
        })
    }

    /// Attends over `batch_h` and advances the LSTM state by one step.
    ///
    /// `batch_h_proj` is `i2h(batch_h)`, which does not depend on the step.
    fn step(
        &self,
        state: &(Tensor, Tensor),
        batch_h: &Tensor,
        batch_h_proj: &Tensor,
        char_onehots: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        let (prev_h, prev_c) = state;
        let prev_h_proj = self.h2h.forward(prev_h)?.unsqueeze(1)?;
        let e = self
            .score
            .forward(&batch_h_proj.broadcast_add(&prev_h_proj)?.tanh()?)?;
        let alpha = candle_nn::ops::softmax(&e, 1)?;
        let context = alpha.transpose(1, 2)?.matmul(batch_h)?.squeeze(1)?;
        let concat = Tensor::cat(&[&context, char_onehots], 1)?;
        self.rnn.step(&concat, prev_h, prev_c)
    }
}

/// Attention-based decoder.
///
/// Parameters live under `attention_cell.*` and `generator.*`.
#[derive(Debug, Clone)]
pub struct Attention {
    cell: AttentionCell,
    generator: Linear,
    hidden_size: usize,
    num_class: usize,
}

impl Attention {
    pub fn load(
        input_size: usize,
        hidden_size: usize,
        num_class: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            cell: AttentionCell::load(input_size, hidden_size, num_class, vb.pp("attention_cell"))?,
            generator: candle_nn::linear(hidden_size, num_class, vb.pp("generator"))?,
            hidden_size,
            num_class,
        })
    }

    pub fn num_class(&self) -> usize {
        self.num_class
    }

    fn initial_state(&self, batch_h: &Tensor) -> Result<(Tensor, Tensor)> {
        let batch_size = batch_h.dim(0)?;
        let zeros = Tensor::zeros(
            (batch_size, self.hidden_size),
            batch_h.dtype(),
            batch_h.device(),
        )?;
        Ok((zeros.clone(), zeros))
    }

    fn onehot(&self, ids: &Tensor, dtype: DType) -> Result<Tensor> {
        candle_nn::encoding::one_hot(ids.to_dtype(DType::U32)?, self.num_class, 1f32, 0f32)?
            .to_dtype(dtype)
    }

    /// Teacher-forced decoding.
    ///
    /// `batch_h` is `[B, T, input_size]`, `text` holds `[B, >= num_steps]`
    /// class ids whose column `i` is fed at step `i`. Returns
    /// `[B, num_steps, num_class]` logits.
    pub fn forward_teacher_forced(
        &self,
        batch_h: &Tensor,
        text: &Tensor,
        num_steps: usize,
    ) -> Result<Tensor> {
        let batch_h = batch_h.contiguous()?;
        let batch_h_proj = self.cell.i2h.forward(&batch_h)?;
        let mut state = self.initial_state(&batch_h)?;
        let mut hiddens = Vec::with_capacity(num_steps);
        for i in 0..num_steps {
            let ids = text.narrow(1, i, 1)?.squeeze(1)?;
            let onehots = self.onehot(&ids, batch_h.dtype())?;
            state = self.cell.step(&state, &batch_h, &batch_h_proj, &onehots)?;
            hiddens.push(state.0.clone());
        }
        let hiddens = Tensor::stack(&hiddens, 1)?;
        self.generator.forward(&hiddens)
    }

    /// Greedy decoding starting from the `[GO]` id 0; each step feeds back
    /// the argmax of the previous step. Returns `[B, num_steps, num_class]`.
    pub fn forward_greedy(&self, batch_h: &Tensor, num_steps: usize) -> Result<Tensor> {
        let batch_h = batch_h.contiguous()?;
        let batch_size = batch_h.dim(0)?;
        let batch_h_proj = self.cell.i2h.forward(&batch_h)?;
        let mut state = self.initial_state(&batch_h)?;
        let mut targets = Tensor::zeros(batch_size, DType::U32, batch_h.device())?;
        let mut probs = Vec::with_capacity(num_steps);
        for _ in 0..num_steps {
            let onehots = self.onehot(&targets, batch_h.dtype())?;
            state = self.cell.step(&state, &batch_h, &batch_h_proj, &onehots)?;
            let step_logits = self.generator.forward(&state.0)?;
            targets = step_logits.argmax(1)?;
            probs.push(step_logits);
        }
        Tensor::stack(&probs, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use std::collections::HashMap;

    /// A one-unit decoder over three classes whose attention is uniform. The
    /// LSTM ignores the context and the previous state and reads only the fed
    /// one-hot: `[GO]` (0) leaves every gate at 0, class 1 drives all gates
    /// with -1, class 2 with +1. The generator favours class 2 by a bias of
    /// 1 and maps the hidden state `h` to `(0, 10 h, -10 h)`.
    fn feedback_decoder(device: &Device) -> Attention {
        let zeros = |shape: &[usize]| Tensor::zeros(shape, DType::F32, device).unwrap();
        let mut tensors = HashMap::new();
        tensors.insert("attention_cell.i2h.weight".to_string(), zeros(&[1, 1]));
        tensors.insert("attention_cell.h2h.weight".to_string(), zeros(&[1, 1]));
        tensors.insert("attention_cell.h2h.bias".to_string(), zeros(&[1]));
        tensors.insert("attention_cell.score.weight".to_string(), zeros(&[1, 1]));
        // Input columns: context, [GO], class 1, class 2.
        let weight_ih = Tensor::new(&[[0f32, 0.0, -1.0, 1.0]; 4], device).unwrap();
        tensors.insert("attention_cell.rnn.weight_ih".to_string(), weight_ih);
        tensors.insert("attention_cell.rnn.weight_hh".to_string(), zeros(&[4, 1]));
        tensors.insert("attention_cell.rnn.bias_ih".to_string(), zeros(&[4]));
        tensors.insert("attention_cell.rnn.bias_hh".to_string(), zeros(&[4]));
        let generator = Tensor::new(&[[0f32], [10.0], [-10.0]], device).unwrap();
        tensors.insert("generator.weight".to_string(), generator);
        let bias = Tensor::new(&[0f32, 0.0, 1.0], device).unwrap();
        tensors.insert("generator.bias".to_string(), bias);
        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        Attention::load(1, 1, 3, vb).unwrap()
    }

    #[test]
    fn test_lstm_cell_zero_weights() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let cell = LstmCell::load(3, 2, vb).unwrap();
        let x = Tensor::ones((1, 3), DType::F32, &device).unwrap();
        let h = Tensor::zeros((1, 2), DType::F32, &device).unwrap();
        let c = Tensor::ones((1, 2), DType::F32, &device).unwrap();
        let (h, c) = cell.step(&x, &h, &c).unwrap();
        // All gates are sigmoid(0) = 0.5 and tanh(0) = 0: c' = 0.5 * c.
        let c = c.to_vec2::<f32>().unwrap();
        assert!((c[0][0] - 0.5).abs() < 1e-6);
        let expected_h = 0.5 * 0.5f32.tanh();
        let h = h.to_vec2::<f32>().unwrap();
        assert!((h[0][1] - expected_h).abs() < 1e-6);
    }

    #[test]
    fn test_teacher_forced_shape() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let attn = Attention::load(16, 8, 6, vb).unwrap();
        let batch_h = Tensor::ones((2, 10, 16), DType::F32, &device).unwrap();
        let text = Tensor::new(&[[0u32, 3, 4, 1], [0, 2, 1, 0]], &device).unwrap();
        let out = attn.forward_teacher_forced(&batch_h, &text, 4).unwrap();
        assert_eq!(out.dims(), &[2, 4, 6]);
    }

    #[test]
    fn test_teacher_forced_accepts_i64_ids() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let attn = Attention::load(4, 4, 5, vb).unwrap();
        let batch_h = Tensor::ones((1, 3, 4), DType::F32, &device).unwrap();
        let text = Tensor::new(&[[0i64, 2, 1]], &device).unwrap();
        let out = attn.forward_teacher_forced(&batch_h, &text, 3).unwrap();
        assert_eq!(out.dims(), &[1, 3, 5]);
    }

    #[test]
    fn test_greedy_shape() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let attn = Attention::load(16, 8, 6, vb).unwrap();
        assert_eq!(attn.num_class(), 6);
        let batch_h = Tensor::ones((3, 10, 16), DType::F32, &device).unwrap();
        let out = attn.forward_greedy(&batch_h, 5).unwrap();
        assert_eq!(out.dims(), &[3, 5, 6]);
    }

    #[test]
    fn test_greedy_feeds_back_previous_argmax() {
        let device = Device::Cpu;
        let attn = feedback_decoder(&device);
        let batch_h = Tensor::ones((1, 2, 1), DType::F32, &device).unwrap();
        let logits = attn.forward_greedy(&batch_h, 4).unwrap();
        let ids = logits.argmax(2).unwrap().to_vec2::<u32>().unwrap();
        // [GO] -> 2 (bias only), 2 -> 1 (h > 0), 1 -> 2 (h < 0), 2 -> 1.
        assert_eq!(ids, vec![vec![2, 1, 2, 1]]);
    }

    #[test]
    fn test_teacher_forced_follows_given_text() {
        let device = Device::Cpu;
        let attn = feedback_decoder(&device);
        let batch_h = Tensor::ones((1, 2, 1), DType::F32, &device).unwrap();
        // Feeding [GO] every step keeps the state at zero, so the bias wins throughout.
        let text = Tensor::new(&[[0u32, 0, 0]], &device).unwrap();
        let logits = attn.forward_teacher_forced(&batch_h, &text, 3).unwrap();
        let ids = logits.argmax(2).unwrap().to_vec2::<u32>().unwrap();
        assert_eq!(ids, vec![vec![2, 2, 2]]);
    }
}
