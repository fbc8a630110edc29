use ndarray::{Array2, Array3, Array4};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::layers::{Dropout, FeedForward, LayerNorm};
use crate::model::params::{scoped, NamedParam, NamedParamMut, Parameters};
use crate::model::transformer::{Layer, LayerInputs, LayerStack};
use crate::model::{ModelError, MultiHeadAttention, TransformerConfig};
use crate::utils::ForwardContext;

/// Pre-norm decoder block: masked self-attention, cross-attention over the
/// encoder output, then feed-forward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderLayer {
    pub(crate) norm1: LayerNorm,
    pub(crate) norm2: LayerNorm,
    pub(crate) norm3: LayerNorm,
    pub(crate) dropout1: Dropout,
    pub(crate) dropout2: Dropout,
    pub(crate) dropout3: Dropout,
    pub(crate) self_attn: MultiHeadAttention,
    pub(crate) cross_attn: MultiHeadAttention,
    pub(crate) feed_forward: FeedForward,
}

impl Layer for DecoderLayer {
    fn build<R: Rng + ?Sized>(config: &TransformerConfig, rng: &mut R) -> Result<Self, ModelError> {
        let norm = || LayerNorm::new(config.d_model, config.layer_norm_eps);
        Ok(Self {
            norm1: norm(),
            norm2: norm(),
            norm3: norm(),
            dropout1: Dropout::new(config.dropout),
            dropout2: Dropout::new(config.dropout),
            dropout3: Dropout::new(config.dropout),
            self_attn: MultiHeadAttention::new(config.attention(), rng)?,
            cross_attn: MultiHeadAttention::new(config.attention(), rng)?,
            feed_forward: FeedForward::new(config.d_model, config.d_ff, config.dropout, rng)?,
        })
    }

    fn apply(
        &self,
        x: Array3<f32>,
        inputs: &LayerInputs<'_>,
        ctx: &mut ForwardContext,
    ) -> Result<Array3<f32>, ModelError> {
        let memory = inputs.memory.ok_or(ModelError::MissingMemory)?;

        let x1 = self.norm1.forward(&x)?;
        let attended = self.self_attn.forward(&x1, &x1, &x1, inputs.mask)?;
        let x = x + &self.dropout1.forward(attended, ctx);

        // keys and values come from the encoder, queries from the decoder
        let x2 = self.norm2.forward(&x)?;
        let attended = self.cross_attn.forward(&x2, memory, memory, inputs.memory_mask)?;
        let x = x + &self.dropout2.forward(attended, ctx);

        let x3 = self.norm3.forward(&x)?;
        let transformed = self.feed_forward.forward(&x3, ctx)?;
        Ok(x + &self.dropout3.forward(transformed, ctx))
    }
}

impl Parameters for DecoderLayer {
    fn parameters(&self) -> Vec<NamedParam<'_>> {
        scoped("norm1", self.norm1.parameters())
            .chain(scoped("norm2", self.norm2.parameters()))
            .chain(scoped("norm3", self.norm3.parameters()))
            .chain(scoped("self_attn", self.self_attn.parameters()))
            .chain(scoped("cross_attn", self.cross_attn.parameters()))
            .chain(scoped("feed_forward", self.feed_forward.parameters()))
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<NamedParamMut<'_>> {
        scoped("norm1", self.norm1.parameters_mut())
            .chain(scoped("norm2", self.norm2.parameters_mut()))
            .chain(scoped("norm3", self.norm3.parameters_mut()))
            .chain(scoped("self_attn", self.self_attn.parameters_mut()))
            .chain(scoped("cross_attn", self.cross_attn.parameters_mut()))
            .chain(scoped("feed_forward", self.feed_forward.parameters_mut()))
            .collect()
    }
}

/// Embedding, positional encoding, N decoder layers and a final norm
pub type Decoder = LayerStack<DecoderLayer>;

impl Decoder {
    /// Target ids `[batch, trg_len]` plus encoder output -> `[batch, trg_len, d_model]`
    pub fn decode(
        &self,
        target: &Array2<usize>,
        memory: &Array3<f32>,
        source_mask: Option<&Array4<f32>>,
        target_mask: Option<&Array4<f32>>,
        ctx: &mut ForwardContext,
    ) -> Result<Array3<f32>, ModelError> {
        self.forward(target, &LayerInputs::decoder(memory, source_mask, target_mask), ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::masking::{look_ahead_mask, padding_mask};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, s};
    use rand::{rngs::SmallRng, SeedableRng};

    fn small_config() -> TransformerConfig {
        TransformerConfig::new(20, 8, 2, 4).with_d_ff(16).with_max_len(12)
    }

    fn build_layer(seed: u64) -> DecoderLayer {
        let mut rng = SmallRng::seed_from_u64(seed);
        DecoderLayer::build(&small_config(), &mut rng).unwrap()
    }

    fn memory(batch: usize, len: usize) -> Array3<f32> {
        Array3::from_shape_fn((batch, len, 8), |(b, t, i)| ((b + 2 * t + 3 * i) % 7) as f32 * 0.2 - 0.6)
    }

    #[test]
    fn test_decoder_layer_requires_memory() {
        let layer = build_layer(1);
        let x = Array3::<f32>::zeros((1, 3, 8));
        let result = layer.apply(x, &LayerInputs::default(), &mut ForwardContext::evaluation());
        assert!(matches!(result, Err(ModelError::MissingMemory)));
    }

    #[test]
    fn test_decoder_layer_cross_attends_to_longer_source() {
        let layer = build_layer(2);
        let x = Array3::from_shape_fn((2, 3, 8), |(b, t, i)| (b + t + i) as f32 * 0.05);
        let mem = memory(2, 6);
        let out = layer
            .apply(x, &LayerInputs::decoder(&mem, None, None), &mut ForwardContext::evaluation())
            .unwrap();
        assert_eq!(out.shape(), &[2, 3, 8]);
    }

    #[test]
    fn test_future_targets_do_not_change_earlier_positions() {
        let mut rng = SmallRng::seed_from_u64(3);
        let decoder = Decoder::new(&small_config(), &mut rng).unwrap();
        let mem = memory(1, 4);
        let src_mask = padding_mask(&array![[1, 2, 3, 4]]);
        let mut ctx = ForwardContext::evaluation();

        let a = array![[5, 6, 7, 8]];
        let b = array![[5, 6, 11, 12]];
        let out_a = decoder
            .decode(&a, &mem, Some(&src_mask), Some(&look_ahead_mask(&a)), &mut ctx)
            .unwrap();
        let out_b = decoder
            .decode(&b, &mem, Some(&src_mask), Some(&look_ahead_mask(&b)), &mut ctx)
            .unwrap();

        // positions 0 and 1 only see targets 5 and 6 in both batches
        for t in 0..2 {
            for (x, y) in out_a.slice(s![0, t, ..]).iter().zip(out_b.slice(s![0, t, ..]).iter()) {
                assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
            }
        }
        assert!(out_a.slice(s![0, 3, ..]) != out_b.slice(s![0, 3, ..]));
    }

    #[test]
    fn test_padded_source_positions_are_ignored() {
        let mut rng = SmallRng::seed_from_u64(4);
        let decoder = Decoder::new(&small_config(), &mut rng).unwrap();
        let target = array![[3, 4, 5]];
        let target_mask = look_ahead_mask(&target);
        let source_mask = padding_mask(&array![[7, 8, 0]]);
        let mut ctx = ForwardContext::evaluation();

        let mut mem_a = memory(1, 3);
        let out_a = decoder
            .decode(&target, &mem_a, Some(&source_mask), Some(&target_mask), &mut ctx)
            .unwrap();
        mem_a.slice_mut(s![0, 2, ..]).fill(42.0);
        let out_b = decoder
            .decode(&target, &mem_a, Some(&source_mask), Some(&target_mask), &mut ctx)
            .unwrap();

        for (x, y) in out_a.iter().zip(out_b.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-5);
        }
    }
}
