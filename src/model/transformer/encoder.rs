use ndarray::{Array2, Array3, Array4};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::layers::{Dropout, FeedForward, LayerNorm};
use crate::model::params::{scoped, NamedParam, NamedParamMut, Parameters};
use crate::model::transformer::{Layer, LayerInputs, LayerStack};
use crate::model::{ModelError, MultiHeadAttention, TransformerConfig};
use crate::utils::ForwardContext;

/// Pre-norm encoder block: self-attention then feed-forward, each wrapped in a residual
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderLayer {
    pub(crate) norm_attn: LayerNorm,
    pub(crate) self_attn: MultiHeadAttention,
    pub(crate) dropout_attn: Dropout,
    pub(crate) norm_ff: LayerNorm,
    pub(crate) feed_forward: FeedForward,
    pub(crate) dropout_ff: Dropout,
}

impl Layer for EncoderLayer {
    fn build<R: Rng + ?Sized>(config: &TransformerConfig, rng: &mut R) -> Result<Self, ModelError> {
        Ok(Self {
            norm_attn: LayerNorm::new(config.d_model, config.layer_norm_eps),
            self_attn: MultiHeadAttention::new(config.attention(), rng)?,
            dropout_attn: Dropout::new(config.dropout),
            norm_ff: LayerNorm::new(config.d_model, config.layer_norm_eps),
            feed_forward: FeedForward::new(config.d_model, config.d_ff, config.dropout, rng)?,
            dropout_ff: Dropout::new(config.dropout),
        })
    }

    fn apply(
        &self,
        x: Array3<f32>,
        inputs: &LayerInputs<'_>,
        ctx: &mut ForwardContext,
    ) -> Result<Array3<f32>, ModelError> {
        // Self-attention + residual
        let x1 = self.norm_attn.forward(&x)?;
        let attended = self.self_attn.forward(&x1, &x1, &x1, inputs.mask)?;
        let x = x + &self.dropout_attn.forward(attended, ctx);

        // FFN + residual
        let x2 = self.norm_ff.forward(&x)?;
        let transformed = self.feed_forward.forward(&x2, ctx)?;
        Ok(x + &self.dropout_ff.forward(transformed, ctx))
    }
}

impl Parameters for EncoderLayer {
    fn parameters(&self) -> Vec<NamedParam<'_>> {
        scoped("norm_attn", self.norm_attn.parameters())
            .chain(scoped("self_attn", self.self_attn.parameters()))
            .chain(scoped("norm_ff", self.norm_ff.parameters()))
            .chain(scoped("feed_forward", self.feed_forward.parameters()))
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<NamedParamMut<'_>> {
        scoped("norm_attn", self.norm_attn.parameters_mut())
            .chain(scoped("self_attn", self.self_attn.parameters_mut()))
            .chain(scoped("norm_ff", self.norm_ff.parameters_mut()))
            .chain(scoped("feed_forward", self.feed_forward.parameters_mut()))
            .collect()
    }
}

/// Embedding, positional encoding, N encoder layers and a final norm
pub type Encoder = LayerStack<EncoderLayer>;

impl Encoder {
    /// Source ids `[batch, src_len]` -> encoder output `[batch, src_len, d_model]`
    pub fn encode(
        &self,
        source: &Array2<usize>,
        source_mask: Option<&Array4<f32>>,
        ctx: &mut ForwardContext,
    ) -> Result<Array3<f32>, ModelError> {
        self.forward(source, &LayerInputs::encoder(source_mask), ctx)
    }
}
