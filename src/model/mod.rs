//! Encoder-decoder Transformer model

mod attention;
mod config;
mod error;
mod layers;
pub mod masking;
mod params;
mod positional;
mod transformer;

pub use attention::{scaled_dot_product_attention, Attended, MultiHeadAttention};
pub use config::{AttentionConfig, TransformerConfig};
pub use error::ModelError;
pub use layers::{Dropout, Embedding, FeedForward, LayerNorm, Linear};
pub use masking::{look_ahead_mask, padding_mask, truncate_tokens, MASK_FILL, PAD_ID};
pub use params::{NamedParam, NamedParamMut, Parameters};
pub use positional::SinusoidalPositionalEncoding;
pub use transformer::{Decoder, DecoderLayer, Encoder, EncoderLayer, Layer, LayerInputs, LayerStack};

use ndarray::{Array2, Array3, Array4};
use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::model::params::scoped;
use crate::utils::ForwardContext;

/// Complete encoder-decoder architecture with a vocabulary projection head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transformer {
    config: TransformerConfig,
    encoder: Encoder,
    decoder: Decoder,
    out: Linear,
}

impl Transformer {
    /// Validates the config and draws fresh weights for every component
    pub fn new(config: TransformerConfig) -> Result<Self, ModelError> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let encoder = Encoder::new(&config, &mut rng)?;
        let decoder = Decoder::new(&config, &mut rng)?;
        let out = Linear::new(config.d_model, config.vocab_size, &mut rng)?;

        let model = Self {
            config,
            encoder,
            decoder,
            out,
        };
        log::info!(
            "transformer ready: vocab={} d_model={} layers={} heads={} d_ff={} params={}",
            model.config.vocab_size,
            model.config.d_model,
            model.config.num_layers,
            model.config.heads,
            model.config.d_ff,
            model.num_parameters()
        );
        Ok(model)
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn encoder_mut(&mut self) -> &mut Encoder {
        &mut self.encoder
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut Decoder {
        &mut self.decoder
    }

    /// Source ids `[batch, src_len]` -> encoder output `[batch, src_len, d_model]`
    pub fn encode(
        &self,
        source: &Array2<usize>,
        source_mask: Option<&Array4<f32>>,
        ctx: &mut ForwardContext,
    ) -> Result<Array3<f32>, ModelError> {
        self.encoder.encode(source, source_mask, ctx)
    }

    /// Decoder hidden states `[batch, trg_len, d_model]`, before the vocabulary projection
    pub fn decode(
        &self,
        target: &Array2<usize>,
        memory: &Array3<f32>,
        source_mask: Option<&Array4<f32>>,
        target_mask: Option<&Array4<f32>>,
        ctx: &mut ForwardContext,
    ) -> Result<Array3<f32>, ModelError> {
        if target.nrows() != memory.dim().0 {
            return Err(ModelError::shape_mismatch(format!(
                "target batch {} does not match encoder output batch {}",
                target.nrows(),
                memory.dim().0
            )));
        }
        self.decoder.decode(target, memory, source_mask, target_mask, ctx)
    }

    /// Raw logits `[batch, trg_len, vocab_size]`. No softmax is applied.
    ///
    /// `source_mask` is usually `padding_mask(source)` and `target_mask`
    /// `look_ahead_mask(target)`.
    pub fn forward(
        &self,
        source: &Array2<usize>,
        target: &Array2<usize>,
        source_mask: Option<&Array4<f32>>,
        target_mask: Option<&Array4<f32>>,
        ctx: &mut ForwardContext,
    ) -> Result<Array3<f32>, ModelError> {
        log::debug!(
            "forward source={:?} target={:?} mode={:?}",
            source.dim(),
            target.dim(),
            ctx.mode()
        );
        let memory = self.encode(source, source_mask, ctx)?;
        let hidden = self.decode(target, &memory, source_mask, target_mask, ctx)?;
        self.out.forward(&hidden)
    }
}

impl Parameters for Transformer {
    fn parameters(&self) -> Vec<NamedParam<'_>> {
        scoped("encoder", self.encoder.parameters())
            .chain(scoped("decoder", self.decoder.parameters()))
            .chain(scoped("out", self.out.parameters()))
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<NamedParamMut<'_>> {
        scoped("encoder", self.encoder.parameters_mut())
            .chain(scoped("decoder", self.decoder.parameters_mut()))
            .chain(scoped("out", self.out.parameters_mut()))
            .collect()
    }
}
