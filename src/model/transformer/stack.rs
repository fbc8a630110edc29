use ndarray::{Array2, Array3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::layers::{Embedding, LayerNorm};
use crate::model::params::{scoped, NamedParam, NamedParamMut, Parameters};
use crate::model::positional::SinusoidalPositionalEncoding;
use crate::model::transformer::{Layer, LayerInputs};
use crate::model::{ModelError, TransformerConfig};
use crate::utils::ForwardContext;

/// Token embedding, positional encoding, an ordered stack of layers and a
/// final layer norm.
///
/// Every layer is built on its own from the rng stream, so no two layers share
/// weights or start from the same values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStack<L> {
    embedding: Embedding,
    positional: SinusoidalPositionalEncoding,
    layers: Vec<L>,
    norm: LayerNorm,
}

impl<L: Layer> LayerStack<L> {
    pub fn new<R: Rng + ?Sized>(config: &TransformerConfig, rng: &mut R) -> Result<Self, ModelError> {
        let embedding = Embedding::new(config.vocab_size, config.d_model, rng)?;
        let positional = SinusoidalPositionalEncoding::new(config.max_len, config.d_model, config.dropout);

        let mut layers = Vec::with_capacity(config.num_layers);
        for _ in 0..config.num_layers {
            layers.push(L::build(config, rng)?);
        }

        Ok(Self {
            embedding,
            positional,
            layers,
            norm: LayerNorm::new(config.d_model, config.layer_norm_eps),
        })
    }

    /// Embeds `tokens`, threads the state through every layer in order, then normalizes
    pub fn forward(
        &self,
        tokens: &Array2<usize>,
        inputs: &LayerInputs<'_>,
        ctx: &mut ForwardContext,
    ) -> Result<Array3<f32>, ModelError> {
        let embedded = self.embedding.forward(tokens)?;
        let mut state = self.positional.forward(embedded, ctx)?;

        for (i, layer) in self.layers.iter().enumerate() {
            state = layer.apply(state, inputs, ctx)?;
            log::trace!("layer {} done, state {:?}", i, state.dim());
        }

        self.norm.forward(&state)
    }

    pub fn layers(&self) -> &[L] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [L] {
        &mut self.layers
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    pub fn embedding_mut(&mut self) -> &mut Embedding {
        &mut self.embedding
    }

    pub fn positional(&self) -> &SinusoidalPositionalEncoding {
        &self.positional
    }
}

impl<L: Layer> Parameters for LayerStack<L> {
    fn parameters(&self) -> Vec<NamedParam<'_>> {
        let mut params: Vec<_> = scoped("embedding", self.embedding.parameters()).collect();
        for (i, layer) in self.layers.iter().enumerate() {
            params.extend(scoped(&format!("layers.{}", i), layer.parameters()).collect::<Vec<_>>());
        }
        params.extend(scoped("norm", self.norm.parameters()));
        params
    }

    fn parameters_mut(&mut self) -> Vec<NamedParamMut<'_>> {
        let mut params: Vec<_> = scoped("embedding", self.embedding.parameters_mut()).collect();
        for (i, layer) in self.layers.iter_mut().enumerate() {
            params.extend(scoped(&format!("layers.{}", i), layer.parameters_mut()).collect::<Vec<_>>());
        }
        params.extend(scoped("norm", self.norm.parameters_mut()));
        params
    }
}
