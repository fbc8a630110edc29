use ndarray::{Array3, Array4};
use rand::Rng;

use crate::model::params::Parameters;
use crate::model::{ModelError, TransformerConfig};
use crate::utils::ForwardContext;

/// Side inputs a layer may consume besides the running state
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerInputs<'a> {
    /// Self-attention mask
    pub mask: Option<&'a Array4<f32>>,
    /// Encoder output that decoder layers cross-attend to
    pub memory: Option<&'a Array3<f32>>,
    /// Mask over `memory` positions
    pub memory_mask: Option<&'a Array4<f32>>,
}

impl<'a> LayerInputs<'a> {
    pub fn encoder(source_mask: Option<&'a Array4<f32>>) -> Self {
        Self {
            mask: source_mask,
            memory: None,
            memory_mask: None,
        }
    }

    pub fn decoder(
        memory: &'a Array3<f32>,
        source_mask: Option<&'a Array4<f32>>,
        target_mask: Option<&'a Array4<f32>>,
    ) -> Self {
        Self {
            mask: target_mask,
            memory: Some(memory),
            memory_mask: source_mask,
        }
    }
}

/// One block of a layer stack. Maps the running state `[batch, len, d_model]`
/// to a new state of the same shape.
pub trait Layer: Parameters {
    /// Builds a layer with freshly drawn weights
    fn build<R: Rng + ?Sized>(config: &TransformerConfig, rng: &mut R) -> Result<Self, ModelError>
    where
        Self: Sized;

    fn apply(
        &self,
        state: Array3<f32>,
        inputs: &LayerInputs<'_>,
        ctx: &mut ForwardContext,
    ) -> Result<Array3<f32>, ModelError>;
}
