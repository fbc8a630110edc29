use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

use crate::utils::{dropout, ForwardContext};

/// Inverted dropout, active only when the forward context is in training mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self { rate }
    }

    pub fn forward<D: Dimension>(&self, mut x: Array<f32, D>, ctx: &mut ForwardContext) -> Array<f32, D> {
        dropout(&mut x, self.rate, ctx);
        x
    }
}
