use ndarray::Array3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::layers::{Dropout, Linear};
use crate::model::params::{scoped, NamedParam, NamedParamMut, Parameters};
use crate::model::ModelError;
use crate::utils::{relu, ForwardContext};

/// Position-wise `d_model -> d_ff -> d_model` transform with ReLU and dropout in between
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedForward {
    pub linear1: Linear, // d_model × d_ff
    pub linear2: Linear, // d_ff × d_model
    dropout: Dropout,
}

impl FeedForward {
    pub fn new<R: Rng + ?Sized>(d_model: usize, d_ff: usize, dropout: f32, rng: &mut R) -> Result<Self, ModelError> {
        Ok(Self {
            linear1: Linear::new(d_model, d_ff, rng)?,
            linear2: Linear::new(d_ff, d_model, rng)?,
            dropout: Dropout::new(dropout),
        })
    }

    pub fn forward(&self, x: &Array3<f32>, ctx: &mut ForwardContext) -> Result<Array3<f32>, ModelError> {
        let hidden = self.linear1.forward(x)?.mapv_into(relu);
        let hidden = self.dropout.forward(hidden, ctx);
        self.linear2.forward(&hidden)
    }
}

impl Parameters for FeedForward {
    fn parameters(&self) -> Vec<NamedParam<'_>> {
        scoped("linear1", self.linear1.parameters())
            .chain(scoped("linear2", self.linear2.parameters()))
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<NamedParamMut<'_>> {
        scoped("linear1", self.linear1.parameters_mut())
            .chain(scoped("linear2", self.linear2.parameters_mut()))
            .collect()
    }
}
