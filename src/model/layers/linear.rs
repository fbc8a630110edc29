use ndarray::{Array1, Array2, Array3, ArrayBase, Data, Ix3};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::model::params::{NamedParam, NamedParamMut, Parameters};
use crate::model::ModelError;

/// Standard deviation of the normal distribution used for weight init
pub(crate) const INIT_STD: f32 = 0.02;

pub(crate) fn normal_init() -> Result<Normal<f32>, ModelError> {
    Normal::new(0.0, INIT_STD).map_err(|e| ModelError::InitializationError(e.to_string()))
}

/// A linear (fully-connected) layer `y = x W + b`
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Linear {
    pub weight: Array2<f32>, // [input_dim, output_dim]
    pub bias: Array1<f32>,   // [output_dim]
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(input_dim: usize, output_dim: usize, rng: &mut R) -> Result<Self, ModelError> {
        let normal = normal_init()?;
        Ok(Self {
            weight: Array2::random_using((input_dim, output_dim), normal, rng),
            bias: Array1::zeros(output_dim),
        })
    }

    pub fn input_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.ncols()
    }

    /// Applies the projection to every position of `[batch_size, seq_len, input_dim]`
    pub fn forward<S: Data<Elem = f32>>(&self, x: &ArrayBase<S, Ix3>) -> Result<Array3<f32>, ModelError> {
        let (batch_size, seq_len, input_dim) = x.dim();
        if input_dim != self.input_dim() {
            return Err(ModelError::shape_mismatch(format!(
                "linear layer expects width {}, got {}",
                self.input_dim(),
                input_dim
            )));
        }

        let rows = Array2::from_shape_vec((batch_size * seq_len, input_dim), x.iter().copied().collect())?;
        let projected = rows.dot(&self.weight) + &self.bias;
        Ok(Array3::from_shape_vec(
            (batch_size, seq_len, self.output_dim()),
            projected.iter().copied().collect(),
        )?)
    }
}

impl Parameters for Linear {
    fn parameters(&self) -> Vec<NamedParam<'_>> {
        vec![
            ("weight".to_string(), self.weight.view().into_dyn()),
            ("bias".to_string(), self.bias.view().into_dyn()),
        ]
    }

    fn parameters_mut(&mut self) -> Vec<NamedParamMut<'_>> {
        vec![
            ("weight".to_string(), self.weight.view_mut().into_dyn()),
            ("bias".to_string(), self.bias.view_mut().into_dyn()),
        ]
    }
}
