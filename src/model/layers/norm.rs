use ndarray::{Array1, Array3, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::model::params::{NamedParam, NamedParamMut, Parameters};
use crate::model::ModelError;

/// Layer Normalization over the feature axis with learnable gain and shift
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LayerNorm {
    pub(crate) gamma: Array1<f32>,
    pub(crate) beta: Array1<f32>,
    eps: f32,
}

impl LayerNorm {
    pub fn new(dim: usize, eps: f32) -> Self {
        Self {
            gamma: Array1::ones(dim),
            beta: Array1::zeros(dim),
            eps,
        }
    }

    /// Forward pass: input shape `[batch_size, seq_len, dim]`
    pub fn forward(&self, x: &Array3<f32>) -> Result<Array3<f32>, ModelError> {
        let dim = x.dim().2;
        if dim != self.gamma.len() {
            return Err(ModelError::shape_mismatch(format!(
                "layer norm over width {} applied to width {}",
                self.gamma.len(),
                dim
            )));
        }

        let mut output = x.to_owned();
        for mut row in output.lanes_mut(Axis(2)) {
            // population variance (ddof = 0)
            let mean = row.mean().unwrap_or(0.0);
            let var = row.var(0.0);
            let std = (var + self.eps).sqrt();
            Zip::from(&mut row)
                .and(&self.gamma)
                .and(&self.beta)
                .for_each(|v, &g, &b| *v = (*v - mean) / std * g + b);
        }

        Ok(output)
    }
}

impl Parameters for LayerNorm {
    fn parameters(&self) -> Vec<NamedParam<'_>> {
        vec![
            ("gamma".to_string(), self.gamma.view().into_dyn()),
            ("beta".to_string(), self.beta.view().into_dyn()),
        ]
    }

    fn parameters_mut(&mut self) -> Vec<NamedParamMut<'_>> {
        vec![
            ("gamma".to_string(), self.gamma.view_mut().into_dyn()),
            ("beta".to_string(), self.beta.view_mut().into_dyn()),
        ]
    }
}
