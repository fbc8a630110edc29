use ndarray::{s, Array2, Array3};
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::linear::normal_init;
use crate::model::params::{NamedParam, NamedParamMut, Parameters};
use crate::model::ModelError;

/// Token embedding table, trained by an external optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub weight: Array2<f32>, // Shape: [vocab_size, d_model]
}

impl Embedding {
    pub fn new<R: Rng + ?Sized>(vocab_size: usize, d_model: usize, rng: &mut R) -> Result<Self, ModelError> {
        Ok(Self {
            weight: Array2::random_using((vocab_size, d_model), normal_init()?, rng),
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.nrows()
    }

    pub fn d_model(&self) -> usize {
        self.weight.ncols()
    }

    /// Forward pass: tokens `[batch_size, seq_len]` -> `[batch_size, seq_len, d_model]`
    pub fn forward(&self, tokens: &Array2<usize>) -> Result<Array3<f32>, ModelError> {
        let (batch_size, seq_len) = tokens.dim();
        let mut output = Array3::zeros((batch_size, seq_len, self.d_model()));

        for ((b, t), &token) in tokens.indexed_iter() {
            if token >= self.vocab_size() {
                return Err(ModelError::TokenOutOfRange {
                    token,
                    vocab_size: self.vocab_size(),
                });
            }
            output.slice_mut(s![b, t, ..]).assign(&self.weight.row(token));
        }

        Ok(output)
    }
}

impl Parameters for Embedding {
    fn parameters(&self) -> Vec<NamedParam<'_>> {
        vec![("weight".to_string(), self.weight.view().into_dyn())]
    }

    fn parameters_mut(&mut self) -> Vec<NamedParamMut<'_>> {
        vec![("weight".to_string(), self.weight.view_mut().into_dyn())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_embedding_new() {
        let mut rng = SmallRng::seed_from_u64(3);
        let embedding = Embedding::new(100, 16, &mut rng).unwrap();

        assert_eq!(embedding.weight.shape(), &[100, 16]);
        let mean: f32 = embedding.weight.mean().unwrap();
        assert!(mean.abs() < 0.01, "Mean not close to zero: {}", mean);
    }

    #[test]
    fn test_forward_output_values() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut embedding = Embedding::new(5, 4, &mut rng).unwrap();
        for ((i, j), w) in embedding.weight.indexed_iter_mut() {
            *w = (i * 10 + j) as f32;
        }

        let output = embedding.forward(&array![[0, 1, 2], [4, 4, 0]]).unwrap();

        assert_eq!(output.shape(), &[2, 3, 4]);
        for j in 0..4 {
            assert_abs_diff_eq!(output[[0, 1, j]], embedding.weight[[1, j]], epsilon = 1e-6);
            assert_abs_diff_eq!(output[[1, 0, j]], embedding.weight[[4, j]], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_forward_rejects_unknown_token() {
        let mut rng = SmallRng::seed_from_u64(3);
        let embedding = Embedding::new(5, 4, &mut rng).unwrap();
        let result = embedding.forward(&array![[1, 5]]);
        assert!(matches!(
            result,
            Err(ModelError::TokenOutOfRange { token: 5, vocab_size: 5 })
        ));
    }
}
