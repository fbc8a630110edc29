use ndarray::{s, Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::model::layers::Dropout;
use crate::model::ModelError;
use crate::utils::ForwardContext;

/// Fixed sinusoidal positional encoding.
///
/// The `[max_len, d_model]` table is computed once and never trained:
/// `pe[pos, 2k] = sin(pos / 10000^(2k / d_model))` and
/// `pe[pos, 2k + 1] = cos(pos / 10000^(2k / d_model))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinusoidalPositionalEncoding {
    encoding: Array2<f32>,
    dropout: Dropout,
}

impl SinusoidalPositionalEncoding {
    pub fn new(max_len: usize, d_model: usize, dropout: f32) -> Self {
        let encoding = Array2::from_shape_fn((max_len, d_model), |(pos, i)| {
            let pair = (i / 2) * 2;
            let angle = pos as f32 / 10000f32.powf(pair as f32 / d_model as f32);
            if i % 2 == 0 {
                angle.sin()
            } else {
                angle.cos()
            }
        });
        log::debug!("built sinusoidal table max_len={} d_model={}", max_len, d_model);

        Self {
            encoding,
            dropout: Dropout::new(dropout),
        }
    }

    pub fn max_len(&self) -> usize {
        self.encoding.nrows()
    }

    pub fn table(&self) -> &Array2<f32> {
        &self.encoding
    }

    /// `x * sqrt(d_model) + pe[..len]`, then dropout.
    ///
    /// Rejects sequences longer than the table; see `masking::truncate_tokens`
    /// for callers that would rather truncate.
    pub fn forward(&self, x: Array3<f32>, ctx: &mut ForwardContext) -> Result<Array3<f32>, ModelError> {
        let (_, seq_len, d_model) = x.dim();
        if seq_len > self.max_len() {
            return Err(ModelError::SequenceLengthExceeded {
                len: seq_len,
                max_len: self.max_len(),
            });
        }
        if d_model != self.encoding.ncols() {
            return Err(ModelError::shape_mismatch(format!(
                "positional table width {} does not match embeddings width {}",
                self.encoding.ncols(),
                d_model
            )));
        }

        let scale = (d_model as f32).sqrt();
        let table = self.encoding.slice(s![..seq_len, ..]);
        let mut output = x * scale;
        for mut sequence in output.outer_iter_mut() {
            sequence += &table;
        }

        Ok(self.dropout.forward(output, ctx))
    }
}
