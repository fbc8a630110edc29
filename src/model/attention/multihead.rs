use ndarray::{Array3, Array4, ArrayBase, Data, Ix4};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::attention::{scaled_dot_product_attention, Attended};
use crate::model::config::AttentionConfig;
use crate::model::layers::Linear;
use crate::model::params::{scoped, NamedParam, NamedParamMut, Parameters};
use crate::model::ModelError;

/// Multi-head attention layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiHeadAttention {
    pub num_heads: usize,
    pub d_model: usize,
    pub head_dim: usize,
    pub q: Linear, // [d_model, d_model]
    pub k: Linear,
    pub v: Linear,
    pub o: Linear, // output projection
}

impl MultiHeadAttention {
    /// Fails with `ConfigError` unless `heads` divides `d_model`
    pub fn new<R: Rng + ?Sized>(config: AttentionConfig, rng: &mut R) -> Result<Self, ModelError> {
        config.validate()?;
        let d_model = config.d_model;

        Ok(Self {
            num_heads: config.heads,
            d_model,
            head_dim: config.head_dim(),
            q: Linear::new(d_model, d_model, rng)?,
            k: Linear::new(d_model, d_model, rng)?,
            v: Linear::new(d_model, d_model, rng)?,
            o: Linear::new(d_model, d_model, rng)?,
        })
    }

    /// `q`, `k`, `v` are `[batch_size, len, d_model]`; `k` and `v` share a length.
    /// Output has the shape of `q`.
    pub fn forward<M: Data<Elem = f32>>(
        &self,
        q: &Array3<f32>,
        k: &Array3<f32>,
        v: &Array3<f32>,
        mask: Option<&ArrayBase<M, Ix4>>,
    ) -> Result<Array3<f32>, ModelError> {
        self.forward_with_weights(q, k, v, mask).map(|(output, _)| output)
    }

    /// Like `forward`, also returning per-head weights `[batch, heads, len_q, len_k]`
    pub fn forward_with_weights<M: Data<Elem = f32>>(
        &self,
        q: &Array3<f32>,
        k: &Array3<f32>,
        v: &Array3<f32>,
        mask: Option<&ArrayBase<M, Ix4>>,
    ) -> Result<(Array3<f32>, Array4<f32>), ModelError> {
        if q.dim().0 != k.dim().0 || k.dim().0 != v.dim().0 {
            return Err(ModelError::shape_mismatch(format!(
                "batch sizes differ: q {:?}, k {:?}, v {:?}",
                q.dim(),
                k.dim(),
                v.dim()
            )));
        }

        // 1. Project and split into heads
        let q_heads = self.split_heads(self.q.forward(q)?)?;
        let k_heads = self.split_heads(self.k.forward(k)?)?;
        let v_heads = self.split_heads(self.v.forward(v)?)?;
        debug_assert_eq!(q_heads.dim().3, self.head_dim);

        // 2. All heads in one batched call, scaled by sqrt(head_dim)
        let Attended { output, weights } = scaled_dot_product_attention(&q_heads, &k_heads, &v_heads, mask)?;

        // 3. Merge heads and project output
        let merged = self.merge_heads(output)?;
        Ok((self.o.forward(&merged)?, weights))
    }

    /// `[batch, len, d_model]` -> `[batch, heads, len, head_dim]`
    pub fn split_heads(&self, x: Array3<f32>) -> Result<Array4<f32>, ModelError> {
        let (b, s, d) = x.dim();
        if d != self.d_model {
            return Err(ModelError::shape_mismatch(format!(
                "expected width {}, got {}",
                self.d_model, d
            )));
        }
        let split = x
            .as_standard_layout()
            .into_owned()
            .into_shape((b, s, self.num_heads, self.head_dim))?;
        Ok(split.permuted_axes([0, 2, 1, 3]))
    }

    /// `[batch, heads, len, head_dim]` -> `[batch, len, d_model]`
    pub fn merge_heads(&self, x: Array4<f32>) -> Result<Array3<f32>, ModelError> {
        let (b, h, s, d) = x.dim();
        let transposed = x.permuted_axes([0, 2, 1, 3]);
        Ok(Array3::from_shape_vec((b, s, h * d), transposed.iter().copied().collect())?)
    }
}

impl Parameters for MultiHeadAttention {
    fn parameters(&self) -> Vec<NamedParam<'_>> {
        scoped("q", self.q.parameters())
            .chain(scoped("k", self.k.parameters()))
            .chain(scoped("v", self.v.parameters()))
            .chain(scoped("o", self.o.parameters()))
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<NamedParamMut<'_>> {
        scoped("q", self.q.parameters_mut())
            .chain(scoped("k", self.k.parameters_mut()))
            .chain(scoped("v", self.v.parameters_mut()))
            .chain(scoped("o", self.o.parameters_mut()))
            .collect()
    }
}
