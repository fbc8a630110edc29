//! Named access to learned weights for an external optimizer or checkpointer

use ndarray::{ArrayViewD, ArrayViewMutD};

pub type NamedParam<'a> = (String, ArrayViewD<'a, f32>);
pub type NamedParamMut<'a> = (String, ArrayViewMutD<'a, f32>);

/// Implemented by every component that owns trainable weights.
///
/// Names are dot-separated paths such as `encoder.layers.0.self_attn.q.weight`.
/// Fixed tables (the positional encoding) are not listed.
pub trait Parameters {
    fn parameters(&self) -> Vec<NamedParam<'_>>;

    fn parameters_mut(&mut self) -> Vec<NamedParamMut<'_>>;

    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|(_, p)| p.len()).sum()
    }
}

/// Prefix every name in `params` with `scope.`
pub(crate) fn scoped<'a, T: 'a>(
    scope: &'a str,
    params: Vec<(String, T)>,
) -> impl Iterator<Item = (String, T)> + 'a {
    params
        .into_iter()
        .map(move |(name, p)| (format!("{}.{}", scope, name), p))
}
