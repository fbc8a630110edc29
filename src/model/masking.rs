//! Attention-suppression masks built from token-id batches.
//!
//! A mask holds `1.0` where attention must be suppressed and `0.0` where it is
//! allowed. Attention consumes it additively as `scores += mask * MASK_FILL`.

use ndarray::{s, Array2, Array4};

/// Reserved token id for padding
pub const PAD_ID: usize = 0;

/// Added to a suppressed score. Large enough that `exp` underflows to zero in f32.
pub const MASK_FILL: f32 = -1e9;

/// `[batch, 1, 1, seq_len]`, 1 wherever `tokens[b, j] == PAD_ID`
pub fn padding_mask(tokens: &Array2<usize>) -> Array4<f32> {
    let (batch, seq_len) = tokens.dim();
    Array4::from_shape_fn((batch, 1, 1, seq_len), |(b, _, _, j)| pad_flag(tokens[[b, j]]))
}

/// `[batch, 1, seq_len, seq_len]`: suppresses future keys (`k > q`) and padded keys
pub fn look_ahead_mask(tokens: &Array2<usize>) -> Array4<f32> {
    let (batch, seq_len) = tokens.dim();
    let causal = Array2::from_shape_fn((seq_len, seq_len), |(q, k)| if k > q { 1.0f32 } else { 0.0 });
    let padding = padding_mask(tokens);

    // elementwise max of the causal triangle and the key padding, broadcast over queries
    Array4::from_shape_fn((batch, 1, seq_len, seq_len), |(b, _, q, k)| {
        causal[[q, k]].max(padding[[b, 0, 0, k]])
    })
}

#[inline]
fn pad_flag(id: usize) -> f32 {
    if id == PAD_ID { 1.0 } else { 0.0 }
}

/// Cut every sequence to at most `max_len` positions.
///
/// For callers that prefer truncation over a `SequenceLengthExceeded` error.
pub fn truncate_tokens(tokens: &Array2<usize>, max_len: usize) -> Array2<usize> {
    let keep = tokens.ncols().min(max_len);
    tokens.slice(s![.., ..keep]).to_owned()
}
