use ndarray::{s, Array, Array3, ArrayBase, Data, Dimension, IxDyn, Zip};

use crate::model::masking::MASK_FILL;
use crate::model::ModelError;
use crate::utils::softmax_last_axis;

/// Result of one attention evaluation
#[derive(Debug, Clone)]
pub struct Attended<D: Dimension> {
    /// `[*, len_q, d_v]`
    pub output: Array<f32, D>,
    /// `[*, len_q, len_k]`, each row a distribution over key positions
    pub weights: Array<f32, D>,
}

/// Scaled dot-product attention over the last two axes.
///
/// `query` is `[*, len_q, d_h]`, `key` is `[*, len_k, d_h]`, `value` is
/// `[*, len_k, d_v]` with identical leading axes. Scores are divided by
/// `sqrt(d_h)`, the width of the vectors being dotted; callers pass head-split
/// tensors so this is the per-head width. `mask` must broadcast to
/// `[*, len_q, len_k]` and is applied as `scores += mask * MASK_FILL`.
pub fn scaled_dot_product_attention<D, S, M, E>(
    query: &ArrayBase<S, D>,
    key: &ArrayBase<S, D>,
    value: &ArrayBase<S, D>,
    mask: Option<&ArrayBase<M, E>>,
) -> Result<Attended<D>, ModelError>
where
    D: Dimension,
    E: Dimension,
    S: Data<Elem = f32>,
    M: Data<Elem = f32>,
{
    let rank = query.ndim();
    if rank < 2 {
        return Err(ModelError::shape_mismatch(format!(
            "attention needs rank >= 2 tensors, got rank {}",
            rank
        )));
    }

    let q_shape = query.shape();
    let k_shape = key.shape();
    let v_shape = value.shape();
    let lead = &q_shape[..rank - 2];
    if &k_shape[..rank - 2] != lead || &v_shape[..rank - 2] != lead {
        return Err(ModelError::shape_mismatch(format!(
            "leading axes differ: query {:?}, key {:?}, value {:?}",
            q_shape, k_shape, v_shape
        )));
    }

    let (len_q, d_h) = (q_shape[rank - 2], q_shape[rank - 1]);
    let (len_k, d_k) = (k_shape[rank - 2], k_shape[rank - 1]);
    let (len_v, d_v) = (v_shape[rank - 2], v_shape[rank - 1]);
    if d_k != d_h {
        return Err(ModelError::shape_mismatch(format!(
            "query width {} does not match key width {}",
            d_h, d_k
        )));
    }
    if len_v != len_k {
        return Err(ModelError::shape_mismatch(format!(
            "key length {} does not match value length {}",
            len_k, len_v
        )));
    }

    let batches: usize = lead.iter().product();
    let q = to_batched(query, batches, len_q, d_h)?;
    let k = to_batched(key, batches, len_k, d_h)?;
    let v = to_batched(value, batches, len_k, d_v)?;

    let mut scores_shape = lead.to_vec();
    scores_shape.extend_from_slice(&[len_q, len_k]);

    let scale = (d_h as f32).sqrt();
    let mut scores = Array3::<f32>::zeros((batches, len_q, len_k));
    for i in 0..batches {
        let raw = q.slice(s![i, .., ..]).dot(&k.slice(s![i, .., ..]).t());
        scores.slice_mut(s![i, .., ..]).assign(&(raw / scale));
    }

    if let Some(mask) = mask {
        let broadcast = mask.broadcast(IxDyn(&scores_shape)).ok_or_else(|| {
            ModelError::shape_mismatch(format!(
                "mask of shape {:?} does not broadcast to scores {:?}",
                mask.shape(),
                scores_shape
            ))
        })?;
        // iteration order of a broadcast view is logical row-major, same as `scores`
        Zip::from(&mut scores)
            .and(&to_batched(&broadcast, batches, len_q, len_k)?)
            .for_each(|s, &m| *s += m * MASK_FILL);
    }

    softmax_last_axis(&mut scores);

    let mut output = Array3::<f32>::zeros((batches, len_q, d_v));
    for i in 0..batches {
        let attended = scores.slice(s![i, .., ..]).dot(&v.slice(s![i, .., ..]));
        output.slice_mut(s![i, .., ..]).assign(&attended);
    }

    let mut output_shape = lead.to_vec();
    output_shape.extend_from_slice(&[len_q, d_v]);

    Ok(Attended {
        output: restore(output, &output_shape)?,
        weights: restore(scores, &scores_shape)?,
    })
}

/// Collapse all leading axes into one, in logical (row-major) order
fn to_batched<S, D>(
    x: &ArrayBase<S, D>,
    batches: usize,
    rows: usize,
    cols: usize,
) -> Result<Array3<f32>, ModelError>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    Ok(Array3::from_shape_vec((batches, rows, cols), x.iter().copied().collect())?)
}

fn restore<D: Dimension>(x: Array3<f32>, shape: &[usize]) -> Result<Array<f32, D>, ModelError> {
    Ok(x.into_shape(IxDyn(shape))?.into_dimensionality::<D>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::masking::{look_ahead_mask, padding_mask};
    use approx::assert_abs_diff_eq;
    use ndarray::{arr3, Array4, ArrayD};

    fn no_mask() -> Option<&'static ArrayD<f32>> {
        None
    }

    #[test]
    fn test_identical_rows_average_values() {
        let x = arr3(&[[[3.0f32, 4.0], [3.0, 4.0], [4.0, 3.0]]]);
        let attended = scaled_dot_product_attention(&x, &x, &x, no_mask()).unwrap();

        assert_eq!(attended.output.shape(), &[1, 3, 2]);
        assert_eq!(attended.weights.shape(), &[1, 3, 3]);

        // row 0: scores [25, 25, 24] / sqrt(2)
        let s = 1.0 / 2f32.sqrt();
        let e_hi = (25.0 * s).exp();
        let e_lo = (24.0 * s).exp();
        let total = 2.0 * e_hi + e_lo;
        let w_hi = e_hi / total;
        let w_lo = e_lo / total;
        assert_abs_diff_eq!(attended.weights[[0, 0, 0]], w_hi, epsilon = 1e-5);
        assert_abs_diff_eq!(attended.weights[[0, 0, 1]], w_hi, epsilon = 1e-5);
        assert_abs_diff_eq!(attended.weights[[0, 0, 2]], w_lo, epsilon = 1e-5);
        assert_abs_diff_eq!(attended.output[[0, 0, 0]], 3.0 * 2.0 * w_hi + 4.0 * w_lo, epsilon = 1e-4);
        assert_abs_diff_eq!(attended.output[[0, 0, 1]], 4.0 * 2.0 * w_hi + 3.0 * w_lo, epsilon = 1e-4);

        // the first two query rows are identical and see identical scores
        for j in 0..2 {
            assert_abs_diff_eq!(attended.output[[0, 0, j]], attended.output[[0, 1, j]], epsilon = 1e-6);
        }
        // output is a convex combination of the value rows
        for row in attended.output.slice(s![0, .., ..]).rows() {
            assert_abs_diff_eq!(row.sum(), 7.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_equal_scores_give_uniform_weights() {
        let q = Array3::<f32>::ones((1, 4, 2));
        let v = Array3::from_shape_fn((1, 4, 2), |(_, i, j)| (i * 2 + j) as f32);
        let attended = scaled_dot_product_attention(&q, &q, &v, no_mask()).unwrap();
        for &w in attended.weights.iter() {
            assert_abs_diff_eq!(w, 0.25, epsilon = 1e-6);
        }
        // mean of value column 0 is (0 + 2 + 4 + 6) / 4
        assert_abs_diff_eq!(attended.output[[0, 2, 0]], 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_look_ahead_mask_blocks_future_keys() {
        let tokens = ndarray::array![[3usize, 9, 4, 7, 1]];
        let mask = look_ahead_mask(&tokens);
        let q = Array4::from_shape_fn((1, 2, 5, 4), |(_, h, i, j)| ((h + i * 3 + j) % 5) as f32 * 0.3);
        let attended = scaled_dot_product_attention(&q, &q, &q, Some(&mask)).unwrap();

        for h in 0..2 {
            for query in 0..5 {
                for key in 0..5 {
                    let w = attended.weights[[0, h, query, key]];
                    if key > query {
                        assert!(w < 1e-6, "head {} query {} attends future key {}: {}", h, query, key, w);
                    }
                }
                let row_sum: f32 = attended.weights.slice(s![0, h, query, ..]).sum();
                assert_abs_diff_eq!(row_sum, 1.0, epsilon = 1e-5);
            }
        }
        // first query can only see itself
        assert_abs_diff_eq!(attended.weights[[0, 0, 0, 0]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_padding_mask_suppresses_padded_keys() {
        let tokens = ndarray::array![[5usize, 6, 7, 0, 0], [8, 0, 0, 0, 0]];
        let mask = padding_mask(&tokens);
        let q = Array4::from_shape_fn((2, 3, 5, 2), |(b, h, i, j)| (b + h + i + j) as f32 * 0.1);
        let attended = scaled_dot_product_attention(&q, &q, &q, Some(&mask)).unwrap();

        for b in 0..2 {
            for h in 0..3 {
                for query in 0..5 {
                    for key in 0..5 {
                        if tokens[[b, key]] == 0 {
                            assert!(attended.weights[[b, h, query, key]] < 1e-6);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_fully_masked_row_has_no_nan() {
        let q = Array4::<f32>::ones((1, 1, 2, 2));
        let mask = Array4::<f32>::ones((1, 1, 1, 2));
        let attended = scaled_dot_product_attention(&q, &q, &q, Some(&mask)).unwrap();
        assert!(attended.weights.iter().all(|w| w.is_finite()));
        assert!(attended.output.iter().all(|o| o.is_finite()));
        assert_abs_diff_eq!(attended.weights[[0, 0, 0, 0]], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_overflowing_scores_stay_finite() {
        // 1e20 * 1e20 overflows f32, so the first score of each row is +inf or huge
        let x = arr3(&[[[1e20f32, 1e20], [1.0, 1.0]]]);
        let attended = scaled_dot_product_attention(&x, &x, &x, no_mask()).unwrap();

        assert!(attended.weights.iter().all(|w| w.is_finite()));
        assert!(attended.output.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(attended.weights[[0, 0, 0]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(attended.weights[[0, 1, 0]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(attended.output[[0, 0, 0]], 1e20, epsilon = 1e14);
    }

    #[test]
    fn test_cross_lengths() {
        let q = Array4::<f32>::zeros((2, 4, 3, 8));
        let k = Array4::<f32>::zeros((2, 4, 6, 8));
        let v = Array4::<f32>::zeros((2, 4, 6, 5));
        let attended = scaled_dot_product_attention(&q, &k, &v, no_mask()).unwrap();
        assert_eq!(attended.output.shape(), &[2, 4, 3, 5]);
        assert_eq!(attended.weights.shape(), &[2, 4, 3, 6]);
    }

    #[test]
    fn test_mask_that_cannot_broadcast_is_rejected() {
        let q = Array4::<f32>::zeros((1, 1, 3, 2));
        let mask = Array4::<f32>::zeros((1, 1, 1, 4));
        let result = scaled_dot_product_attention(&q, &q, &q, Some(&mask));
        assert!(matches!(result, Err(ModelError::ShapeMismatch(_))));
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let q = Array3::<f32>::zeros((1, 3, 2));
        let k = Array3::<f32>::zeros((1, 3, 4));
        let result = scaled_dot_product_attention(&q, &k, &k, no_mask());
        assert!(matches!(result, Err(ModelError::ShapeMismatch(_))));
    }
}
