use ndarray::{Array, ArrayViewMut1, Axis, Dimension};
use rand::Rng;

use crate::utils::ForwardContext;

/// Softmax over one row, in place, with the row max subtracted first.
///
/// `+inf` entries share all of the mass equally. Otherwise non-finite inputs
/// are skipped when searching the max, and a row with no finite entry becomes
/// uniform, so NaN never leaves this function.
pub fn softmax_row(mut row: ArrayViewMut1<f32>) {
    let len = row.len();
    if len == 0 {
        return;
    }

    let overflowed = row.iter().filter(|v| **v == f32::INFINITY).count();
    if overflowed > 0 {
        let share = 1.0 / overflowed as f32;
        row.mapv_inplace(|v| if v == f32::INFINITY { share } else { 0.0 });
        return;
    }

    let max = row.fold(f32::NEG_INFINITY, |a, &b| if b.is_finite() { a.max(b) } else { a });
    if max == f32::NEG_INFINITY {
        row.fill(1.0 / len as f32);
        return;
    }

    let mut sum = 0.0f32;
    for val in row.iter_mut() {
        *val = if val.is_nan() { 0.0 } else { (*val - max).exp() };
        sum += *val;
    }

    // The max entry contributes exp(0) = 1, so sum >= 1 here.
    for val in row.iter_mut() {
        *val /= sum;
    }
}

/// Softmax along the last axis of an array of any rank
pub fn softmax_last_axis<D: Dimension>(x: &mut Array<f32, D>) {
    if x.ndim() == 0 {
        return;
    }
    let last = Axis(x.ndim() - 1);
    for lane in x.lanes_mut(last) {
        softmax_row(lane);
    }
}

#[inline]
pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// Inverted dropout: zero each element with probability `rate` and scale the
/// survivors by `1 / (1 - rate)`. Identity outside training mode.
pub fn dropout<D: Dimension>(x: &mut Array<f32, D>, rate: f32, ctx: &mut ForwardContext) {
    if !ctx.is_training() || rate <= 0.0 {
        return;
    }

    let keep_prob = 1.0 - rate;
    let rng = ctx.rng();
    x.mapv_inplace(|v| {
        if rng.gen::<f32>() < keep_prob {
            v / keep_prob
        } else {
            0.0
        }
    });
}
