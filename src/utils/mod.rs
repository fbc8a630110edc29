//! Numeric helpers and the per-pass forward context
pub mod context;
pub mod math;

pub use context::{ForwardContext, Mode};
pub use math::{dropout, relu, softmax_last_axis, softmax_row};
