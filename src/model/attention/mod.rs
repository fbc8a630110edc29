//! Attention mechanisms
mod scaled_dot;
pub use scaled_dot::{scaled_dot_product_attention, Attended};

mod multihead;
pub use multihead::MultiHeadAttention;
