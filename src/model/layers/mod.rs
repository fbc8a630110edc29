//! Neural network layers

mod dropout;
mod embedding;
mod ffn;
mod linear;
mod norm;

pub use dropout::Dropout;
pub use embedding::Embedding;
pub use ffn::FeedForward;
pub use linear::Linear;
pub use norm::LayerNorm;
