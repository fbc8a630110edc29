//! Encoder and decoder layers and the stacks that compose them

mod decoder;
mod encoder;
mod layer;
mod stack;

pub use decoder::{Decoder, DecoderLayer};
pub use encoder::{Encoder, EncoderLayer};
pub use layer::{Layer, LayerInputs};
pub use stack::LayerStack;
