//! Encoder-decoder Transformer forward pass on `ndarray`.
//!
//! ```no_run
//! use tiny_seq2seq::{look_ahead_mask, padding_mask, ForwardContext, Transformer, TransformerConfig};
//! use ndarray::array;
//!
//! # fn main() -> Result<(), tiny_seq2seq::ModelError> {
//! let model = Transformer::new(TransformerConfig::new(100, 64, 2, 8).with_seed(7))?;
//! let source = array![[5, 17, 42, 0]];
//! let target = array![[1, 9, 23]];
//! let logits = model.forward(
//!     &source,
//!     &target,
//!     Some(&padding_mask(&source)),
//!     Some(&look_ahead_mask(&target)),
//!     &mut ForwardContext::evaluation(),
//! )?;
//! assert_eq!(logits.shape(), &[1, 3, 100]);
//! # Ok(())
//! # }
//! ```

pub mod model;
pub use model::{
    look_ahead_mask, padding_mask, truncate_tokens, ModelError, Parameters, Transformer, TransformerConfig,
};

pub mod utils;
pub use utils::{ForwardContext, Mode};
