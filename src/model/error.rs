use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Sequence length {len} exceeds positional table length {max_len}")]
    SequenceLengthExceeded { len: usize, max_len: usize },

    #[error("Token id {token} is outside the vocabulary (size {vocab_size})")]
    TokenOutOfRange { token: usize, vocab_size: usize },

    #[error("Decoder layer applied without encoder output")]
    MissingMemory,

    #[error("Initialization error: {0}")]
    InitializationError(String),
}

impl ModelError {
    pub fn shape_mismatch<E: std::fmt::Display>(context: E) -> Self {
        ModelError::ShapeMismatch(context.to_string())
    }
}
