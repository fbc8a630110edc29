use serde::{Deserialize, Serialize};

use super::error::ModelError;

/// Hyper-parameters of the encoder-decoder model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerConfig {
    // --- Architecture ---
    pub vocab_size: usize, // shared by source and target embeddings and the output projection
    pub d_model: usize,    // width of embeddings and every hidden state
    pub num_layers: usize, // N, same for encoder and decoder
    pub heads: usize,      // must divide d_model
    #[serde(default = "default_d_ff")]
    pub d_ff: usize, // hidden width of the position-wise feed-forward

    // --- Positional table ---
    #[serde(default = "default_max_len")]
    pub max_len: usize,

    // --- Regularization ---
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f32,

    // --- Initialization ---
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_d_ff() -> usize { 2048 }
fn default_max_len() -> usize { 50 }
fn default_dropout() -> f32 { 0.1 }
fn default_layer_norm_eps() -> f32 { 1e-5 }

impl TransformerConfig {
    pub fn new(vocab_size: usize, d_model: usize, num_layers: usize, heads: usize) -> Self {
        Self {
            vocab_size,
            d_model,
            num_layers,
            heads,
            d_ff: default_d_ff(),
            max_len: default_max_len(),
            dropout: default_dropout(),
            layer_norm_eps: default_layer_norm_eps(),
            seed: None,
        }
    }

    pub fn with_d_ff(mut self, d_ff: usize) -> Self {
        self.d_ff = d_ff;
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_layer_norm_eps(mut self, eps: f32) -> Self {
        self.layer_norm_eps = eps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Per-head feature width `d_model / heads`
    pub fn head_dim(&self) -> usize {
        self.d_model / self.heads.max(1)
    }

    pub fn attention(&self) -> AttentionConfig {
        AttentionConfig {
            d_model: self.d_model,
            heads: self.heads,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.vocab_size == 0 {
            return Err(ModelError::ConfigError("vocab_size must be positive".to_string()));
        }
        if self.num_layers == 0 {
            return Err(ModelError::ConfigError("num_layers must be positive".to_string()));
        }
        if self.d_ff == 0 {
            return Err(ModelError::ConfigError("d_ff must be positive".to_string()));
        }
        if self.max_len == 0 {
            return Err(ModelError::ConfigError("max_len must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::ConfigError(format!(
                "dropout must lie in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(self.layer_norm_eps > 0.0) {
            return Err(ModelError::ConfigError(format!(
                "layer_norm_eps must be positive, got {}",
                self.layer_norm_eps
            )));
        }
        self.attention().validate()
    }
}

/// Shape of a multi-head attention block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttentionConfig {
    pub d_model: usize,
    pub heads: usize,
}

impl AttentionConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.d_model == 0 || self.heads == 0 {
            return Err(ModelError::ConfigError(format!(
                "d_model ({}) and heads ({}) must be positive",
                self.d_model, self.heads
            )));
        }
        if self.d_model % self.heads != 0 {
            return Err(ModelError::ConfigError(format!(
                "d_model ({}) must be divisible by heads ({})",
                self.d_model, self.heads
            )));
        }
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.d_model / self.heads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_fills_defaults() {
        let config = TransformerConfig::new(100, 512, 6, 8);
        assert_eq!(config.d_ff, 2048);
        assert_eq!(config.max_len, 50);
        assert_eq!(config.head_dim(), 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_indivisible_heads() {
        let config = TransformerConfig::new(100, 512, 6, 7);
        assert!(matches!(config.validate(), Err(ModelError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_bad_dropout() {
        let config = TransformerConfig::new(100, 16, 1, 2).with_dropout(1.0);
        assert!(matches!(config.validate(), Err(ModelError::ConfigError(_))));
    }
}
