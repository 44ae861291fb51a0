use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AttentionError, Result};

/// Hyperparameters shared by the self, causal and multi-head attention layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionConfig {
    /// Width of the incoming embedded sequence
    pub embedding_dim: usize,
    /// Width of the context vectors (sum of all head widths)
    pub output_dim: usize,
    /// Longest sequence the causal mask is cached for
    pub context_length: usize,
    /// Dropout probability on attention weights (multi-head only)
    #[serde(default)]
    pub dropout: f32,
    /// Number of attention heads (multi-head only)
    #[serde(default = "default_num_heads")]
    pub num_heads: usize,
    /// Add a bias term to the query, key and value projections
    #[serde(default)]
    pub qkv_bias: bool,
    /// Re-project merged heads through an output_dim x output_dim layer
    #[serde(default)]
    pub output_projection: bool,
}

fn default_num_heads() -> usize {
    1
}

impl AttentionConfig {
    /// Dimension per attention head.
    #[must_use]
    pub fn head_dim(&self) -> usize {
        self.output_dim / self.num_heads
    }

    /// Validate that configuration is consistent, including the head split.
    ///
    /// # Errors
    /// Returns [`AttentionError::Config`] if any field is out of range.
    pub fn validate(&self) -> Result<()> {
        self.validate_single_head()?;
        if self.num_heads == 0 {
            return Err(AttentionError::config("num_heads must be positive"));
        }
        if !self.output_dim.is_multiple_of(self.num_heads) {
            return Err(AttentionError::config(format!(
                "output_dim {} must be divisible by num_heads {}",
                self.output_dim, self.num_heads
            )));
        }
        Ok(())
    }

    /// Validate the fields used by the single-head layers. `num_heads` is
    /// ignored.
    ///
    /// # Errors
    /// Returns [`AttentionError::Config`] if any field is out of range.
    pub fn validate_single_head(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(AttentionError::config("embedding_dim must be positive"));
        }
        if self.output_dim == 0 {
            return Err(AttentionError::config("output_dim must be positive"));
        }
        if self.context_length == 0 {
            return Err(AttentionError::config("context_length must be positive"));
        }
        validate_dropout(self.dropout)
    }

    /// Load a configuration from a JSON file and validate it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or fails validation.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Tiny two-head config used by the demo binary.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            embedding_dim: 4,
            output_dim: 6,
            context_length: 7,
            dropout: 0.1,
            num_heads: 2,
            qkv_bias: false,
            output_projection: false,
        }
    }

    /// GPT-2 small sized attention layer.
    #[must_use]
    pub fn gpt2_small() -> Self {
        Self {
            embedding_dim: 768,
            output_dim: 768,
            context_length: 1024,
            dropout: 0.1,
            num_heads: 12,
            qkv_bias: false,
            output_projection: true,
        }
    }
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self::demo()
    }
}

/// Hyperparameters for [`InputEmbedding`](super::embedding::InputEmbedding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Rows in the token embedding table
    pub vocab_size: usize,
    /// Width of each embedding vector (must be even)
    pub embedding_dim: usize,
    /// Length of the positional table
    pub context_length: usize,
    /// Dropout probability applied to the summed embeddings
    #[serde(default)]
    pub dropout: f32,
}

impl EmbeddingConfig {
    /// # Errors
    /// Returns [`AttentionError::Config`] if any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 {
            return Err(AttentionError::config("vocab_size must be positive"));
        }
        if self.context_length == 0 {
            return Err(AttentionError::config("context_length must be positive"));
        }
        if self.embedding_dim == 0 || !self.embedding_dim.is_multiple_of(2) {
            return Err(AttentionError::config(format!(
                "embedding_dim must be positive and even, got {}",
                self.embedding_dim
            )));
        }
        validate_dropout(self.dropout)
    }

    /// Load a configuration from a JSON file and validate it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or fails validation.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }
}

fn validate_dropout(p: f32) -> Result<()> {
    if (0.0..1.0).contains(&p) {
        Ok(())
    } else {
        Err(AttentionError::config(format!(
            "dropout must be in [0, 1), got {p}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(AttentionConfig::demo().validate().is_ok());
        assert!(AttentionConfig::gpt2_small().validate().is_ok());
        assert_eq!(AttentionConfig::demo().head_dim(), 3);
        assert_eq!(AttentionConfig::gpt2_small().head_dim(), 64);
    }

    #[test]
    fn test_rejects_indivisible_heads() {
        let config = AttentionConfig {
            output_dim: 6,
            num_heads: 4,
            ..AttentionConfig::demo()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AttentionError::Config(_)));
        assert!(err.to_string().contains("divisible"));
        assert!(config.validate_single_head().is_ok());
    }

    #[test]
    fn test_rejects_bad_dropout() {
        for dropout in [-0.1, 1.0, 1.5] {
            let config = AttentionConfig {
                dropout,
                ..AttentionConfig::demo()
            };
            assert!(config.validate().is_err(), "dropout {dropout} accepted");
        }
    }

    #[test]
    fn test_rejects_zero_dims() {
        let zeroed = [
            AttentionConfig {
                embedding_dim: 0,
                ..AttentionConfig::demo()
            },
            AttentionConfig {
                output_dim: 0,
                ..AttentionConfig::demo()
            },
            AttentionConfig {
                context_length: 0,
                ..AttentionConfig::demo()
            },
            AttentionConfig {
                num_heads: 0,
                ..AttentionConfig::demo()
            },
        ];
        for config in zeroed {
            assert!(config.validate().is_err(), "{config:?} accepted");
        }
    }

    #[test]
    fn test_embedding_config_rejects_odd_dim() {
        let config = EmbeddingConfig {
            vocab_size: 10,
            embedding_dim: 5,
            context_length: 4,
            dropout: 0.0,
        };
        assert!(matches!(config.validate(), Err(AttentionError::Config(_))));
    }

    #[test]
    fn test_json_defaults() {
        let raw = r#"{"embedding_dim": 8, "output_dim": 8, "context_length": 16}"#;
        let config: AttentionConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.num_heads, 1);
        assert!(!config.qkv_bias);
        assert!(!config.output_projection);
        assert!(config.dropout.abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }
}
