//! Embedding layers.
//!
//! Learned token lookup combined with the fixed sinusoidal position signal.

use candle_core::{Device, Tensor};
use candle_nn::{Embedding, Module, VarBuilder};
use rand::Rng;

use super::config::EmbeddingConfig;
use super::dropout::Dropout;
use super::positional::SinusoidalPositionalEncoding;
use crate::error::{AttentionError, Result};
use crate::tokenizer::TextEncoder;

/// Token embedding layer.
pub struct TokenEmbedding {
    /// Embedding weights (vocab_size, embedding_dim)
    embedding: Embedding,
    vocab_size: usize,
}

impl TokenEmbedding {
    /// Create a new token embedding layer.
    ///
    /// # Errors
    /// Returns an error if weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(vocab_size: usize, embedding_dim: usize, vb: VarBuilder) -> Result<Self> {
        let embedding = candle_nn::embedding(vocab_size, embedding_dim, vb)?;
        Ok(Self {
            embedding,
            vocab_size,
        })
    }

    /// Look up token ids of shape (batch, seq_len).
    ///
    /// # Returns
    /// Embeddings of shape (batch, seq_len, embedding_dim)
    ///
    /// # Errors
    /// Returns an error if embedding lookup fails.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        Ok(self.embedding.forward(token_ids)?)
    }

    /// Get the embedding weights.
    #[must_use]
    pub fn weights(&self) -> &Tensor {
        self.embedding.embeddings()
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

/// Token embedding + sinusoidal positions + dropout.
pub struct InputEmbedding {
    token_embedding: TokenEmbedding,
    positional: SinusoidalPositionalEncoding,
    dropout: Dropout,
    device: Device,
}

impl InputEmbedding {
    /// Create the embedding stage. Token weights live under `token_embedding`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &EmbeddingConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let device = vb.device().clone();

        let token_embedding = TokenEmbedding::new(
            config.vocab_size,
            config.embedding_dim,
            vb.pp("token_embedding"),
        )?;
        let positional =
            SinusoidalPositionalEncoding::new(config.context_length, config.embedding_dim, &device)?;

        Ok(Self {
            token_embedding,
            positional,
            dropout: Dropout::new(config.dropout)?,
            device,
        })
    }

    /// Embed one sequence in evaluation mode.
    ///
    /// # Returns
    /// Tensor of shape (1, seq_len, embedding_dim)
    ///
    /// # Errors
    /// Returns an error for an empty or too long sequence or an unknown id.
    pub fn forward(&self, token_ids: &[u32]) -> Result<Tensor> {
        self.embed(&[token_ids])
    }

    /// Embed one sequence in training mode, applying dropout from `rng`.
    ///
    /// # Errors
    /// Same as [`InputEmbedding::forward`].
    pub fn forward_train<R: Rng + ?Sized>(
        &self,
        token_ids: &[u32],
        rng: &mut R,
    ) -> Result<Tensor> {
        let x = self.embed(&[token_ids])?;
        self.dropout.forward(&x, rng)
    }

    /// Embed equal-length sequences into (batch, seq_len, embedding_dim).
    ///
    /// # Errors
    /// Returns an error for ragged or empty input, or any per-sequence error.
    pub fn forward_batch(&self, sequences: &[Vec<u32>]) -> Result<Tensor> {
        let rows: Vec<&[u32]> = sequences.iter().map(Vec::as_slice).collect();
        self.embed(&rows)
    }

    /// Batched variant of [`InputEmbedding::forward_train`].
    ///
    /// # Errors
    /// Same as [`InputEmbedding::forward_batch`].
    pub fn forward_batch_train<R: Rng + ?Sized>(
        &self,
        sequences: &[Vec<u32>],
        rng: &mut R,
    ) -> Result<Tensor> {
        let x = self.forward_batch(sequences)?;
        self.dropout.forward(&x, rng)
    }

    /// Tokenize `text` with `encoder` and embed it in evaluation mode.
    ///
    /// # Errors
    /// Returns an error if tokenization or embedding fails.
    pub fn encode_text<E: TextEncoder + ?Sized>(&self, encoder: &E, text: &str) -> Result<Tensor> {
        let ids = encoder.encode(text)?;
        self.forward(&ids)
    }

    #[must_use]
    pub fn token_embedding(&self) -> &TokenEmbedding {
        &self.token_embedding
    }

    #[must_use]
    pub fn positional(&self) -> &SinusoidalPositionalEncoding {
        &self.positional
    }

    fn embed(&self, sequences: &[&[u32]]) -> Result<Tensor> {
        let Some(first) = sequences.first() else {
            return Err(AttentionError::shape("cannot embed an empty batch"));
        };
        let t = first.len();
        if t == 0 {
            return Err(AttentionError::shape("cannot embed an empty token sequence"));
        }
        if t > self.positional.context_length() {
            return Err(AttentionError::shape(format!(
                "sequence length {t} exceeds context_length {}",
                self.positional.context_length()
            )));
        }

        let vocab_size = self.token_embedding.vocab_size();
        let mut flat = Vec::with_capacity(sequences.len() * t);
        for (i, seq) in sequences.iter().enumerate() {
            if seq.len() != t {
                return Err(AttentionError::shape(format!(
                    "sequence {i} has length {}, expected {t}",
                    seq.len()
                )));
            }
            if let Some(&id) = seq.iter().find(|&&id| id as usize >= vocab_size) {
                return Err(AttentionError::TokenOutOfRange { id, vocab_size });
            }
            flat.extend_from_slice(seq);
        }

        let ids = Tensor::from_vec(flat, (sequences.len(), t), &self.device)?;
        let tok_emb = self.token_embedding.forward(&ids)?;
        self.positional.forward(&tok_emb)
    }
}
