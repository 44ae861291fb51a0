//! Scaled dot-product attention.
//!
//! Shared query/key/value projection plus the unmasked and causal
//! single-head layers built on it.

use candle_core::{D, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

use super::config::AttentionConfig;
use super::mask::CausalMask;
use crate::error::{AttentionError, Result};

/// Context vectors together with the attention weights that produced them.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// (batch, seq_len, output_dim)
    pub context: Tensor,
    /// (batch, [heads,] seq_len, seq_len), rows sum to 1
    pub weights: Tensor,
}

/// Three independent linear maps from embedding_dim to output_dim.
pub struct QkvProjection {
    /// Query projection (embedding_dim -> output_dim)
    w_query: Linear,
    /// Key projection (embedding_dim -> output_dim)
    w_key: Linear,
    /// Value projection (embedding_dim -> output_dim)
    w_value: Linear,
    embedding_dim: usize,
    output_dim: usize,
}

impl QkvProjection {
    /// Create the projections, loading or initializing weights from `vb`
    /// under `w_query`, `w_key` and `w_value`.
    ///
    /// # Errors
    /// Returns an error if weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &AttentionConfig, vb: VarBuilder) -> Result<Self> {
        let (e, o, bias) = (config.embedding_dim, config.output_dim, config.qkv_bias);

        let w_query = candle_nn::linear_b(e, o, bias, vb.pp("w_query"))?;
        let w_key = candle_nn::linear_b(e, o, bias, vb.pp("w_key"))?;
        let w_value = candle_nn::linear_b(e, o, bias, vb.pp("w_value"))?;

        Ok(Self {
            w_query,
            w_key,
            w_value,
            embedding_dim: e,
            output_dim: o,
        })
    }

    /// Validate `x` and return its (batch, seq_len).
    ///
    /// # Errors
    /// Returns [`AttentionError::Shape`] for a non 3-D input, an empty batch or
    /// sequence, or a trailing dimension other than embedding_dim.
    pub fn check_input(&self, x: &Tensor) -> Result<(usize, usize)> {
        let (b, t, c) = x.dims3().map_err(|_| {
            AttentionError::shape(format!(
                "expected (batch, seq_len, embedding_dim) input, got {:?}",
                x.dims()
            ))
        })?;
        if c != self.embedding_dim {
            return Err(AttentionError::shape(format!(
                "expected embedding_dim {}, got {c}",
                self.embedding_dim
            )));
        }
        if b == 0 || t == 0 {
            return Err(AttentionError::shape(format!(
                "attention needs a non-empty batch and sequence, got ({b}, {t}, {c})"
            )));
        }
        Ok((b, t))
    }

    /// Project `x` (batch, seq_len, embedding_dim) to Q, K and V, each
    /// (batch, seq_len, output_dim).
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    pub fn project(&self, x: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        let q = self.w_query.forward(x)?;
        let k = self.w_key.forward(x)?;
        let v = self.w_value.forward(x)?;
        Ok((q, k, v))
    }

    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }
}

/// Compute `softmax(mask(Q Kᵗ / sqrt(head_dim)))`.
///
/// `q` and `k` share every axis except possibly the sequence axis; the last
/// axis is the feature axis. With a mask, blocked scores are set to `-inf`
/// before the softmax so their weights come out as exact zeros.
///
/// # Errors
/// Returns an error if tensor operations fail or the mask is too short.
pub fn attention_weights(
    q: &Tensor,
    k: &Tensor,
    head_dim: usize,
    mask: Option<&CausalMask>,
) -> Result<Tensor> {
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / (head_dim as f64).sqrt();

    let k_t = k.transpose(D::Minus2, D::Minus1)?.contiguous()?;
    let scores = (q.contiguous()?.matmul(&k_t)? * scale)?;

    let scores = match mask {
        Some(mask) => mask.apply(&scores)?,
        None => scores,
    };

    Ok(candle_nn::ops::softmax_last_dim(&scores)?)
}

/// Unmasked single-head self-attention.
///
/// Every position attends to every other position, including later ones.
pub struct SelfAttention {
    qkv: QkvProjection,
    output_dim: usize,
}

impl SelfAttention {
    /// # Errors
    /// Returns an error if the configuration is invalid or weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &AttentionConfig, vb: VarBuilder) -> Result<Self> {
        config.validate_single_head()?;
        let qkv = QkvProjection::new(config, vb)?;
        Ok(Self {
            qkv,
            output_dim: config.output_dim,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape (batch, seq_len, embedding_dim)
    ///
    /// # Returns
    /// Context tensor of shape (batch, seq_len, output_dim)
    ///
    /// # Errors
    /// Returns an error if the input shape is wrong or tensor operations fail.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(self.forward_with_weights(x)?.context)
    }

    /// Forward pass that also returns the (batch, seq_len, seq_len) weights.
    ///
    /// # Errors
    /// Returns an error if the input shape is wrong or tensor operations fail.
    pub fn forward_with_weights(&self, x: &Tensor) -> Result<AttentionOutput> {
        self.qkv.check_input(x)?;
        let (q, k, v) = self.qkv.project(x)?;

        let weights = attention_weights(&q, &k, self.output_dim, None)?;
        let context = weights.matmul(&v.contiguous()?)?;

        Ok(AttentionOutput { context, weights })
    }

    #[must_use]
    pub fn projections(&self) -> &QkvProjection {
        &self.qkv
    }
}

/// Single-head attention with a causal mask.
///
/// The context vector at position `i` depends only on positions `0..=i`.
pub struct CausalAttention {
    qkv: QkvProjection,
    mask: CausalMask,
    output_dim: usize,
}

impl CausalAttention {
    /// # Errors
    /// Returns an error if the configuration is invalid or weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &AttentionConfig, vb: VarBuilder) -> Result<Self> {
        config.validate_single_head()?;
        let mask = CausalMask::new(config.context_length, vb.device())?;
        let qkv = QkvProjection::new(config, vb)?;
        Ok(Self {
            qkv,
            mask,
            output_dim: config.output_dim,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape (batch, seq_len, embedding_dim)
    ///
    /// # Returns
    /// Context tensor of shape (batch, seq_len, output_dim)
    ///
    /// # Errors
    /// Returns an error if `seq_len` exceeds the cached mask, the input shape
    /// is wrong, or tensor operations fail.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(self.forward_with_weights(x)?.context)
    }

    /// Forward pass that also returns the (batch, seq_len, seq_len) weights.
    ///
    /// # Errors
    /// Same as [`CausalAttention::forward`].
    pub fn forward_with_weights(&self, x: &Tensor) -> Result<AttentionOutput> {
        let (_, t) = self.qkv.check_input(x)?;
        self.mask.check_len(t)?;
        let (q, k, v) = self.qkv.project(x)?;

        let weights = attention_weights(&q, &k, self.output_dim, Some(&self.mask))?;
        let context = weights.matmul(&v.contiguous()?)?;

        Ok(AttentionOutput { context, weights })
    }

    #[must_use]
    pub fn mask(&self) -> &CausalMask {
        &self.mask
    }

    #[must_use]
    pub fn projections(&self) -> &QkvProjection {
        &self.qkv
    }
}
