//! Multi-head causal attention.

use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder};
use rand::Rng;

use super::attention::{AttentionOutput, QkvProjection, attention_weights};
use super::config::AttentionConfig;
use super::dropout::Dropout;
use super::mask::CausalMask;
use crate::error::Result;

/// Multi-head causal attention.
///
/// Q, K and V are projected once to output_dim and split into `num_heads`
/// heads of `head_dim` features. Each head runs masked scaled dot-product
/// attention scaled by `sqrt(head_dim)`, and the per-head contexts are
/// concatenated back to output_dim.
pub struct MultiHeadAttention {
    qkv: QkvProjection,
    /// Optional re-projection of the merged heads (output_dim -> output_dim)
    out_proj: Option<Linear>,
    mask: CausalMask,
    /// Dropout on attention weights, active only in training mode
    dropout: Dropout,
    num_heads: usize,
    head_dim: usize,
    output_dim: usize,
}

impl MultiHeadAttention {
    /// Create a new multi-head attention layer.
    ///
    /// # Arguments
    /// * `config` - Attention configuration
    /// * `vb` - Variable builder for loading weights
    ///
    /// # Errors
    /// Returns an error if `output_dim` is not divisible by `num_heads`, any
    /// other field is invalid, or weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &AttentionConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;

        let mask = CausalMask::new(config.context_length, vb.device())?;
        let qkv = QkvProjection::new(config, vb.clone())?;
        let out_proj = if config.output_projection {
            Some(candle_nn::linear_b(
                config.output_dim,
                config.output_dim,
                config.qkv_bias,
                vb.pp("out_proj"),
            )?)
        } else {
            None
        };

        log::debug!(
            "multi-head attention: heads={} head_dim={} output_dim={} out_proj={}",
            config.num_heads,
            config.head_dim(),
            config.output_dim,
            out_proj.is_some()
        );

        Ok(Self {
            qkv,
            out_proj,
            mask,
            dropout: Dropout::new(config.dropout)?,
            num_heads: config.num_heads,
            head_dim: config.head_dim(),
            output_dim: config.output_dim,
        })
    }

    /// Forward pass in evaluation mode (no dropout).
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

    /// Forward pass in training mode; attention weights go through dropout
    /// driven by `rng`.
    ///
    /// # Errors
    /// Same as [`MultiHeadAttention::forward`].
    pub fn forward_train<R: Rng + ?Sized>(&self, x: &Tensor, rng: &mut R) -> Result<Tensor> {
        Ok(self.run(x, Some(rng))?.context)
    }

    /// Evaluation-mode forward pass that also returns the
    /// (batch, num_heads, seq_len, seq_len) weights.
    ///
    /// # Errors
    /// Same as [`MultiHeadAttention::forward`].
    pub fn forward_with_weights(&self, x: &Tensor) -> Result<AttentionOutput> {
        self.run::<rand::rngs::StdRng>(x, None)
    }

    #[allow(clippy::many_single_char_names)]
    fn run<R: Rng + ?Sized>(&self, x: &Tensor, rng: Option<&mut R>) -> Result<AttentionOutput> {
        let (b, t) = self.qkv.check_input(x)?;
        self.mask.check_len(t)?;

        let (q, k, v) = self.qkv.project(x)?;

        // (B, T, out) -> (B, n_head, T, head_dim)
        let q = self.split_heads(&q, b, t)?;
        let k = self.split_heads(&k, b, t)?;
        let v = self.split_heads(&v, b, t)?;

        let weights = attention_weights(&q, &k, self.head_dim, Some(&self.mask))?;
        let weights = match rng {
            Some(rng) => self.dropout.forward(&weights, rng)?,
            None => weights,
        };

        // (B, n_head, T, T) @ (B, n_head, T, head_dim) -> (B, T, out)
        let y = weights.matmul(&v)?;
        let y = y
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, t, self.output_dim))?;

        let context = match &self.out_proj {
            Some(proj) => proj.forward(&y)?,
            None => y,
        };

        Ok(AttentionOutput { context, weights })
    }

    fn split_heads(&self, x: &Tensor, b: usize, t: usize) -> Result<Tensor> {
        Ok(x
            .reshape((b, t, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    #[must_use]
    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    #[must_use]
    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    #[must_use]
    pub fn has_output_projection(&self) -> bool {
        self.out_proj.is_some()
    }
}
