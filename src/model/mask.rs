//! Cached causal mask.

use candle_core::{DType, Device, Tensor};

use crate::error::{AttentionError, Result};

/// Boolean upper-triangular mask, `mask[i][j] = 1` iff `j > i`.
///
/// Built once for the longest supported sequence and narrowed for shorter
/// ones. The mask carries no batch or head axis; it broadcasts over both.
#[derive(Debug, Clone)]
pub struct CausalMask {
    /// Mask of shape (context_length, context_length), dtype u8
    mask: Tensor,
    context_length: usize,
}

impl CausalMask {
    /// Create a causal mask covering sequences up to `context_length`.
    ///
    /// # Errors
    /// Returns [`AttentionError::Config`] if `context_length` is zero.
    pub fn new(context_length: usize, device: &Device) -> Result<Self> {
        if context_length == 0 {
            return Err(AttentionError::config(
                "causal mask requires context_length > 0",
            ));
        }

        let data: Vec<u8> = (0..context_length)
            .flat_map(|i| (0..context_length).map(move |j| u8::from(j > i)))
            .collect();
        let mask = Tensor::from_vec(data, (context_length, context_length), device)?;
        log::debug!("causal mask cached: context_length={context_length}");

        Ok(Self {
            mask,
            context_length,
        })
    }

    #[must_use]
    pub fn context_length(&self) -> usize {
        self.context_length
    }

    /// Whether query position `i` is blocked from key position `j`.
    #[must_use]
    pub fn is_masked(&self, i: usize, j: usize) -> bool {
        j > i
    }

    /// Ensure a sequence of `seq_len` fits in the cached mask.
    ///
    /// # Errors
    /// Returns [`AttentionError::Shape`] if `seq_len` exceeds the cached extent.
    pub fn check_len(&self, seq_len: usize) -> Result<()> {
        if seq_len > self.context_length {
            return Err(AttentionError::shape(format!(
                "sequence length {seq_len} exceeds causal mask extent {}",
                self.context_length
            )));
        }
        Ok(())
    }

    /// Mask narrowed to the active sequence length, shape (seq_len, seq_len).
    ///
    /// # Errors
    /// Returns [`AttentionError::Shape`] if `seq_len` exceeds the cached extent.
    pub fn slice(&self, seq_len: usize) -> Result<Tensor> {
        self.check_len(seq_len)?;
        Ok(self.mask.narrow(0, 0, seq_len)?.narrow(1, 0, seq_len)?)
    }

    /// Replace blocked entries of `scores` with `-inf`.
    ///
    /// `scores` may have any number of leading axes; its last two axes are
    /// (query, key) and must be square.
    ///
    /// # Errors
    /// Returns an error if the scores are not square or too long.
    pub fn apply(&self, scores: &Tensor) -> Result<Tensor> {
        let dims = scores.dims();
        let rank = dims.len();
        if rank < 2 || dims[rank - 1] != dims[rank - 2] {
            return Err(AttentionError::shape(format!(
                "scores must end in a square (seq, seq) block, got {dims:?}"
            )));
        }

        let mask = self.slice(dims[rank - 1])?.broadcast_as(scores.shape())?;
        let neg_inf = Tensor::new(f32::NEG_INFINITY, scores.device())?
            .to_dtype(scores.dtype())?
            .broadcast_as(scores.shape())?;

        Ok(mask.where_cond(&neg_inf, scores)?)
    }

    /// Dense copy of the active mask as booleans.
    ///
    /// # Errors
    /// Returns an error if `seq_len` exceeds the cached extent.
    pub fn to_bools(&self, seq_len: usize) -> Result<Vec<Vec<bool>>> {
        let rows: Vec<Vec<u8>> = self.slice(seq_len)?.to_dtype(DType::U8)?.to_vec2()?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| v != 0).collect())
            .collect())
    }
}
