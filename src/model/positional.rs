//! Fixed sinusoidal positional encoding.

use candle_core::{Device, Tensor};

use crate::error::{AttentionError, Result};

/// Sinusoidal position table added to token embeddings.
///
/// For position `pos` and feature pair `(2i, 2i + 1)`:
/// `pe[pos][2i] = sin(pos / 10000^(2i/d))` and
/// `pe[pos][2i + 1] = cos(pos / 10000^(2i/d))`.
///
/// The table is computed once and is not a trainable parameter.
#[derive(Debug, Clone)]
pub struct SinusoidalPositionalEncoding {
    /// Position table (context_length, embedding_dim)
    table: Tensor,
    context_length: usize,
    embedding_dim: usize,
}

impl SinusoidalPositionalEncoding {
    /// Build the position table.
    ///
    /// # Errors
    /// Returns [`AttentionError::Config`] if `embedding_dim` is odd or zero,
    /// or `context_length` is zero.
    pub fn new(context_length: usize, embedding_dim: usize, device: &Device) -> Result<Self> {
        if context_length == 0 {
            return Err(AttentionError::config(
                "positional encoding requires context_length > 0",
            ));
        }
        if embedding_dim == 0 || !embedding_dim.is_multiple_of(2) {
            return Err(AttentionError::config(format!(
                "positional encoding requires an even embedding_dim, got {embedding_dim}"
            )));
        }

        let table = Tensor::from_vec(
            sinusoid_table(context_length, embedding_dim),
            (context_length, embedding_dim),
            device,
        )?;
        log::debug!(
            "positional table built: context_length={context_length} embedding_dim={embedding_dim}"
        );

        Ok(Self {
            table,
            context_length,
            embedding_dim,
        })
    }

    /// Full (context_length, embedding_dim) table.
    #[must_use]
    pub fn table(&self) -> &Tensor {
        &self.table
    }

    #[must_use]
    pub fn context_length(&self) -> usize {
        self.context_length
    }

    #[must_use]
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Add the position signal to `x` of shape (batch, seq_len, embedding_dim).
    ///
    /// # Errors
    /// Returns [`AttentionError::Shape`] if `seq_len` exceeds the table or the
    /// trailing dimension does not match.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (_, t, c) = x.dims3().map_err(|_| {
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
        if t > self.context_length {
            return Err(AttentionError::shape(format!(
                "sequence length {t} exceeds positional table length {}",
                self.context_length
            )));
        }

        let pe = self.table.narrow(0, 0, t)?;
        Ok(x.broadcast_add(&pe.to_dtype(x.dtype())?)?)
    }

    /// Position signal for a single position, mostly useful for inspection.
    ///
    /// # Errors
    /// Returns an error if `pos` is outside the table.
    pub fn row(&self, pos: usize) -> Result<Vec<f32>> {
        if pos >= self.context_length {
            return Err(AttentionError::shape(format!(
                "position {pos} outside table of length {}",
                self.context_length
            )));
        }
        Ok(self.table.narrow(0, pos, 1)?.squeeze(0)?.to_vec1()?)
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn sinusoid_table(context_length: usize, embedding_dim: usize) -> Vec<f32> {
    let log_base = -(10_000f64.ln()) / embedding_dim as f64;
    let mut data = vec![0f32; context_length * embedding_dim];

    for pos in 0..context_length {
        let row = &mut data[pos * embedding_dim..(pos + 1) * embedding_dim];
        for i in (0..embedding_dim).step_by(2) {
            let angle = pos as f64 * (i as f64 * log_base).exp();
            row[i] = angle.sin() as f32;
            row[i + 1] = angle.cos() as f32;
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn test_odd_dim_rejected() {
        let err = SinusoidalPositionalEncoding::new(4, 5, &Device::Cpu).unwrap_err();
        assert!(matches!(err, AttentionError::Config(_)));
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(SinusoidalPositionalEncoding::new(0, 4, &Device::Cpu).is_err());
    }

    #[test]
    fn test_position_zero_alternates_zero_one() {
        let pe = SinusoidalPositionalEncoding::new(3, 6, &Device::Cpu).unwrap();
        assert_eq!(pe.row(0).unwrap(), vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_known_values() {
        let pe = SinusoidalPositionalEncoding::new(3, 4, &Device::Cpu).unwrap();
        let row = pe.row(1).unwrap();
        // i = 0: angle = 1; i = 2: angle = 1 / 10000^(2/4) = 0.01
        assert!((row[0] - 1f32.sin()).abs() < 1e-6);
        assert!((row[1] - 1f32.cos()).abs() < 1e-6);
        assert!((row[2] - 0.01f32.sin()).abs() < 1e-6);
        assert!((row[3] - 0.01f32.cos()).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic() {
        let a = SinusoidalPositionalEncoding::new(7, 4, &Device::Cpu).unwrap();
        let b = SinusoidalPositionalEncoding::new(7, 4, &Device::Cpu).unwrap();
        assert_eq!(
            a.table().to_vec2::<f32>().unwrap(),
            b.table().to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_forward_adds_prefix_of_table() {
        let pe = SinusoidalPositionalEncoding::new(8, 4, &Device::Cpu).unwrap();
        let x = Tensor::zeros((2, 3, 4), DType::F32, &Device::Cpu).unwrap();
        let y = pe.forward(&x).unwrap();
        assert_eq!(y.dims(), &[2, 3, 4]);

        let expected = pe.table().narrow(0, 0, 3).unwrap().to_vec2::<f32>().unwrap();
        for b in 0..2 {
            let got = y.get(b).unwrap().to_vec2::<f32>().unwrap();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_forward_rejects_long_sequence() {
        let pe = SinusoidalPositionalEncoding::new(2, 4, &Device::Cpu).unwrap();
        let x = Tensor::zeros((1, 3, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(pe.forward(&x), Err(AttentionError::Shape(_))));
    }

    #[test]
    fn test_forward_rejects_wrong_rank() {
        let pe = SinusoidalPositionalEncoding::new(4, 4, &Device::Cpu).unwrap();
        let x = Tensor::zeros((3, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(pe.forward(&x), Err(AttentionError::Shape(_))));
    }
}
