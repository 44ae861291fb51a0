//! Inverted dropout driven by a caller-supplied random source.

use candle_core::Tensor;
use rand::Rng;

use crate::error::{AttentionError, Result};

/// Inverted dropout.
///
/// Elements are zeroed with probability `p` and survivors are scaled by
/// `1 / (1 - p)`. Randomness is never ambient: the generator is passed to
/// every training-mode call, so a seeded `StdRng` gives reproducible masks.
#[derive(Debug, Clone, Copy)]
pub struct Dropout {
    p: f32,
}

impl Dropout {
    /// # Errors
    /// Returns [`AttentionError::Config`] if `p` is outside `[0, 1)`.
    pub fn new(p: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(AttentionError::config(format!(
                "dropout must be in [0, 1), got {p}"
            )));
        }
        Ok(Self { p })
    }

    /// Drop probability.
    #[must_use]
    pub fn p(&self) -> f32 {
        self.p
    }

    /// Apply dropout in training mode.
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    pub fn forward<R: Rng + ?Sized>(&self, x: &Tensor, rng: &mut R) -> Result<Tensor> {
        if self.p <= 0.0 {
            return Ok(x.clone());
        }

        let keep_scale = 1.0 / (1.0 - self.p);
        let mask: Vec<f32> = (0..x.elem_count())
            .map(|_| {
                if rng.r#gen::<f32>() < self.p {
                    0.0
                } else {
                    keep_scale
                }
            })
            .collect();
        let mask = Tensor::from_vec(mask, x.shape().clone(), x.device())?.to_dtype(x.dtype())?;

        Ok(x.mul(&mask)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_rejects_invalid_probability() {
        assert!(Dropout::new(1.0).is_err());
        assert!(Dropout::new(-0.5).is_err());
        assert!(Dropout::new(0.0).is_ok());
    }

    #[test]
    fn test_zero_probability_is_identity() {
        let x = Tensor::new(&[[1.0f32, 2.0], [3.0, 4.0]], &Device::Cpu).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let y = Dropout::new(0.0).unwrap().forward(&x, &mut rng).unwrap();
        assert_eq!(y.to_vec2::<f32>().unwrap(), x.to_vec2::<f32>().unwrap());
    }

    #[test]
    fn test_survivors_are_rescaled() {
        let x = Tensor::ones((8, 16), candle_core::DType::F32, &Device::Cpu).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let y = Dropout::new(0.5).unwrap().forward(&x, &mut rng).unwrap();

        let values = y.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|v| *v == 0.0 || (*v - 2.0).abs() < 1e-6));
        assert!(values.iter().any(|v| *v == 0.0));
        assert!(values.iter().any(|v| *v > 0.0));
    }

    #[test]
    fn test_same_seed_same_mask() {
        let x = Tensor::ones((4, 4), candle_core::DType::F32, &Device::Cpu).unwrap();
        let dropout = Dropout::new(0.3).unwrap();

        let a = dropout
            .forward(&x, &mut StdRng::seed_from_u64(42))
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        let b = dropout
            .forward(&x, &mut StdRng::seed_from_u64(42))
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        assert_eq!(a, b);
    }
}
