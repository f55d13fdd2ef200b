//! Weight initialization.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Strategy used to fill a freshly created parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Initializer {
    /// Glorot/Xavier uniform initialization.
    #[default]
    GlorotUniform,
    /// All zeros.
    Zeros,
    /// Constant value.
    Constant(f32),
}

impl Initializer {
    /// Produces `shape.iter().product()` initial values.
    pub fn initialize(&self, shape: &[usize], rng: &mut StdRng) -> Vec<f32> {
        let numel: usize = shape.iter().product();
        match self {
            Initializer::Zeros => vec![0.0; numel],
            Initializer::Constant(value) => vec![*value; numel],
            Initializer::GlorotUniform => {
                let (fan_in, fan_out) = fan_in_out(shape);
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                (0..numel).map(|_| rng.gen_range(-limit..limit)).collect()
            }
        }
    }
}

fn fan_in_out(shape: &[usize]) -> (usize, usize) {
    if shape.len() >= 2 {
        (shape[0].max(1), shape[1].max(1))
    } else if shape.len() == 1 {
        let dim = shape[0].max(1);
        (dim, dim)
    } else {
        (1, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_glorot_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let values = Initializer::GlorotUniform.initialize(&[4, 2], &mut rng);
        let limit = (6.0f32 / 6.0).sqrt();
        assert_eq!(values.len(), 8);
        assert!(values.iter().all(|v| v.abs() <= limit));
        assert!(values.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_seeded_initialization_is_reproducible() {
        let a = Initializer::GlorotUniform.initialize(&[3, 3], &mut StdRng::seed_from_u64(1));
        let b = Initializer::GlorotUniform.initialize(&[3, 3], &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_and_zeros() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(Initializer::Zeros.initialize(&[2], &mut rng), vec![0.0, 0.0]);
        assert_eq!(
            Initializer::Constant(0.5).initialize(&[3], &mut rng),
            vec![0.5; 3]
        );
    }
}
