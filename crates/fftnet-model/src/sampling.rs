//! Turning a logit vector into a class index.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fftnet_core::{ClassIndex, SamplingPolicy};

/// Class sampler for autoregressive generation.
///
/// Owns the run's random source so a seeded run is fully reproducible,
/// including the random first sample of free-running generation.
#[derive(Debug)]
pub struct Sampler {
    policy: SamplingPolicy,
    rng: StdRng,
}

impl Sampler {
    /// Create a sampler; `seed = None` draws from entropy.
    pub fn new(policy: SamplingPolicy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { policy, rng }
    }

    /// Policy in use.
    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    /// Pick a class from logits.
    pub fn sample(&mut self, logits: &[f32]) -> ClassIndex {
        if logits.is_empty() {
            return 0;
        }
        match self.policy {
            SamplingPolicy::Argmax => self.greedy(logits),
            SamplingPolicy::Categorical => {
                let probs = softmax(logits);
                match WeightedIndex::new(&probs) {
                    Ok(dist) => dist.sample(&mut self.rng) as ClassIndex,
                    // All-zero weights after underflow: fall back to greedy
                    Err(_) => self.greedy(logits),
                }
            }
        }
    }

    /// Index of the highest logit; ties go to the lowest index.
    pub fn greedy(&self, logits: &[f32]) -> ClassIndex {
        argmax(logits)
    }

    /// Uniformly random class, used to seed free-running generation.
    pub fn random_class(&mut self, classes: usize) -> ClassIndex {
        self.rng.gen_range(0..classes) as ClassIndex
    }
}

/// Index of the highest value; ties go to the lowest index.
pub fn argmax(values: &[f32]) -> ClassIndex {
    values
        .iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max { (i, v) } else { (best, max) }
        })
        .0 as ClassIndex
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.iter().map(|&x| x / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_policy() {
        let mut sampler = Sampler::new(SamplingPolicy::Argmax, None);
        let logits = vec![0.1, 0.5, 0.3, 0.9, 0.2];
        assert_eq!(sampler.sample(&logits), 3);
    }

    #[test]
    fn test_argmax_is_deterministic() {
        let logits = vec![-1.0, 2.5, 2.4, 0.0];
        let first = Sampler::new(SamplingPolicy::Argmax, None).sample(&logits);
        for seed in 0..20 {
            let mut sampler = Sampler::new(SamplingPolicy::Argmax, Some(seed));
            assert_eq!(sampler.sample(&logits), first);
            assert_eq!(sampler.sample(&logits), first);
        }
    }

    #[test]
    fn test_argmax_ties_pick_first() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0]), 1);
    }

    #[test]
    fn test_softmax() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1]);
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_categorical_seeded_reproducible() {
        let logits = vec![0.2, 0.1, 0.4, 0.3];
        let mut a = Sampler::new(SamplingPolicy::Categorical, Some(42));
        let mut b = Sampler::new(SamplingPolicy::Categorical, Some(42));
        let xs: Vec<_> = (0..50).map(|_| a.sample(&logits)).collect();
        let ys: Vec<_> = (0..50).map(|_| b.sample(&logits)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_categorical_follows_distribution() {
        let logits = vec![0.0, 10.0, 0.0];
        let mut sampler = Sampler::new(SamplingPolicy::Categorical, Some(7));
        let hits = (0..200).filter(|_| sampler.sample(&logits) == 1).count();
        assert!(hits > 190);
    }

    #[test]
    fn test_random_class_in_range() {
        let mut sampler = Sampler::new(SamplingPolicy::Categorical, Some(1));
        for _ in 0..100 {
            assert!(sampler.random_class(4) < 4);
        }
    }
}
