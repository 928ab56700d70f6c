//! Randomness backends: the master RNG of a run and per-attempt choice sources.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};

/// Create the master RNG for a run
pub fn create_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Pick a fresh run seed from entropy
pub fn entropy_seed() -> u64 {
    rand::thread_rng().r#gen()
}

/// Where an attempt's choices come from
#[derive(Debug, Clone)]
pub enum ChoiceSource {
    /// Every choice is drawn uniformly from the RNG
    Fresh(StdRng),
    /// Choices are read from `prefix`; once it runs out, draws come from `fallback`
    Replay { prefix: Vec<u64>, fallback: StdRng },
}

impl ChoiceSource {
    /// Fresh source seeded from `seed`
    pub fn fresh(seed: u64) -> Self {
        ChoiceSource::Fresh(StdRng::seed_from_u64(seed))
    }

    /// Replay `prefix`, then continue with randomness seeded from `fallback_seed`
    pub fn replay(prefix: Vec<u64>, fallback_seed: u64) -> Self {
        ChoiceSource::Replay {
            prefix,
            fallback: StdRng::seed_from_u64(fallback_seed),
        }
    }

    /// Replay `prefix` with a fallback derived from the prefix itself
    pub fn exact(prefix: Vec<u64>) -> Self {
        let seed = hash_choices(&prefix);
        Self::replay(prefix, seed)
    }

    /// Produce the choice at `position`: the replayed value if one exists, else `draw(rng)`
    pub fn next_choice(&mut self, position: usize, draw: impl FnOnce(&mut StdRng) -> u64) -> u64 {
        match self {
            ChoiceSource::Fresh(rng) => draw(rng),
            ChoiceSource::Replay { prefix, fallback } => match prefix.get(position) {
                Some(value) => *value,
                None => draw(fallback),
            },
        }
    }
}

/// Uniform draw in `[0, n]`
pub(crate) fn uniform(rng: &mut StdRng, n: u64) -> u64 {
    if n == u64::MAX {
        rng.next_u64()
    } else {
        rng.gen_range(0..=n)
    }
}

/// Stable 64-bit hash of a choice sequence: the leading bytes of its SHA-256
pub fn hash_choices(choices: &[u64]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update((choices.len() as u64).to_le_bytes());
    for choice in choices {
        hasher.update(choice.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rng_is_deterministic_with_seed() {
        let mut a = create_rng(Some(42));
        let mut b = create_rng(Some(42));
        let xs: Vec<u64> = (0..10).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..10).map(|_| b.next_u64()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_replay_reads_prefix_then_falls_back() {
        let mut source = ChoiceSource::replay(vec![7, 3], 1);
        assert_eq!(source.next_choice(0, |_| 99), 7);
        assert_eq!(source.next_choice(1, |_| 99), 3);
        assert_eq!(source.next_choice(2, |_| 99), 99);
    }

    #[test]
    fn test_fresh_uses_draw() {
        let mut source = ChoiceSource::fresh(5);
        let value = source.next_choice(0, |rng| uniform(rng, 10));
        assert!(value <= 10);
    }

    #[test]
    fn test_uniform_full_range() {
        let mut rng = create_rng(Some(1));
        let _ = uniform(&mut rng, u64::MAX);
        for _ in 0..100 {
            assert!(uniform(&mut rng, 3) <= 3);
        }
        assert_eq!(uniform(&mut rng, 0), 0);
    }

    #[test]
    fn test_hash_choices_distinguishes_sequences() {
        assert_eq!(hash_choices(&[1, 2, 3]), hash_choices(&[1, 2, 3]));
        assert_ne!(hash_choices(&[1, 2, 3]), hash_choices(&[3, 2, 1]));
        assert_ne!(hash_choices(&[]), hash_choices(&[0]));
    }
}
