use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Source of randomized election timeouts, uniform over `[min_ms, max_ms]`.
///
/// Seeding makes the sequence of timeouts reproducible, which tests use to
/// get deterministic elections without depending on wall-clock randomness.
#[derive(Debug)]
pub struct ElectionTimer {
    min_ms: u64,
    max_ms: u64,
    rng: StdRng,
}

impl ElectionTimer {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms,
            max_ms,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(min_ms: u64, max_ms: u64, seed: u64) -> Self {
        Self {
            min_ms,
            max_ms,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Restart the random sequence from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Draw the next election timeout.
    pub fn next_timeout(&mut self) -> Duration {
        let timeout_ms = if self.min_ms >= self.max_ms {
            self.min_ms
        } else {
            self.rng.gen_range(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(timeout_ms)
    }
}
