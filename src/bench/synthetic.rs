//! Synthetic raw traces for benchmarks and tests

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Raw block ids used for noise accesses start here
const NOISE_BLOCK_BASE: i64 = 1 << 20;

/// Generator for 7-column raw traces cycling through a fixed block sequence
#[derive(Debug, Clone)]
pub struct SyntheticTrace {
    /// Raw block ids visited in order, repeatedly
    pub cycle: Vec<i64>,
    /// Offset step between consecutive accesses to one block
    pub step: i64,
    /// Probability of inserting a random access after each cycle element
    pub noise: f64,
    /// Distinct noise blocks to draw from
    pub noise_blocks: i64,
    pub seed: u64,
}

impl SyntheticTrace {
    pub fn new(cycle: Vec<i64>) -> Self {
        Self { cycle, step: 8, noise: 0.0, noise_blocks: 64, seed: 42 }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.clamp(0.0, 1.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Generate `count` raw rows
    pub fn rows(&self, count: usize) -> Vec<Vec<i64>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut offsets: std::collections::HashMap<i64, i64> = std::collections::HashMap::new();
        let mut rows = Vec::with_capacity(count);
        let mut position = 0usize;

        while rows.len() < count && !self.cycle.is_empty() {
            let block = if self.noise > 0.0 && rng.gen_bool(self.noise) {
                NOISE_BLOCK_BASE + rng.gen_range(0..self.noise_blocks.max(1))
            } else {
                let block = self.cycle[position % self.cycle.len()];
                position += 1;
                block
            };

            let offset = offsets.entry(block).or_insert(0);
            let is_read = i64::from(block % 4 != 3);
            rows.push(vec![0x400000 + block, block << 12, *offset, block, is_read, 0, 8]);
            *offset += self.step;
        }

        rows
    }
}
