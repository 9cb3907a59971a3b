use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Source of randomness consumed by the optimizers.
///
/// Every `rand::Rng` is a random source; tests may script their own draws.
pub trait RandomSource {
    /// Uniform double in [0, 1).
    fn uniform(&mut self) -> f64;
    /// Uniform integer in [0, upper).
    fn index(&mut self, upper: usize) -> usize;
    /// Standard normal double (mean 0, unit variance).
    fn gaussian(&mut self) -> f64;
    fn coin(&mut self) -> bool;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn uniform(&mut self) -> f64 {
        self.gen::<f64>()
    }

    fn index(&mut self, upper: usize) -> usize {
        self.gen_range(0..upper)
    }

    fn gaussian(&mut self) -> f64 {
        self.sample(StandardNormal)
    }

    fn coin(&mut self) -> bool {
        self.gen::<bool>()
    }
}

/// Seeded generator for reproducible runs, OS entropy otherwise.
pub fn seeded_rng(random_seed: Option<u64>) -> StdRng {
    match random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
