//! Randomness provider.
//!
//! Only default node identities draw random numbers. Production nodes use
//! the thread-local generator; tests can pin a seed to get the same ids on
//! every run.

use rand::distr::{Distribution, StandardUniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;

/// Source of random values.
pub trait RandomProvider: Clone {
    /// Draw a random value of type `T`.
    fn random<T>(&self) -> T
    where
        StandardUniform: Distribution<T>;
}

/// Thread-local, non-reproducible generator.
///
/// ```rust
/// use xcall_core::{RandomProvider, TokioRandomProvider};
///
/// let random = TokioRandomProvider::new();
/// let _bits: u64 = random.random();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRandomProvider;

impl TokioRandomProvider {
    /// Create the provider.
    pub fn new() -> Self {
        Self
    }
}

impl RandomProvider for TokioRandomProvider {
    fn random<T>(&self) -> T
    where
        StandardUniform: Distribution<T>,
    {
        rand::rng().random()
    }
}

/// Reproducible generator seeded once.
///
/// Clones share the same stream, so two nodes built from clones of one
/// provider still get distinct ids.
#[derive(Debug, Clone)]
pub struct SeededRandomProvider {
    rng: Rc<RefCell<StdRng>>,
}

impl SeededRandomProvider {
    /// Create a generator from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Rc::new(RefCell::new(StdRng::seed_from_u64(seed))),
        }
    }
}

impl RandomProvider for SeededRandomProvider {
    fn random<T>(&self) -> T
    where
        StandardUniform: Distribution<T>,
    {
        self.rng.borrow_mut().random()
    }
}
