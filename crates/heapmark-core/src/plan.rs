//! Operation sequence generation.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// One step of a workload plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpToken {
    Allocate,
    Release,
}

impl OpToken {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OpToken::Allocate => "allocate",
            OpToken::Release => "release",
        }
    }
}

/// A fixed, pre-shuffled sequence of allocate/release tokens.
///
/// The order is decided once at construction and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadPlan {
    tokens: Vec<OpToken>,
}

impl WorkloadPlan {
    /// `allocate_count` allocate tokens and `release_count` release tokens in
    /// uniformly random order drawn from `rng`.
    pub fn generate<R: Rng + ?Sized>(
        allocate_count: usize,
        release_count: usize,
        rng: &mut R,
    ) -> Self {
        let mut tokens = Vec::with_capacity(allocate_count + release_count);
        tokens.extend(std::iter::repeat_n(OpToken::Allocate, allocate_count));
        tokens.extend(std::iter::repeat_n(OpToken::Release, release_count));
        tokens.shuffle(rng);
        Self { tokens }
    }

    /// A plan with an explicit order (scripted workloads and tests).
    #[must_use]
    pub fn from_tokens(tokens: Vec<OpToken>) -> Self {
        Self { tokens }
    }

    #[must_use]
    pub fn tokens(&self) -> &[OpToken] {
        &self.tokens
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[must_use]
    pub fn allocate_count(&self) -> usize {
        self.count(OpToken::Allocate)
    }

    #[must_use]
    pub fn release_count(&self) -> usize {
        self.count(OpToken::Release)
    }

    fn count(&self, token: OpToken) -> usize {
        self.tokens.iter().filter(|&&t| t == token).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn counts_match_request() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = WorkloadPlan::generate(550, 450, &mut rng);
        assert_eq!(plan.len(), 1000);
        assert_eq!(plan.allocate_count(), 550);
        assert_eq!(plan.release_count(), 450);
    }

    #[test]
    fn zero_counts_are_valid() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(WorkloadPlan::generate(0, 0, &mut rng).is_empty());
        let only_releases = WorkloadPlan::generate(0, 3, &mut rng);
        assert_eq!(only_releases.tokens(), &[OpToken::Release; 3]);
    }

    #[test]
    fn same_seed_same_order() {
        let a = WorkloadPlan::generate(100, 80, &mut StdRng::seed_from_u64(0xDEAD_BEEF));
        let b = WorkloadPlan::generate(100, 80, &mut StdRng::seed_from_u64(0xDEAD_BEEF));
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_shuffle_differently() {
        let a = WorkloadPlan::generate(100, 100, &mut StdRng::seed_from_u64(1));
        let b = WorkloadPlan::generate(100, 100, &mut StdRng::seed_from_u64(2));
        assert_ne!(a, b);
    }

    #[test]
    fn shuffle_actually_interleaves() {
        let plan = WorkloadPlan::generate(500, 500, &mut StdRng::seed_from_u64(3));
        let first_release = plan
            .tokens()
            .iter()
            .position(|&t| t == OpToken::Release)
            .unwrap();
        assert!(first_release < 500);
    }
}
