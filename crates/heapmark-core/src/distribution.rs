//! Size distributions for allocation requests.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A closed, ordered set of request sizes in bytes.
///
/// Requests are drawn uniformly with replacement. Every entry is non-zero;
/// construction (including deserialization) enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct SizeDistribution {
    sizes: Vec<usize>,
}

impl SizeDistribution {
    /// Build a distribution from explicit sizes.
    pub fn new(sizes: Vec<usize>) -> Result<Self, ConfigError> {
        if sizes.is_empty() {
            return Err(ConfigError::EmptyDistribution);
        }
        if let Some(index) = sizes.iter().position(|&s| s == 0) {
            return Err(ConfigError::ZeroSize { index });
        }
        Ok(Self { sizes })
    }

    /// Every size in `low..=high`.
    pub fn range(low: usize, high: usize) -> Result<Self, ConfigError> {
        Self::new((low..=high).collect())
    }

    /// `2^e` for every exponent in `from..to` taking every `step`-th one.
    pub fn powers_of_two(from: u32, to: u32, step: u32) -> Result<Self, ConfigError> {
        let sizes = (from..to)
            .step_by(step.max(1) as usize)
            .filter_map(|e| 1usize.checked_shl(e))
            .collect();
        Self::new(sizes)
    }

    /// Draw one request size.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        // Non-empty by construction.
        self.sizes.choose(rng).copied().unwrap_or(self.sizes[0])
    }

    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.sizes.iter().copied().max().unwrap_or(0)
    }

    #[must_use]
    pub fn min_size(&self) -> usize {
        self.sizes.iter().copied().min().unwrap_or(0)
    }

    /// Parse a compact description: `a..=b`, `a..b`, `pow2:a..b[:step]`, or `a,b,c`.
    pub fn parse_spec(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        if let Some(rest) = spec.strip_prefix("pow2:") {
            let (range, step) = match rest.split_once(':') {
                Some((range, step)) => (range, parse_num::<u32>(step)?),
                None => (rest, 1),
            };
            let (from, to) = range
                .split_once("..")
                .ok_or_else(|| format!("expected pow2:a..b, got '{spec}'"))?;
            return Self::powers_of_two(parse_num(from)?, parse_num(to)?, step)
                .map_err(|e| e.to_string());
        }
        if let Some((low, high)) = spec.split_once("..=") {
            return Self::range(parse_num(low)?, parse_num(high)?).map_err(|e| e.to_string());
        }
        if let Some((low, high)) = spec.split_once("..") {
            let high: usize = parse_num(high)?;
            return Self::range(parse_num(low)?, high.saturating_sub(1))
                .map_err(|e| e.to_string());
        }
        let sizes = spec
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(parse_num)
            .collect::<Result<Vec<usize>, _>>()?;
        Self::new(sizes).map_err(|e| e.to_string())
    }
}

fn parse_num<T: std::str::FromStr>(raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    let cleaned = raw.trim().replace('_', "");
    cleaned
        .parse::<T>()
        .map_err(|e| format!("invalid number '{}': {e}", raw.trim()))
}

impl TryFrom<Vec<usize>> for SizeDistribution {
    type Error = ConfigError;

    fn try_from(sizes: Vec<usize>) -> Result<Self, Self::Error> {
        Self::new(sizes)
    }
}

impl From<SizeDistribution> for Vec<usize> {
    fn from(dist: SizeDistribution) -> Self {
        dist.sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rejects_empty_and_zero() {
        assert_eq!(
            SizeDistribution::new(Vec::new()),
            Err(ConfigError::EmptyDistribution)
        );
        assert_eq!(
            SizeDistribution::new(vec![8, 0, 4]),
            Err(ConfigError::ZeroSize { index: 1 })
        );
    }

    #[test]
    fn samples_are_members() {
        let dist = SizeDistribution::new(vec![16, 256, 4096, 65536]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let size = dist.sample(&mut rng);
            assert!(dist.sizes().contains(&size));
        }
    }

    #[test]
    fn powers_of_two_with_step() {
        let dist = SizeDistribution::powers_of_two(0, 24, 2).unwrap();
        assert_eq!(dist.len(), 12);
        assert_eq!(dist.min_size(), 1);
        assert_eq!(dist.max_size(), 1 << 22);
    }

    #[test]
    fn parse_spec_forms() {
        assert_eq!(SizeDistribution::parse_spec("16..=512").unwrap().len(), 497);
        assert_eq!(SizeDistribution::parse_spec("1..257").unwrap().max_size(), 256);
        assert_eq!(
            SizeDistribution::parse_spec("pow2:20..28").unwrap().sizes(),
            &[1 << 20, 1 << 21, 1 << 22, 1 << 23, 1 << 24, 1 << 25, 1 << 26, 1 << 27]
        );
        assert_eq!(
            SizeDistribution::parse_spec("16, 1_048_576").unwrap().sizes(),
            &[16, 1_048_576]
        );
        assert!(SizeDistribution::parse_spec("").is_err());
        assert!(SizeDistribution::parse_spec("a..b").is_err());
    }

    #[test]
    fn deserialize_validates() {
        let ok: SizeDistribution = serde_json::from_str("[16, 32]").unwrap();
        assert_eq!(ok.sizes(), &[16, 32]);
        assert!(serde_json::from_str::<SizeDistribution>("[]").is_err());
        assert!(serde_json::from_str::<SizeDistribution>("[0]").is_err());
    }
}
