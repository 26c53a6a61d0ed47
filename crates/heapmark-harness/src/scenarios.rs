//! Scenario catalogue.
//!
//! Three fixed stress scenarios plus any number of seeded random cases. The
//! stress scenarios are described by a total operation count and a release
//! probability; by default the allocate/release split is derived from the
//! two. [`StressSplit::Fixed`] instead runs every stress scenario at the
//! default 550/450 split so results line up with legacy baselines.

use heapmark_core::config::{DEFAULT_ALLOCATE_COUNT, DEFAULT_RELEASE_COUNT};
use heapmark_core::{ConfigError, EvictionPolicy, RunConfig, SizeDistribution, Strategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Stress,
    RandomCase,
}

impl ScenarioKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stress => "stress",
            Self::RandomCase => "random_case",
        }
    }
}

/// Allocate/release split for the stress scenarios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressSplit {
    /// `round(num_ops * free_prob)` releases, the rest allocates.
    #[default]
    Derived,
    /// 550 allocates and 450 releases regardless of the declared op count.
    Fixed,
}

/// One named workload shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub kind: ScenarioKind,
    pub sizes: SizeDistribution,
    pub malloc_count: usize,
    pub free_count: usize,
}

impl Scenario {
    /// Split `num_ops` so that a `free_prob` fraction (rounded) are releases.
    pub fn from_ops(
        name: impl Into<String>,
        sizes: SizeDistribution,
        num_ops: usize,
        free_prob: f64,
    ) -> Self {
        let free_prob = free_prob.clamp(0.0, 1.0);
        let free_count = ((num_ops as f64) * free_prob).round() as usize;
        let free_count = free_count.min(num_ops);
        Self {
            name: name.into(),
            kind: ScenarioKind::Stress,
            sizes,
            malloc_count: num_ops - free_count,
            free_count,
        }
    }

    /// Replace the derived split with the default 550/450 counts.
    #[must_use]
    pub fn with_fixed_split(mut self) -> Self {
        self.malloc_count = DEFAULT_ALLOCATE_COUNT;
        self.free_count = DEFAULT_RELEASE_COUNT;
        self
    }

    #[must_use]
    pub fn total_ops(&self) -> usize {
        self.malloc_count + self.free_count
    }

    /// Run configuration for this scenario under `strategy` with `seed`.
    #[must_use]
    pub fn run_config(&self, strategy: Strategy, eviction: EvictionPolicy, seed: u64) -> RunConfig {
        RunConfig::with_sizes(self.sizes.clone())
            .strategy(strategy)
            .counts(self.malloc_count, self.free_count)
            .eviction(eviction)
            .seed(seed)
    }
}

/// The stress scenarios with the derived split.
pub fn stress_scenarios() -> Result<Vec<Scenario>, ConfigError> {
    stress_scenarios_with(StressSplit::Derived)
}

/// The stress scenarios under `split`.
pub fn stress_scenarios_with(split: StressSplit) -> Result<Vec<Scenario>, ConfigError> {
    let scenarios = vec![
        // 1 MiB to 128 MiB
        Scenario::from_ops(
            "ExtremeLargeAllocations",
            SizeDistribution::powers_of_two(20, 28, 1)?,
            200,
            0.3,
        ),
        Scenario::from_ops(
            "HighConcurrencySmall",
            SizeDistribution::range(16, 512)?,
            20_000,
            0.1,
        ),
        Scenario::from_ops(
            "FragmentationNightmare",
            SizeDistribution::new(vec![16, 256, 4096, 65536])?,
            20_000,
            0.5,
        ),
    ];
    Ok(match split {
        StressSplit::Derived => scenarios,
        StressSplit::Fixed => scenarios.into_iter().map(Scenario::with_fixed_split).collect(),
    })
}

/// Size sets a random case draws from.
pub fn random_case_size_options() -> Result<Vec<SizeDistribution>, ConfigError> {
    Ok(vec![
        SizeDistribution::range(1, 256)?,
        SizeDistribution::powers_of_two(20, 24, 1)?,
        SizeDistribution::powers_of_two(0, 24, 2)?,
        SizeDistribution::new(vec![16, 1_048_576])?,
        SizeDistribution::powers_of_two(0, 24, 1)?,
    ])
}

/// `count` random cases named `Test_0000`, `Test_0001`, ...
pub fn random_cases(count: usize, seed: u64) -> Result<Vec<Scenario>, ConfigError> {
    let options = random_case_size_options()?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..count)
        .map(|i| Scenario {
            name: format!("Test_{i:04}"),
            kind: ScenarioKind::RandomCase,
            sizes: options[rng.gen_range(0..options.len())].clone(),
            malloc_count: DEFAULT_ALLOCATE_COUNT,
            free_count: DEFAULT_RELEASE_COUNT,
        })
        .collect())
}

/// Stress scenarios followed by `random_case_count` random cases.
pub fn catalogue(
    random_case_count: usize,
    seed: u64,
    split: StressSplit,
) -> Result<Vec<Scenario>, ConfigError> {
    let mut all = stress_scenarios_with(split)?;
    all.extend(random_cases(random_case_count, seed)?);
    Ok(all)
}
