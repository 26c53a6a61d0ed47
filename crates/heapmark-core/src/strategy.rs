//! Allocation strategy identifiers.
//!
//! The engine only forwards a [`Strategy`] to [`crate::AllocatorUnderTest::initialize`];
//! it never branches on the value. Placement behavior belongs to the allocator.

use serde::{Deserialize, Serialize};

/// Placement policy requested from the allocator under test.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Lowest-addressed free block that fits.
    #[default]
    FirstFit,
    /// Smallest free block that fits.
    BestFit,
    /// Largest free block that fits.
    WorstFit,
    /// Next fit: continue scanning from where the previous search stopped.
    Sequential,
    /// Uniformly random choice among the fitting free blocks.
    Random,
}

impl Strategy {
    /// All strategies in canonical report order.
    #[must_use]
    pub const fn all() -> [Strategy; 5] {
        [
            Strategy::FirstFit,
            Strategy::BestFit,
            Strategy::WorstFit,
            Strategy::Sequential,
            Strategy::Random,
        ]
    }

    /// Stable machine-readable name (matches the serde form).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Strategy::FirstFit => "first-fit",
            Strategy::BestFit => "best-fit",
            Strategy::WorstFit => "worst-fit",
            Strategy::Sequential => "sequential",
            Strategy::Random => "random",
        }
    }

    /// Human-readable label used in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Strategy::FirstFit => "First Fit",
            Strategy::BestFit => "Best Fit",
            Strategy::WorstFit => "Worst Fit",
            Strategy::Sequential => "Sequential",
            Strategy::Random => "Random",
        }
    }

    /// Parse from string (case-insensitive, separators ignored).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "firstfit" | "first" | "ff" => Some(Self::FirstFit),
            "bestfit" | "best" | "bf" => Some(Self::BestFit),
            "worstfit" | "worst" | "wf" => Some(Self::WorstFit),
            "sequential" | "nextfit" | "next" | "nf" => Some(Self::Sequential),
            "random" | "randomfit" | "rand" => Some(Self::Random),
            _ => None,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_loose(s).ok_or_else(|| {
            format!(
                "unknown strategy '{s}', expected one of first-fit|best-fit|worst-fit|sequential|random"
            )
        })
    }
}
