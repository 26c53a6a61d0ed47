//! Immutable output of one workload run.

use serde::{Deserialize, Serialize};

use crate::strategy::Strategy;

/// One point of the utilization time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    /// Seconds since run start (monotonic clock).
    pub elapsed_secs: f64,
    /// Live bytes (including metadata) over accounted capacity.
    pub ratio: f64,
}

/// Timing of one allocator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySample {
    /// Requested size in bytes.
    pub size: usize,
    pub latency_ns: u64,
    /// `false` for allocate calls that returned the failure sentinel.
    pub succeeded: bool,
}

/// Raw measurement series of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub strategy: Strategy,
    pub seed: u64,
    /// Mean of the utilization ratios, as a percentage.
    pub average_utilization: f64,
    pub utilization_series: Vec<UtilizationSample>,
    /// Seconds spent replaying the plan (cleanup excluded).
    pub total_wall_time: f64,
    pub allocate_latencies: Vec<LatencySample>,
    pub release_latencies: Vec<LatencySample>,
    pub peak_overhead_percent: f64,
    /// Release tokens that found no live allocation.
    pub skipped_releases: usize,
    pub failed_allocations: usize,
    /// Releases issued after the plan to empty the tracker.
    pub cleanup_releases: usize,
    pub peak_live_count: usize,
    pub final_capacity: u64,
}

impl RunResult {
    /// Assemble a result from the collected series.
    ///
    /// Pure: no allocator interaction, no randomness.
    #[must_use]
    pub(crate) fn assemble(parts: RunParts) -> Self {
        let average_utilization = mean_ratio(&parts.utilization_series) * 100.0;
        let failed_allocations = parts
            .allocate_latencies
            .iter()
            .filter(|s| !s.succeeded)
            .count();
        Self {
            strategy: parts.strategy,
            seed: parts.seed,
            average_utilization,
            utilization_series: parts.utilization_series,
            total_wall_time: parts.total_wall_time,
            allocate_latencies: parts.allocate_latencies,
            release_latencies: parts.release_latencies,
            peak_overhead_percent: parts.peak_overhead_percent,
            skipped_releases: parts.skipped_releases,
            failed_allocations,
            cleanup_releases: parts.cleanup_releases,
            peak_live_count: parts.peak_live_count,
            final_capacity: parts.final_capacity,
        }
    }

    /// Allocate calls that returned a handle.
    #[must_use]
    pub fn successful_allocations(&self) -> usize {
        self.allocate_latencies.len() - self.failed_allocations
    }

    /// Release tokens that actually released something.
    #[must_use]
    pub fn effective_releases(&self) -> usize {
        self.release_latencies.len()
    }

    #[must_use]
    pub fn mean_allocate_latency_ns(&self) -> f64 {
        mean_latency(&self.allocate_latencies)
    }

    #[must_use]
    pub fn mean_release_latency_ns(&self) -> f64 {
        mean_latency(&self.release_latencies)
    }

    /// Compact JSON summary without the per-operation series.
    #[must_use]
    pub fn summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "strategy": self.strategy,
            "seed": self.seed,
            "average_utilization": self.average_utilization,
            "total_wall_time": self.total_wall_time,
            "peak_overhead_percent": self.peak_overhead_percent,
            "allocations": self.allocate_latencies.len(),
            "failed_allocations": self.failed_allocations,
            "releases": self.release_latencies.len(),
            "skipped_releases": self.skipped_releases,
            "cleanup_releases": self.cleanup_releases,
            "peak_live_count": self.peak_live_count,
            "final_capacity": self.final_capacity,
            "mean_allocate_latency_ns": self.mean_allocate_latency_ns(),
            "mean_release_latency_ns": self.mean_release_latency_ns(),
        })
    }
}

/// Everything the executor collected, before assembly.
#[derive(Debug)]
pub(crate) struct RunParts {
    pub strategy: Strategy,
    pub seed: u64,
    pub utilization_series: Vec<UtilizationSample>,
    pub total_wall_time: f64,
    pub allocate_latencies: Vec<LatencySample>,
    pub release_latencies: Vec<LatencySample>,
    pub peak_overhead_percent: f64,
    pub skipped_releases: usize,
    pub cleanup_releases: usize,
    pub peak_live_count: usize,
    pub final_capacity: u64,
}

fn mean_ratio(series: &[UtilizationSample]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().map(|s| s.ratio).sum::<f64>() / series.len() as f64
}

fn mean_latency(samples: &[LatencySample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.latency_ns as f64).sum::<f64>() / samples.len() as f64
}
