//! Per-scenario and per-strategy aggregation of suite runs.
//!
//! Repeats of the same (scenario, strategy) pair are averaged first. The
//! per-strategy summary then treats each scenario as one observation for the
//! scalar metrics, while latency samples are pooled across every run.

use std::collections::BTreeMap;

use heapmark_core::{LatencySample, Strategy};
use serde::{Deserialize, Serialize};

use crate::suite::SuiteOutcome;

/// Latency distribution summary in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub mean_ns: f64,
    pub p50_ns: f64,
    pub p95_ns: f64,
    pub p99_ns: f64,
}

impl LatencyStats {
    #[must_use]
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a LatencySample>) -> Self {
        let mut ns: Vec<f64> = samples.into_iter().map(|s| s.latency_ns as f64).collect();
        ns.sort_by(f64::total_cmp);
        let mean_ns = if ns.is_empty() {
            0.0
        } else {
            ns.iter().sum::<f64>() / ns.len() as f64
        };
        Self {
            samples: ns.len(),
            mean_ns,
            p50_ns: percentile_f64_sorted(&ns, 0.50),
            p95_ns: percentile_f64_sorted(&ns, 0.95),
            p99_ns: percentile_f64_sorted(&ns, 0.99),
        }
    }
}

/// Mean and population standard deviation of a scalar metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricStats {
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std_dev: variance.sqrt(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// One (scenario, strategy) pair with repeats averaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRow {
    pub scenario: String,
    pub strategy: Strategy,
    pub repeats: usize,
    pub average_utilization: f64,
    pub total_wall_time: f64,
    pub peak_overhead_percent: f64,
    pub failed_allocations: usize,
    pub skipped_releases: usize,
    pub allocate_latency: LatencyStats,
    pub release_latency: LatencyStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy: Strategy,
    /// Number of scenarios folded in.
    pub cases: usize,
    pub runs: usize,
    pub average_utilization: MetricStats,
    pub total_wall_time: MetricStats,
    pub peak_overhead_percent: MetricStats,
    pub allocate_latency: LatencyStats,
    pub release_latency: LatencyStats,
    pub failed_allocations: usize,
    pub skipped_releases: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteAggregate {
    /// Scenario order as run, strategies in configured order within each.
    pub rows: Vec<ScenarioRow>,
    pub strategies: Vec<StrategySummary>,
}

impl SuiteAggregate {
    /// Strategy with the highest mean utilization.
    #[must_use]
    pub fn best_utilization(&self) -> Option<&StrategySummary> {
        self.strategies
            .iter()
            .max_by(|a, b| a.average_utilization.mean.total_cmp(&b.average_utilization.mean))
    }
}

/// Aggregate a finished suite.
#[must_use]
pub fn aggregate(outcome: &SuiteOutcome) -> SuiteAggregate {
    let strategies = &outcome.config.strategies;

    // (scenario position, strategy position) -> runs
    let scenario_pos: BTreeMap<&str, usize> = outcome
        .scenarios
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let mut grouped: BTreeMap<(usize, usize), Vec<&crate::suite::CaseResult>> = BTreeMap::new();
    for case in &outcome.cases {
        let Some(&si) = scenario_pos.get(case.scenario.as_str()) else {
            continue;
        };
        let Some(ti) = strategies.iter().position(|&s| s == case.strategy) else {
            continue;
        };
        grouped.entry((si, ti)).or_default().push(case);
    }

    let rows: Vec<ScenarioRow> = grouped
        .values()
        .map(|runs| {
            let n = runs.len() as f64;
            let mean_of = |f: fn(&crate::suite::CaseResult) -> f64| runs.iter().map(|c| f(c)).sum::<f64>() / n;
            ScenarioRow {
                scenario: runs[0].scenario.clone(),
                strategy: runs[0].strategy,
                repeats: runs.len(),
                average_utilization: mean_of(|c| c.result.average_utilization),
                total_wall_time: mean_of(|c| c.result.total_wall_time),
                peak_overhead_percent: mean_of(|c| c.result.peak_overhead_percent),
                failed_allocations: runs.iter().map(|c| c.result.failed_allocations).sum(),
                skipped_releases: runs.iter().map(|c| c.result.skipped_releases).sum(),
                allocate_latency: LatencyStats::from_samples(
                    runs.iter().flat_map(|c| &c.result.allocate_latencies),
                ),
                release_latency: LatencyStats::from_samples(
                    runs.iter().flat_map(|c| &c.result.release_latencies),
                ),
            }
        })
        .collect();

    let summaries = strategies
        .iter()
        .map(|&strategy| {
            let mine: Vec<&ScenarioRow> = rows.iter().filter(|r| r.strategy == strategy).collect();
            let runs: Vec<&crate::suite::CaseResult> =
                outcome.cases.iter().filter(|c| c.strategy == strategy).collect();
            let metric = |f: fn(&ScenarioRow) -> f64| {
                MetricStats::from_values(&mine.iter().map(|r| f(r)).collect::<Vec<_>>())
            };
            StrategySummary {
                strategy,
                cases: mine.len(),
                runs: runs.len(),
                average_utilization: metric(|r| r.average_utilization),
                total_wall_time: metric(|r| r.total_wall_time),
                peak_overhead_percent: metric(|r| r.peak_overhead_percent),
                allocate_latency: LatencyStats::from_samples(
                    runs.iter().flat_map(|c| &c.result.allocate_latencies),
                ),
                release_latency: LatencyStats::from_samples(
                    runs.iter().flat_map(|c| &c.result.release_latencies),
                ),
                failed_allocations: mine.iter().map(|r| r.failed_allocations).sum(),
                skipped_releases: mine.iter().map(|r| r.skipped_releases).sum(),
            }
        })
        .collect();

    SuiteAggregate {
        rows,
        strategies: summaries,
    }
}

fn percentile_f64_sorted(sorted: &[f64], p: f64) -> f64 {
    debug_assert!((0.0..=1.0).contains(&p));
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
