//! Suite reports: Markdown for people, JSON for tooling.

use std::fmt::Write;

use heapmark_core::structured_log::now_utc;
use heapmark_core::Strategy;
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, LatencyStats, SuiteAggregate};
use crate::suite::SuiteOutcome;

pub const REPORT_VERSION: u32 = 1;

/// Machine-readable suite report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub report_version: u32,
    pub generated_utc: String,
    pub seed: u64,
    pub random_cases: usize,
    pub repeats: usize,
    pub strategies: Vec<Strategy>,
    pub total_runs: usize,
    pub wall_time_secs: f64,
    pub aggregate: SuiteAggregate,
}

impl SuiteReport {
    #[must_use]
    pub fn from_outcome(outcome: &SuiteOutcome) -> Self {
        Self {
            report_version: REPORT_VERSION,
            generated_utc: now_utc(),
            seed: outcome.config.seed,
            random_cases: outcome.config.random_cases,
            repeats: outcome.config.repeats,
            strategies: outcome.config.strategies.clone(),
            total_runs: outcome.cases.len(),
            wall_time_secs: outcome.wall_time_secs,
            aggregate: aggregate(outcome),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn render_latency_cells(out: &mut String, stats: &LatencyStats) {
    write!(
        out,
        " {:.0} | {:.0} | {:.0} | {:.0} |",
        stats.mean_ns, stats.p50_ns, stats.p95_ns, stats.p99_ns
    )
    .ok();
}

/// Render the Markdown report.
#[must_use]
pub fn render_markdown(report: &SuiteReport) -> String {
    let mut out = String::new();
    let agg = &report.aggregate;

    writeln!(out, "# Allocator Benchmark Report").ok();
    writeln!(out).ok();
    writeln!(
        out,
        "- Suite: seed=0x{seed:016X} random_cases={cases} repeats={repeats} runs={runs}",
        seed = report.seed,
        cases = report.random_cases,
        repeats = report.repeats,
        runs = report.total_runs
    )
    .ok();
    writeln!(out, "- Generated: {}", report.generated_utc).ok();
    writeln!(out, "- Wall time: {:.3}s", report.wall_time_secs).ok();
    if let Some(best) = agg.best_utilization() {
        writeln!(
            out,
            "- Best mean utilization: {} ({:.2}%)",
            best.strategy.label(),
            best.average_utilization.mean
        )
        .ok();
    }
    writeln!(out).ok();

    writeln!(out, "## Summary by Strategy").ok();
    writeln!(out).ok();
    writeln!(
        out,
        "| Strategy | cases | util mean % | util std | time mean s | time std | overhead mean % | overhead std | failed allocs | skipped frees |"
    )
    .ok();
    writeln!(
        out,
        "|----------|------:|------------:|---------:|------------:|---------:|----------------:|-------------:|--------------:|--------------:|"
    )
    .ok();
    for s in &agg.strategies {
        writeln!(
            out,
            "| {} | {} | {:.2} | {:.2} | {:.6} | {:.6} | {:.2} | {:.2} | {} | {} |",
            s.strategy.label(),
            s.cases,
            s.average_utilization.mean,
            s.average_utilization.std_dev,
            s.total_wall_time.mean,
            s.total_wall_time.std_dev,
            s.peak_overhead_percent.mean,
            s.peak_overhead_percent.std_dev,
            s.failed_allocations,
            s.skipped_releases
        )
        .ok();
    }
    writeln!(out).ok();

    writeln!(out, "## Latency (ns/op)").ok();
    writeln!(out).ok();
    writeln!(
        out,
        "| Strategy | op | samples | mean | p50 | p95 | p99 |"
    )
    .ok();
    writeln!(out, "|----------|----|--------:|-----:|----:|----:|----:|").ok();
    for s in &agg.strategies {
        for (op, stats) in [("allocate", &s.allocate_latency), ("release", &s.release_latency)] {
            write!(out, "| {} | {op} | {} |", s.strategy.label(), stats.samples).ok();
            render_latency_cells(&mut out, stats);
            writeln!(out).ok();
        }
    }
    writeln!(out).ok();

    writeln!(out, "## Per Scenario").ok();
    writeln!(out).ok();
    writeln!(
        out,
        "| Scenario | Strategy | util % | time s | overhead % | failed allocs | skipped frees | alloc p50 | alloc p99 |"
    )
    .ok();
    writeln!(
        out,
        "|----------|----------|-------:|-------:|-----------:|--------------:|--------------:|----------:|----------:|"
    )
    .ok();
    for row in &agg.rows {
        writeln!(
            out,
            "| {} | {} | {:.2} | {:.6} | {:.2} | {} | {} | {:.0} | {:.0} |",
            row.scenario,
            row.strategy.label(),
            row.average_utilization,
            row.total_wall_time,
            row.peak_overhead_percent,
            row.failed_allocations,
            row.skipped_releases,
            row.allocate_latency.p50_ns,
            row.allocate_latency.p99_ns
        )
        .ok();
    }

    out
}
