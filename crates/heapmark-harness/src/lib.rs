//! Benchmark harness for heapmark.
//!
//! This crate provides:
//! - The scenario catalogue: fixed stress scenarios plus seeded random cases
//! - A suite runner that spreads runs across worker threads deterministically
//! - Per-scenario and per-strategy aggregation with latency percentiles
//! - Markdown and JSON reports and a SHA-256 artifact index

#![forbid(unsafe_code)]

pub mod aggregate;
pub mod artifacts;
pub mod error;
pub mod report;
pub mod scenarios;
pub mod suite;

pub use aggregate::{aggregate, LatencyStats, MetricStats, ScenarioRow, StrategySummary, SuiteAggregate};
pub use artifacts::{ArtifactEntry, ArtifactIndex};
pub use error::HarnessError;
pub use report::{render_markdown, SuiteReport};
pub use scenarios::{Scenario, ScenarioKind, StressSplit};
pub use suite::{run_single, run_suite, CaseResult, SuiteConfig, SuiteOutcome};
