//! Workload engine for allocator benchmarking.
//!
//! This crate provides:
//! - Size distributions and seeded allocate/release plan generation
//! - A live-allocation tracker that mirrors what the allocator actually granted
//! - The workload executor that replays a plan against an [`AllocatorUnderTest`]
//! - Run results: utilization series, per-operation latencies, peak overhead
//! - Structured JSONL logging for runs and suites

#![forbid(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod distribution;
pub mod error;
pub mod executor;
pub mod plan;
pub mod result;
pub mod strategy;
pub mod structured_log;
pub mod tracker;

pub use allocator::{AllocatorFault, AllocatorUnderTest};
pub use config::{CapacityPolicy, RunConfig};
pub use distribution::SizeDistribution;
pub use error::{ConfigError, RunError, RunPhase};
pub use executor::{StepObservation, StepOutcome, WorkloadExecutor};
pub use plan::{OpToken, WorkloadPlan};
pub use result::{LatencySample, RunResult, UtilizationSample};
pub use strategy::Strategy;
pub use tracker::{EvictionPolicy, LiveTracker};
