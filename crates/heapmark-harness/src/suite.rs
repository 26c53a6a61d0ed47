//! Suite runner.
//!
//! Runs every (scenario, strategy, repeat) combination as an independent run
//! against a fresh [`FreeListHeap`]. Each run gets its own seed derived from
//! the suite seed and its coordinates, so results do not depend on `jobs` or
//! on scheduling order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use heapmark_alloc::{FreeListHeap, HeapConfig};
use heapmark_core::config::DEFAULT_SEED;
use heapmark_core::structured_log::{LogEmitter, LogLevel, Outcome};
use heapmark_core::{EvictionPolicy, RunConfig, RunResult, Strategy, WorkloadExecutor};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::scenarios::{self, Scenario, ScenarioKind, StressSplit};

pub const DEFAULT_RANDOM_CASES: usize = 1000;

/// Suite parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub random_cases: usize,
    pub repeats: usize,
    pub strategies: Vec<Strategy>,
    pub seed: u64,
    /// Worker threads; 1 runs everything on the calling thread.
    pub jobs: usize,
    pub eviction: EvictionPolicy,
    pub stress_split: StressSplit,
    /// Heap shape for every run. The seed field is replaced per run.
    pub heap: HeapConfig,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            random_cases: DEFAULT_RANDOM_CASES,
            repeats: 1,
            strategies: vec![Strategy::FirstFit, Strategy::BestFit, Strategy::WorstFit],
            seed: DEFAULT_SEED,
            jobs: 1,
            eviction: EvictionPolicy::default(),
            stress_split: StressSplit::default(),
            heap: HeapConfig::default(),
        }
    }
}

impl SuiteConfig {
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.repeats == 0 {
            return Err(HarnessError::InvalidSuite("repeats must be at least 1".into()));
        }
        if self.strategies.is_empty() {
            return Err(HarnessError::InvalidSuite("no strategies selected".into()));
        }
        if self.jobs == 0 {
            return Err(HarnessError::InvalidSuite("jobs must be at least 1".into()));
        }
        Ok(())
    }
}

/// One finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub scenario: String,
    pub kind: ScenarioKind,
    pub strategy: Strategy,
    pub repeat: usize,
    pub seed: u64,
    pub result: RunResult,
}

/// Every run of a suite, in (scenario, strategy, repeat) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteOutcome {
    pub config: SuiteConfig,
    pub scenarios: Vec<String>,
    pub cases: Vec<CaseResult>,
    pub wall_time_secs: f64,
}

#[derive(Debug, Clone, Copy)]
struct Job {
    case_index: usize,
    strategy_index: usize,
    repeat: usize,
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Seed for the run at the given suite coordinates.
#[must_use]
pub fn derive_seed(suite_seed: u64, case_index: usize, strategy_index: usize, repeat: usize) -> u64 {
    [case_index, strategy_index, repeat]
        .into_iter()
        .fold(splitmix64(suite_seed), |acc, part| splitmix64(acc ^ part as u64))
}

/// Execute one configured run against a fresh heap.
pub fn run_single(
    config: &RunConfig,
    heap: HeapConfig,
    scenario: Option<&str>,
    log: Option<&mut LogEmitter>,
) -> Result<RunResult, heapmark_core::RunError> {
    let heap = FreeListHeap::new(HeapConfig {
        seed: config.seed,
        ..heap
    });
    let mut executor = WorkloadExecutor::new(heap, config);
    if let Some(log) = log {
        executor = executor.with_log(log);
    }
    if let Some(name) = scenario {
        executor = executor.with_scenario(name);
    }
    executor.run()
}

fn run_job(job: Job, catalogue: &[Scenario], config: &SuiteConfig) -> Result<CaseResult, HarnessError> {
    let scenario = &catalogue[job.case_index];
    let strategy = config.strategies[job.strategy_index];
    let seed = derive_seed(config.seed, job.case_index, job.strategy_index, job.repeat);
    let run_config = scenario.run_config(strategy, config.eviction, seed);
    let result = run_single(&run_config, config.heap, Some(&scenario.name), None).map_err(|source| {
        HarnessError::Run {
            scenario: scenario.name.clone(),
            strategy,
            repeat: job.repeat,
            source,
        }
    })?;
    Ok(CaseResult {
        scenario: scenario.name.clone(),
        kind: scenario.kind,
        strategy,
        repeat: job.repeat,
        seed,
        result,
    })
}

fn run_parallel(
    jobs: &[Job],
    catalogue: &[Scenario],
    config: &SuiteConfig,
) -> Vec<Result<CaseResult, HarnessError>> {
    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<Result<CaseResult, HarnessError>>>> =
        Mutex::new((0..jobs.len()).map(|_| None).collect());

    std::thread::scope(|s| {
        for _ in 0..config.jobs.min(jobs.len()) {
            s.spawn(|| {
                loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(&job) = jobs.get(i) else {
                        break;
                    };
                    let outcome = run_job(job, catalogue, config);
                    slots.lock()[i] = Some(outcome);
                }
            });
        }
    });

    slots.into_inner().into_iter().flatten().collect()
}

/// Run the whole catalogue. Stops at the first failed run (in suite order).
pub fn run_suite(config: &SuiteConfig, mut log: Option<&mut LogEmitter>) -> Result<SuiteOutcome, HarnessError> {
    config.validate()?;
    let catalogue = scenarios::catalogue(config.random_cases, config.seed, config.stress_split)?;

    let jobs: Vec<Job> = (0..catalogue.len())
        .flat_map(|case_index| {
            (0..config.strategies.len()).flat_map(move |strategy_index| {
                (0..config.repeats).map(move |repeat| Job {
                    case_index,
                    strategy_index,
                    repeat,
                })
            })
        })
        .collect();

    if let Some(log) = log.as_deref_mut() {
        let entry = log
            .entry(LogLevel::Info, "suite_start")
            .with_seed(config.seed)
            .with_details(serde_json::json!({
                "scenarios": catalogue.len(),
                "strategies": config.strategies,
                "repeats": config.repeats,
                "runs": jobs.len(),
                "jobs": config.jobs,
            }));
        log.emit_entry(entry).ok();
    }

    let start = Instant::now();
    let mut cases = Vec::with_capacity(jobs.len());
    if config.jobs <= 1 {
        for &job in &jobs {
            let outcome = run_job(job, &catalogue, config);
            record_case(&mut log, outcome, &mut cases)?;
        }
    } else {
        for outcome in run_parallel(&jobs, &catalogue, config) {
            record_case(&mut log, outcome, &mut cases)?;
        }
    }
    let wall_time_secs = start.elapsed().as_secs_f64();

    if let Some(log) = log.as_deref_mut() {
        let entry = log
            .entry(LogLevel::Info, "suite_complete")
            .with_seed(config.seed)
            .with_outcome(Outcome::Success)
            .with_duration_ms((wall_time_secs * 1000.0) as u64)
            .with_details(serde_json::json!({ "runs": cases.len() }));
        log.emit_entry(entry).ok();
        log.flush().ok();
    }

    Ok(SuiteOutcome {
        config: config.clone(),
        scenarios: catalogue.into_iter().map(|s| s.name).collect(),
        cases,
        wall_time_secs,
    })
}

fn record_case(
    log: &mut Option<&mut LogEmitter>,
    outcome: Result<CaseResult, HarnessError>,
    cases: &mut Vec<CaseResult>,
) -> Result<(), HarnessError> {
    match outcome {
        Ok(case) => {
            if let Some(log) = log.as_deref_mut() {
                let r = &case.result;
                let entry = log
                    .entry(LogLevel::Info, "case_complete")
                    .with_scenario(case.scenario.clone())
                    .with_strategy(case.strategy)
                    .with_seed(case.seed)
                    .with_outcome(Outcome::Success)
                    .with_duration_ms((r.total_wall_time * 1000.0) as u64)
                    .with_details(serde_json::json!({
                        "repeat": case.repeat,
                        "average_utilization": r.average_utilization,
                        "peak_overhead_percent": r.peak_overhead_percent,
                        "failed_allocations": r.failed_allocations,
                        "skipped_releases": r.skipped_releases,
                    }));
                log.emit_entry(entry).ok();
            }
            cases.push(case);
            Ok(())
        }
        Err(err) => {
            if let Some(log) = log.as_deref_mut() {
                let mut entry = log
                    .entry(LogLevel::Error, "case_complete")
                    .with_outcome(Outcome::Failed)
                    .with_details(serde_json::json!({ "error": err.to_string() }));
                if let HarnessError::Run {
                    scenario, strategy, ..
                } = &err
                {
                    entry = entry.with_scenario(scenario.clone()).with_strategy(*strategy);
                }
                log.emit_entry(entry).ok();
                log.flush().ok();
            }
            Err(err)
        }
    }
}
