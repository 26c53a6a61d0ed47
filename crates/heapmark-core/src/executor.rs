//! Workload executor.
//!
//! Replays a [`WorkloadPlan`] against an allocator under test, one token at a
//! time, keeping the [`LiveTracker`] in step with what the allocator actually
//! granted. Per token it:
//! 1. folds the current metadata overhead ratio into the running peak,
//! 2. applies the token (timed allocator call, tracker + accounting update),
//! 3. appends `(elapsed, live_bytes / capacity)` to the utilization series.
//!
//! Allocation failures and releases with nothing live are recorded and the
//! run continues. A rejected release aborts the run.

use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::allocator::AllocatorUnderTest;
use crate::config::RunConfig;
use crate::error::{RunError, RunPhase};
use crate::plan::{OpToken, WorkloadPlan};
use crate::result::{LatencySample, RunParts, RunResult, UtilizationSample};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
use crate::tracker::LiveTracker;

/// What a single token did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Allocated { size: usize },
    AllocationFailed { size: usize },
    Released { size: usize },
    /// Release token with no live allocation to free.
    ReleaseSkipped,
}

/// State visible after each token (see [`WorkloadExecutor::run_observed`]).
#[derive(Debug, Clone, Copy)]
pub struct StepObservation<H> {
    pub index: usize,
    pub token: OpToken,
    pub outcome: StepOutcome,
    /// Handle granted or released by this token.
    pub handle: Option<H>,
    pub live_count: usize,
    pub live_bytes: u64,
    pub capacity: u64,
    pub peak_overhead_percent: f64,
}

/// Drives one run. Consumed by `run*`.
pub struct WorkloadExecutor<'a, A: AllocatorUnderTest> {
    allocator: A,
    config: &'a RunConfig,
    log: Option<&'a mut LogEmitter>,
    scenario: Option<&'a str>,
}

struct RunState<H> {
    rng: StdRng,
    tracker: LiveTracker<H>,
    capacity: u64,
    live_bytes: u64,
    peak_overhead_percent: f64,
    peak_live_count: usize,
    skipped_releases: usize,
    utilization_series: Vec<UtilizationSample>,
    allocate_latencies: Vec<LatencySample>,
    release_latencies: Vec<LatencySample>,
}

impl<'a, A: AllocatorUnderTest> WorkloadExecutor<'a, A> {
    #[must_use]
    pub fn new(allocator: A, config: &'a RunConfig) -> Self {
        Self {
            allocator,
            config,
            log: None,
            scenario: None,
        }
    }

    /// Emit run events to `log`.
    #[must_use]
    pub fn with_log(mut self, log: &'a mut LogEmitter) -> Self {
        self.log = Some(log);
        self
    }

    /// Tag log events with a scenario name.
    #[must_use]
    pub fn with_scenario(mut self, scenario: &'a str) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Generate the plan from the configured seed and execute it.
    pub fn run(self) -> Result<RunResult, RunError> {
        self.run_observed(|_| {})
    }

    /// Like [`WorkloadExecutor::run`], calling `observer` after every token.
    pub fn run_observed<F>(self, observer: F) -> Result<RunResult, RunError>
    where
        F: FnMut(&StepObservation<A::Handle>),
    {
        self.config.validate()?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let plan = WorkloadPlan::generate(self.config.malloc_count, self.config.free_count, &mut rng);
        self.execute(&plan, rng, observer)
    }

    /// Execute an explicit plan; sizes and victims still come from the configured seed.
    pub fn run_plan(self, plan: &WorkloadPlan) -> Result<RunResult, RunError> {
        self.run_plan_observed(plan, |_| {})
    }

    pub fn run_plan_observed<F>(self, plan: &WorkloadPlan, observer: F) -> Result<RunResult, RunError>
    where
        F: FnMut(&StepObservation<A::Handle>),
    {
        self.config.validate()?;
        let rng = StdRng::seed_from_u64(self.config.seed);
        self.execute(plan, rng, observer)
    }

    fn execute<F>(mut self, plan: &WorkloadPlan, rng: StdRng, mut observer: F) -> Result<RunResult, RunError>
    where
        F: FnMut(&StepObservation<A::Handle>),
    {
        let config = self.config;
        let overhead = config.metadata_overhead as u64;

        self.allocator.initialize(config.strategy);
        self.log_event(LogLevel::Info, "run_start", |e| {
            e.with_details(serde_json::json!({
                "allocate_tokens": plan.allocate_count(),
                "release_tokens": plan.release_count(),
                "metadata_overhead": config.metadata_overhead,
                "initial_capacity": config.capacity.initial_capacity,
                "chunk_size": config.capacity.chunk_size,
                "eviction": config.eviction.as_str(),
            }))
        });

        let mut state = RunState {
            rng,
            tracker: LiveTracker::new(),
            capacity: config.capacity.initial_capacity,
            live_bytes: 0,
            peak_overhead_percent: 0.0,
            peak_live_count: 0,
            skipped_releases: 0,
            utilization_series: Vec::with_capacity(plan.len()),
            allocate_latencies: Vec::with_capacity(plan.allocate_count()),
            release_latencies: Vec::with_capacity(plan.release_count()),
        };

        let start = Instant::now();
        for (index, &token) in plan.tokens().iter().enumerate() {
            // Sampled before the token takes effect.
            let current_overhead =
                (state.tracker.len() as u64).saturating_mul(overhead) as f64 / state.capacity as f64
                    * 100.0;
            state.peak_overhead_percent = state.peak_overhead_percent.max(current_overhead);

            let (outcome, handle) = match token {
                OpToken::Allocate => self.step_allocate(&mut state, index)?,
                OpToken::Release => self.step_release(&mut state, index)?,
            };

            state.peak_live_count = state.peak_live_count.max(state.tracker.len());
            state.utilization_series.push(UtilizationSample {
                elapsed_secs: start.elapsed().as_secs_f64(),
                ratio: state.live_bytes as f64 / state.capacity as f64,
            });

            observer(&StepObservation {
                index,
                token,
                outcome,
                handle,
                live_count: state.tracker.len(),
                live_bytes: state.live_bytes,
                capacity: state.capacity,
                peak_overhead_percent: state.peak_overhead_percent,
            });
        }
        let total_wall_time = start.elapsed().as_secs_f64();

        let cleanup_releases = self.cleanup(&mut state)?;

        let result = RunResult::assemble(RunParts {
            strategy: config.strategy,
            seed: config.seed,
            utilization_series: state.utilization_series,
            total_wall_time,
            allocate_latencies: state.allocate_latencies,
            release_latencies: state.release_latencies,
            peak_overhead_percent: state.peak_overhead_percent,
            skipped_releases: state.skipped_releases,
            cleanup_releases,
            peak_live_count: state.peak_live_count,
            final_capacity: state.capacity,
        });

        self.log_event(LogLevel::Info, "run_complete", |e| {
            e.with_outcome(Outcome::Success)
                .with_duration_ms((total_wall_time * 1000.0) as u64)
                .with_details(result.summary_json())
        });
        Ok(result)
    }

    fn step_allocate(
        &mut self,
        state: &mut RunState<A::Handle>,
        index: usize,
    ) -> Result<(StepOutcome, Option<A::Handle>), RunError> {
        let size = self.config.sizes.sample(&mut state.rng);

        let t0 = Instant::now();
        let granted = self.allocator.allocate(size);
        let latency_ns = t0.elapsed().as_nanos() as u64;

        state.allocate_latencies.push(LatencySample {
            size,
            latency_ns,
            succeeded: granted.is_some(),
        });

        let Some(handle) = granted else {
            self.log_event(LogLevel::Debug, "allocate_failed", |e| {
                e.with_step(index)
                    .with_size(size)
                    .with_latency_ns(latency_ns)
                    .with_live_count(state.tracker.len())
                    .with_outcome(Outcome::Failed)
            });
            return Ok((StepOutcome::AllocationFailed { size }, None));
        };

        if !state.tracker.record(handle, size) {
            let handle = format!("{handle:?}");
            self.log_event(LogLevel::Error, "run_aborted", |e| {
                e.with_step(index)
                    .with_size(size)
                    .with_outcome(Outcome::Aborted)
                    .with_details(serde_json::json!({
                        "reason": "duplicate_live_handle",
                        "handle": handle,
                    }))
            });
            return Err(RunError::DuplicateHandle { handle });
        }

        let charged = size as u64 + self.config.metadata_overhead as u64;
        state.live_bytes = state.live_bytes.saturating_add(charged);
        if state.live_bytes > state.capacity {
            let grow_by = self.config.capacity.chunk_size.max(charged);
            state.capacity = state.capacity.saturating_add(grow_by);
            let capacity = state.capacity;
            self.log_event(LogLevel::Trace, "capacity_grown", |e| {
                e.with_step(index).with_size(size).with_details(serde_json::json!({
                    "grow_by": grow_by,
                    "capacity": capacity,
                }))
            });
        }

        Ok((StepOutcome::Allocated { size }, Some(handle)))
    }

    fn step_release(
        &mut self,
        state: &mut RunState<A::Handle>,
        index: usize,
    ) -> Result<(StepOutcome, Option<A::Handle>), RunError> {
        let Some((handle, size)) = state
            .tracker
            .remove_victim(self.config.eviction, &mut state.rng)
        else {
            state.skipped_releases += 1;
            self.log_event(LogLevel::Debug, "release_skipped", |e| {
                e.with_step(index).with_live_count(0).with_outcome(Outcome::Skipped)
            });
            return Ok((StepOutcome::ReleaseSkipped, None));
        };

        let t0 = Instant::now();
        let released = self.allocator.release(handle);
        let latency_ns = t0.elapsed().as_nanos() as u64;

        if let Err(fault) = released {
            return Err(self.abort_on_fault(handle, size, RunPhase::Measured, fault, Some(index)));
        }

        state.release_latencies.push(LatencySample {
            size,
            latency_ns,
            succeeded: true,
        });
        let charged = size as u64 + self.config.metadata_overhead as u64;
        state.live_bytes = state.live_bytes.saturating_sub(charged);

        Ok((StepOutcome::Released { size }, Some(handle)))
    }

    /// Release everything still live. Not part of the measured latencies.
    fn cleanup(&mut self, state: &mut RunState<A::Handle>) -> Result<usize, RunError> {
        let live_count = state.tracker.len();
        let requested_bytes = state.tracker.requested_bytes();
        self.log_event(LogLevel::Debug, "cleanup_start", |e| {
            e.with_live_count(live_count).with_details(serde_json::json!({
                "requested_bytes": requested_bytes,
                "charged_bytes": state.live_bytes,
            }))
        });
        let remaining = state.tracker.drain();
        let count = remaining.len();
        for (handle, size) in remaining {
            if let Err(fault) = self.allocator.release(handle) {
                return Err(self.abort_on_fault(handle, size, RunPhase::Cleanup, fault, None));
            }
        }
        Ok(count)
    }

    fn abort_on_fault(
        &mut self,
        handle: A::Handle,
        size: usize,
        phase: RunPhase,
        fault: crate::allocator::AllocatorFault,
        step: Option<usize>,
    ) -> RunError {
        let handle = format!("{handle:?}");
        self.log_event(LogLevel::Error, "run_aborted", |e| {
            let e = e
                .with_size(size)
                .with_outcome(Outcome::Aborted)
                .with_details(serde_json::json!({
                    "reason": "release_rejected",
                    "phase": phase.to_string(),
                    "handle": handle,
                    "fault": fault.reason,
                }));
            match step {
                Some(step) => e.with_step(step),
                None => e,
            }
        });
        RunError::AllocatorInvariant {
            handle,
            size,
            phase,
            fault,
        }
    }

    fn log_event(&mut self, level: LogLevel, event: &str, build: impl FnOnce(LogEntry) -> LogEntry) {
        let Some(log) = self.log.as_deref_mut() else {
            return;
        };
        if !log.enabled(level) {
            return;
        }
        let mut entry = log
            .entry(level, event)
            .with_strategy(self.config.strategy)
            .with_seed(self.config.seed);
        if let Some(scenario) = self.scenario {
            entry = entry.with_scenario(scenario);
        }
        // Log sink failures never abort a measurement.
        log.emit_entry(build(entry)).ok();
    }
}
