//! Integration test: workload executor invariants and reference scenarios.
//!
//! Validates that:
//! 1. The tracker mirrors successful allocations minus effective releases at every step.
//! 2. Every successful allocation is released exactly once (measured or cleanup).
//! 3. Average utilization stays within [0, 100].
//! 4. Allocation failures are measured, never fatal; rejected releases are fatal.
//! 5. Scenarios A-D produce the documented accounting.
//!
//! Run: cargo test -p heapmark-core --test workload_properties_test

use std::collections::HashSet;

use heapmark_core::{
    AllocatorFault, AllocatorUnderTest, CapacityPolicy, ConfigError, EvictionPolicy, OpToken, RunConfig,
    RunError, RunPhase, SizeDistribution, StepOutcome, Strategy, WorkloadExecutor, WorkloadPlan,
};

/// Counts calls and enforces that only live handles are released.
#[derive(Default)]
struct CountingAllocator {
    next: usize,
    live: HashSet<usize>,
    allocate_calls: usize,
    successful_allocations: usize,
    release_calls: usize,
    initialize_calls: usize,
    /// Fail every n-th allocate call (0 = never).
    fail_every: usize,
}

impl AllocatorUnderTest for CountingAllocator {
    type Handle = usize;

    fn initialize(&mut self, _strategy: Strategy) {
        self.initialize_calls += 1;
    }

    fn allocate(&mut self, size: usize) -> Option<usize> {
        assert!(size > 0);
        self.allocate_calls += 1;
        if self.fail_every != 0 && self.allocate_calls % self.fail_every == 0 {
            return None;
        }
        self.next += 1;
        self.live.insert(self.next);
        self.successful_allocations += 1;
        Some(self.next)
    }

    fn release(&mut self, handle: usize) -> Result<(), AllocatorFault> {
        self.release_calls += 1;
        if self.live.remove(&handle) {
            Ok(())
        } else {
            Err(AllocatorFault::new(format!("handle {handle} is not live")))
        }
    }
}

struct AlwaysFails {
    release_calls: usize,
}

impl AllocatorUnderTest for AlwaysFails {
    type Handle = u32;

    fn initialize(&mut self, _strategy: Strategy) {}

    fn allocate(&mut self, _size: usize) -> Option<u32> {
        None
    }

    fn release(&mut self, _handle: u32) -> Result<(), AllocatorFault> {
        self.release_calls += 1;
        Ok(())
    }
}

/// Grants handles but refuses every release.
#[derive(Default)]
struct RejectsReleases {
    next: u32,
}

impl AllocatorUnderTest for RejectsReleases {
    type Handle = u32;

    fn initialize(&mut self, _strategy: Strategy) {}

    fn allocate(&mut self, _size: usize) -> Option<u32> {
        self.next += 1;
        Some(self.next)
    }

    fn release(&mut self, handle: u32) -> Result<(), AllocatorFault> {
        Err(AllocatorFault::new(format!("corrupt header at {handle}")))
    }
}

/// Hands out the same handle twice.
struct ReusesHandles;

impl AllocatorUnderTest for ReusesHandles {
    type Handle = u8;

    fn initialize(&mut self, _strategy: Strategy) {}

    fn allocate(&mut self, _size: usize) -> Option<u8> {
        Some(7)
    }

    fn release(&mut self, _handle: u8) -> Result<(), AllocatorFault> {
        Ok(())
    }
}

fn sizes(values: &[usize]) -> SizeDistribution {
    SizeDistribution::new(values.to_vec()).expect("valid distribution")
}

#[test]
fn live_count_tracks_successes_minus_effective_releases() {
    for seed in [1u64, 2, 3, 0xDEAD_BEEF] {
        let cfg = RunConfig::with_sizes(sizes(&[16, 256, 4096]))
            .counts(300, 280)
            .seed(seed);
        let mut alloc = CountingAllocator {
            fail_every: 7,
            ..CountingAllocator::default()
        };
        let mut successes = 0usize;
        let mut releases = 0usize;
        let result = WorkloadExecutor::new(&mut alloc, &cfg)
            .run_observed(|obs| {
                match obs.outcome {
                    StepOutcome::Allocated { .. } => successes += 1,
                    StepOutcome::Released { .. } => releases += 1,
                    StepOutcome::AllocationFailed { .. } | StepOutcome::ReleaseSkipped => {}
                }
                assert_eq!(obs.live_count, successes - releases, "step {}", obs.index);
            })
            .expect("run succeeds");
        assert_eq!(result.successful_allocations(), successes);
        assert_eq!(result.effective_releases(), releases);
        assert!(result.failed_allocations > 0);
    }
}

#[test]
fn every_success_released_exactly_once() {
    let cfg = RunConfig::with_sizes(sizes(&[8, 64, 512]))
        .counts(550, 450)
        .seed(99);
    let mut alloc = CountingAllocator::default();
    let result = WorkloadExecutor::new(&mut alloc, &cfg).run().unwrap();

    assert_eq!(alloc.initialize_calls, 1);
    assert_eq!(alloc.release_calls, alloc.successful_allocations);
    assert!(alloc.live.is_empty());
    assert_eq!(
        result.effective_releases() + result.cleanup_releases,
        result.successful_allocations()
    );
    assert_eq!(
        result.effective_releases() + result.skipped_releases,
        cfg.free_count
    );
}

#[test]
fn average_utilization_is_a_bounded_percentage() {
    for eviction in [
        EvictionPolicy::Random,
        EvictionPolicy::Lifo,
        EvictionPolicy::Fifo,
        EvictionPolicy::LargestFirst,
        EvictionPolicy::SmallestFirst,
    ] {
        let cfg = RunConfig::with_sizes(sizes(&[1, 100, 20_000, 1 << 20]))
            .counts(400, 300)
            .eviction(eviction)
            .seed(5);
        let mut last_capacity = cfg.capacity.initial_capacity;
        let result = WorkloadExecutor::new(CountingAllocator::default(), &cfg)
            .run_observed(|obs| {
                assert!(obs.capacity >= last_capacity, "capacity shrank");
                assert!(obs.live_bytes <= obs.capacity);
                last_capacity = obs.capacity;
            })
            .unwrap();
        assert!((0.0..=100.0).contains(&result.average_utilization));
        for sample in &result.utilization_series {
            assert!((0.0..=1.0).contains(&sample.ratio));
        }
    }
}

#[test]
fn fixed_seed_reproduces_operation_sequence() {
    let cfg = RunConfig::with_sizes(sizes(&[16, 32, 64, 128]))
        .counts(200, 150)
        .seed(0x1234);
    let run = || {
        let mut trace = Vec::new();
        WorkloadExecutor::new(CountingAllocator::default(), &cfg)
            .run_observed(|obs| trace.push((obs.token, obs.outcome, obs.handle)))
            .unwrap();
        trace
    };
    assert_eq!(run(), run());
}

#[test]
fn scenario_a_three_allocations_of_sixteen() {
    let cfg = RunConfig::with_sizes(sizes(&[16])).counts(3, 0);
    let overhead = cfg.metadata_overhead as u64;
    let mut last = None;
    let result = WorkloadExecutor::new(CountingAllocator::default(), &cfg)
        .run_observed(|obs| last = Some((obs.live_count, obs.live_bytes)))
        .unwrap();

    assert_eq!(last, Some((3, 3 * (16 + overhead))));
    assert!(result.allocate_latencies.iter().all(|s| s.size == 16 && s.succeeded));
    assert_eq!(result.cleanup_releases, 3);
    assert_eq!(result.peak_live_count, 3);
}

#[test]
fn scenario_b_release_with_nothing_live_is_a_counted_noop() {
    let cfg = RunConfig::with_sizes(sizes(&[16])).counts(1, 2);
    let plan = WorkloadPlan::from_tokens(vec![
        OpToken::Allocate,
        OpToken::Release,
        OpToken::Release,
    ]);
    let mut outcomes = Vec::new();
    let mut alloc = CountingAllocator::default();
    let result = WorkloadExecutor::new(&mut alloc, &cfg)
        .run_plan_observed(&plan, |obs| outcomes.push((obs.outcome, obs.live_count)))
        .unwrap();

    assert_eq!(
        outcomes,
        vec![
            (StepOutcome::Allocated { size: 16 }, 1),
            (StepOutcome::Released { size: 16 }, 0),
            (StepOutcome::ReleaseSkipped, 0),
        ]
    );
    assert_eq!(result.skipped_releases, 1);
    assert_eq!(result.release_latencies.len(), 1);
    assert_eq!(result.cleanup_releases, 0);
    assert_eq!(alloc.release_calls, 1);

    // Any shuffle of one allocate and two releases skips at least one release.
    let shuffled = WorkloadExecutor::new(CountingAllocator::default(), &cfg)
        .run()
        .unwrap();
    assert!(shuffled.skipped_releases >= 1);
}

#[test]
fn scenario_c_allocator_that_always_fails() {
    let cfg = RunConfig::with_sizes(sizes(&[16, 4096])).counts(50, 40);
    let mut alloc = AlwaysFails { release_calls: 0 };
    let result = WorkloadExecutor::new(&mut alloc, &cfg).run().unwrap();

    assert_eq!(result.average_utilization, 0.0);
    assert_eq!(result.failed_allocations, 50);
    assert_eq!(result.skipped_releases, 40);
    assert!(result.release_latencies.is_empty());
    assert_eq!(result.cleanup_releases, 0);
    assert_eq!(result.peak_overhead_percent, 0.0);
    assert_eq!(alloc.release_calls, 0);
}

#[test]
fn scenario_d_capacity_grows_by_the_larger_of_chunk_and_request() {
    let cfg = RunConfig::with_sizes(sizes(&[20_000]))
        .counts(1, 0)
        .metadata_overhead(16)
        .capacity(CapacityPolicy {
            initial_capacity: 16_384,
            chunk_size: 16_384,
        });
    let mut capacities = Vec::new();
    let result = WorkloadExecutor::new(CountingAllocator::default(), &cfg)
        .run_observed(|obs| capacities.push(obs.capacity))
        .unwrap();

    assert_eq!(capacities, vec![16_384 + 20_016]);
    assert_eq!(result.final_capacity, 36_400);
    let ratio = result.utilization_series[0].ratio;
    assert!((ratio - 20_016.0 / 36_400.0).abs() < 1e-12);
}

#[test]
fn peak_overhead_is_sampled_before_each_token() {
    let cfg = RunConfig::with_sizes(sizes(&[16]))
        .counts(2, 0)
        .metadata_overhead(16)
        .capacity(CapacityPolicy {
            initial_capacity: 1600,
            chunk_size: 1600,
        });
    let plan = WorkloadPlan::from_tokens(vec![OpToken::Allocate, OpToken::Allocate]);
    let result = WorkloadExecutor::new(CountingAllocator::default(), &cfg)
        .run_plan(&plan)
        .unwrap();
    // Before token 2 one allocation is live: 16 / 1600 * 100 = 1%.
    // The state after the last token is never sampled.
    assert!((result.peak_overhead_percent - 1.0).abs() < 1e-12);
}

#[test]
fn rejected_release_aborts_the_run() {
    let cfg = RunConfig::with_sizes(sizes(&[32])).counts(1, 1);
    let plan = WorkloadPlan::from_tokens(vec![OpToken::Allocate, OpToken::Release]);
    let err = WorkloadExecutor::new(RejectsReleases::default(), &cfg)
        .run_plan(&plan)
        .unwrap_err();
    match err {
        RunError::AllocatorInvariant {
            size, phase, fault, ..
        } => {
            assert_eq!(size, 32);
            assert_eq!(phase, RunPhase::Measured);
            assert!(fault.reason.contains("corrupt header"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn rejected_cleanup_release_aborts_the_run() {
    let cfg = RunConfig::with_sizes(sizes(&[32])).counts(2, 0);
    let err = WorkloadExecutor::new(RejectsReleases::default(), &cfg)
        .run()
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::AllocatorInvariant {
            phase: RunPhase::Cleanup,
            ..
        }
    ));
}

#[test]
fn duplicate_live_handle_aborts_the_run() {
    let cfg = RunConfig::with_sizes(sizes(&[32])).counts(2, 0);
    let err = WorkloadExecutor::new(ReusesHandles, &cfg).run().unwrap_err();
    assert!(matches!(err, RunError::DuplicateHandle { .. }));
    assert!(err.to_string().contains("already live"));
}

#[test]
fn empty_plan_produces_empty_result() {
    let cfg = RunConfig::with_sizes(sizes(&[16])).counts(0, 0);
    let result = WorkloadExecutor::new(CountingAllocator::default(), &cfg)
        .run()
        .unwrap();
    assert!(result.utilization_series.is_empty());
    assert_eq!(result.average_utilization, 0.0);
    assert_eq!(result.peak_overhead_percent, 0.0);
}

#[test]
fn unbounded_growth_chunk_is_rejected_before_any_allocator_call() {
    let config = RunConfig::with_sizes(sizes(&[20_000])).capacity(CapacityPolicy {
        initial_capacity: 16_384,
        chunk_size: u64::MAX,
    });
    let mut alloc = CountingAllocator::default();
    let err = WorkloadExecutor::new(&mut alloc, &config).run().unwrap_err();
    assert!(matches!(
        err,
        RunError::Config(ConfigError::AccountingOverflow { .. })
    ));
    assert_eq!(alloc.initialize_calls, 0);
    assert_eq!(alloc.allocate_calls, 0);
}

#[test]
fn huge_growth_chunk_within_bounds_completes() {
    let config = RunConfig::with_sizes(sizes(&[20_000]))
        .counts(3, 0)
        .capacity(CapacityPolicy {
            initial_capacity: 16_384,
            chunk_size: u64::MAX / 8,
        });
    let mut alloc = CountingAllocator::default();
    let result = WorkloadExecutor::new(&mut alloc, &config).run().unwrap();
    assert_eq!(result.final_capacity, 16_384 + u64::MAX / 8);
    assert_eq!(result.cleanup_releases, 3);
    assert!(result.peak_overhead_percent < 1.0);
}
