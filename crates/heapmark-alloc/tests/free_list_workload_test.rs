//! The free-list heap driven by the workload executor.

use heapmark_alloc::{FreeListHeap, HeapConfig};
use heapmark_core::{
    AllocatorUnderTest, EvictionPolicy, RunConfig, SizeDistribution, StepOutcome, Strategy,
    WorkloadExecutor,
};

fn config(strategy: Strategy, sizes: SizeDistribution, seed: u64) -> RunConfig {
    RunConfig::with_sizes(sizes).strategy(strategy).seed(seed)
}

#[test]
fn every_strategy_completes_default_workload_with_clean_heap() {
    for strategy in Strategy::all() {
        let mut heap = FreeListHeap::default();
        let cfg = config(strategy, SizeDistribution::range(1, 256).unwrap(), 42);
        let result = WorkloadExecutor::new(&mut heap, &cfg).run().unwrap();

        assert_eq!(result.strategy, strategy);
        assert_eq!(result.allocate_latencies.len(), 550);
        assert_eq!(result.release_latencies.len() + result.skipped_releases, 450);
        assert_eq!(result.failed_allocations, 0);
        // Cleanup released everything the run left live.
        assert_eq!(
            result.successful_allocations(),
            result.effective_releases() + result.cleanup_releases
        );

        let stats = heap.stats();
        assert_eq!(stats.allocated_blocks, 0, "{strategy}");
        assert_eq!(stats.free_blocks, stats.arena_count, "{strategy}");
        heap.check_integrity().unwrap();
    }
}

#[test]
fn heap_stays_consistent_after_every_token() {
    for strategy in Strategy::all() {
        let cfg = config(strategy, SizeDistribution::new(vec![16, 256, 4096, 65536]).unwrap(), 7)
            .counts(400, 400)
            .eviction(EvictionPolicy::Fifo);
        let mut heap = FreeListHeap::new(HeapConfig {
            arena_size: 64 * 1024,
            ..HeapConfig::default()
        });
        let mut live = 0usize;
        WorkloadExecutor::new(&mut heap, &cfg)
            .run_observed(|obs| {
                match obs.outcome {
                    StepOutcome::Allocated { .. } => live += 1,
                    StepOutcome::Released { .. } => live -= 1,
                    StepOutcome::AllocationFailed { .. } | StepOutcome::ReleaseSkipped => {}
                }
                assert_eq!(obs.live_count, live);
            })
            .unwrap();
        heap.check_integrity().unwrap();
    }
}

#[test]
fn bounded_heap_reports_failed_allocations() {
    let cfg = config(
        Strategy::BestFit,
        SizeDistribution::new(vec![1 << 20]).unwrap(),
        3,
    )
    .counts(20, 0);
    let heap = FreeListHeap::new(HeapConfig {
        arena_size: 1 << 20,
        max_heap_bytes: Some(8 << 20),
        seed: 0,
    });
    let result = WorkloadExecutor::new(heap, &cfg).run().unwrap();
    // Each request plus header overflows a 1 MiB arena, so every success
    // costs 1 MiB + 4 KiB of the 8 MiB limit after the initial arena.
    assert_eq!(result.successful_allocations(), 6);
    assert_eq!(result.failed_allocations, 14);
    assert_eq!(result.successful_allocations() + result.failed_allocations, 20);
}

#[test]
fn initialize_gives_each_run_a_fresh_heap() {
    let mut heap = FreeListHeap::default();
    let cfg = config(Strategy::WorstFit, SizeDistribution::range(8, 64).unwrap(), 1).counts(100, 0);
    let first = WorkloadExecutor::new(&mut heap, &cfg).run().unwrap();
    heap.initialize(Strategy::FirstFit);
    assert_eq!(heap.stats().allocated_blocks, 0);
    let second = WorkloadExecutor::new(&mut heap, &cfg).run().unwrap();
    assert_eq!(first.peak_live_count, second.peak_live_count);
    assert_eq!(heap.strategy(), Strategy::WorstFit);
}
