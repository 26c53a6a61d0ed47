//! CLI entrypoint for the heapmark allocator benchmark.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use heapmark_alloc::HeapConfig;
use heapmark_core::structured_log::{LogEmitter, validate_log_file};
use heapmark_core::{CapacityPolicy, EvictionPolicy, RunConfig, SizeDistribution, Strategy};
use heapmark_harness::artifacts::{log_artifacts, write_file, ArtifactIndex};
use heapmark_harness::scenarios::{self, StressSplit};
use heapmark_harness::suite::DEFAULT_RANDOM_CASES;
use heapmark_harness::{render_markdown, run_single, run_suite, SuiteConfig, SuiteReport};

/// Allocator benchmarking harness.
#[derive(Debug, Parser)]
#[command(name = "heapmark")]
#[command(about = "Replay seeded allocate/release workloads against simulated allocators")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a single run and print its summary as JSON.
    Run {
        /// JSON run configuration; flags below override its fields.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        strategy: Option<Strategy>,
        /// Decimal or 0x-prefixed hex.
        #[arg(long, value_parser = parse_seed)]
        seed: Option<u64>,
        #[arg(long)]
        mallocs: Option<usize>,
        #[arg(long)]
        frees: Option<usize>,
        /// Bookkeeping bytes charged per live allocation.
        #[arg(long)]
        metadata: Option<usize>,
        #[arg(long)]
        initial_capacity: Option<u64>,
        #[arg(long)]
        chunk_size: Option<u64>,
        /// Which live allocation a release token frees.
        #[arg(long)]
        eviction: Option<EvictionPolicy>,
        /// `a..=b`, `pow2:a..b[:step]`, or `a,b,c`.
        #[arg(long, value_parser = SizeDistribution::parse_spec)]
        sizes: Option<SizeDistribution>,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Write the full run result (including series) as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the scenario catalogue across strategies and report.
    Suite {
        #[arg(long, default_value_t = DEFAULT_RANDOM_CASES)]
        random_cases: usize,
        #[arg(long, default_value_t = 1)]
        repeats: usize,
        /// Comma-separated strategies.
        #[arg(long, value_delimiter = ',', default_value = "first-fit,best-fit,worst-fit")]
        strategies: Vec<Strategy>,
        #[arg(long, value_parser = parse_seed)]
        seed: Option<u64>,
        /// Worker threads.
        #[arg(long, default_value_t = 1)]
        jobs: usize,
        /// Run stress scenarios at 550/450 instead of their derived split.
        #[arg(long)]
        fixed_split: bool,
        #[arg(long)]
        log: Option<PathBuf>,
        /// Markdown report path (if omitted, prints to stdout).
        #[arg(long)]
        output_md: Option<PathBuf>,
        #[arg(long)]
        output_json: Option<PathBuf>,
        /// Artifact index covering every file written.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
    },
    /// Validate a structured JSONL log written by `run` or `suite`.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
    /// List the scenario catalogue.
    Scenarios {
        #[arg(long, default_value_t = 10)]
        random_cases: usize,
        #[arg(long, value_parser = parse_seed)]
        seed: Option<u64>,
        #[arg(long)]
        fixed_split: bool,
    },
}

fn stress_split(fixed: bool) -> StressSplit {
    if fixed {
        StressSplit::Fixed
    } else {
        StressSplit::Derived
    }
}

/// Parse a seed as decimal or `0x` hex, ignoring `_` separators.
fn parse_seed(raw: &str) -> Result<u64, String> {
    let cleaned = raw.trim().replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid seed '{raw}': {e}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            strategy,
            seed,
            mallocs,
            frees,
            metadata,
            initial_capacity,
            chunk_size,
            eviction,
            sizes,
            log,
            output,
        } => {
            let mut cfg = match &config {
                Some(path) => RunConfig::from_file(path)
                    .map_err(|e| format!("failed to load {}: {e}", path.display()))?,
                None => RunConfig::default(),
            };
            if let Some(s) = strategy {
                cfg.strategy = s;
            }
            if let Some(s) = seed {
                cfg.seed = s;
            }
            if let Some(m) = mallocs {
                cfg.malloc_count = m;
            }
            if let Some(f) = frees {
                cfg.free_count = f;
            }
            if let Some(m) = metadata {
                cfg.metadata_overhead = m;
            }
            cfg.capacity = CapacityPolicy {
                initial_capacity: initial_capacity.unwrap_or(cfg.capacity.initial_capacity),
                chunk_size: chunk_size.unwrap_or(cfg.capacity.chunk_size),
            };
            if let Some(e) = eviction {
                cfg.eviction = e;
            }
            if let Some(s) = sizes {
                cfg.sizes = s;
            }

            let mut emitter = match &log {
                Some(path) => Some(LogEmitter::to_file(
                    path,
                    "heapmark",
                    &format!("run-{:x}", cfg.seed),
                )?),
                None => None,
            };
            let result = run_single(&cfg, HeapConfig::default(), None, emitter.as_mut());
            if let Some(emitter) = emitter.as_mut() {
                emitter.flush()?;
            }
            let result = result?;

            println!("{}", serde_json::to_string_pretty(&result.summary_json())?);
            if let Some(path) = output {
                write_file(&path, serde_json::to_string_pretty(&result)?.as_bytes())?;
                eprintln!("Wrote run result to {}", path.display());
            }
        }
        Command::Suite {
            random_cases,
            repeats,
            strategies,
            seed,
            jobs,
            fixed_split,
            log,
            output_md,
            output_json,
            artifact_index,
        } => {
            let suite = SuiteConfig {
                random_cases,
                repeats,
                strategies,
                seed: seed.unwrap_or(SuiteConfig::default().seed),
                jobs,
                stress_split: stress_split(fixed_split),
                ..SuiteConfig::default()
            };
            let run_id = format!("suite-{:x}", suite.seed);
            let mut emitter = match &log {
                Some(path) => Some(LogEmitter::to_file(path, "heapmark", &run_id)?),
                None => None,
            };
            eprintln!(
                "Running suite: {} random cases, {} strategies, {} repeats, {} jobs",
                suite.random_cases,
                suite.strategies.len(),
                suite.repeats,
                suite.jobs
            );
            let outcome = run_suite(&suite, emitter.as_mut())?;

            let report = SuiteReport::from_outcome(&outcome);
            let markdown = render_markdown(&report);
            let mut written: Vec<(&Path, &str)> = Vec::new();
            match &output_md {
                Some(path) => {
                    write_file(path, markdown.as_bytes())?;
                    written.push((path.as_path(), "report_md"));
                }
                None => print!("{markdown}"),
            }
            if let Some(path) = &output_json {
                write_file(path, report.to_json()?.as_bytes())?;
                written.push((path.as_path(), "report_json"));
            }
            // Close the log before it is hashed.
            if let Some(mut emitter) = emitter.take() {
                log_artifacts(&mut emitter, suite.seed, &written)?;
            }
            if let Some(path) = &log {
                written.push((path.as_path(), "log_jsonl"));
            }
            if let Some(index_path) = &artifact_index {
                let mut index = ArtifactIndex::new(run_id);
                for (path, kind) in &written {
                    index.add_file(path, kind)?;
                }
                write_file(index_path, index.to_json()?.as_bytes())?;
                eprintln!(
                    "Artifact index: {} ({} artifacts)",
                    index_path.display(),
                    index.artifacts.len()
                );
            }
            eprintln!(
                "Suite complete: {} runs in {:.2}s",
                outcome.cases.len(),
                outcome.wall_time_secs
            );
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            if !errors.is_empty() {
                return Err(format!(
                    "{} invalid field(s) across {lines} lines in {}",
                    errors.len(),
                    log.display()
                )
                .into());
            }
            println!("{lines} lines valid");
        }
        Command::Scenarios {
            random_cases,
            seed,
            fixed_split,
        } => {
            let seed = seed.unwrap_or(SuiteConfig::default().seed);
            for s in scenarios::catalogue(random_cases, seed, stress_split(fixed_split))? {
                println!(
                    "{:<26} {:<12} allocs={:<6} frees={:<6} sizes={} ({}..={})",
                    s.name,
                    s.kind.as_str(),
                    s.malloc_count,
                    s.free_count,
                    s.sizes.len(),
                    s.sizes.min_size(),
                    s.sizes.max_size()
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_parse_decimal_and_hex() {
        assert_eq!(parse_seed("42"), Ok(42));
        assert_eq!(parse_seed("0xDEAD_BEEF"), Ok(0xDEAD_BEEF));
        assert_eq!(parse_seed("1_000"), Ok(1000));
        assert!(parse_seed("0xzz").is_err());
        assert!(parse_seed("-1").is_err());
    }

    #[test]
    fn cli_parses_suite_flags() {
        let cli = Cli::try_parse_from([
            "heapmark",
            "suite",
            "--random-cases",
            "5",
            "--strategies",
            "best-fit,sequential",
            "--seed",
            "0x10",
            "--jobs",
            "4",
            "--fixed-split",
        ])
        .unwrap();
        match cli.command {
            Command::Suite {
                random_cases,
                strategies,
                seed,
                jobs,
                fixed_split,
                ..
            } => {
                assert_eq!(random_cases, 5);
                assert_eq!(strategies, vec![Strategy::BestFit, Strategy::Sequential]);
                assert_eq!(seed, Some(16));
                assert_eq!(jobs, 4);
                assert_eq!(stress_split(fixed_split), StressSplit::Fixed);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_parses_run_sizes() {
        let cli = Cli::try_parse_from(["heapmark", "run", "--sizes", "pow2:4..8", "--eviction", "lifo"])
            .unwrap();
        match cli.command {
            Command::Run { sizes, eviction, .. } => {
                assert_eq!(sizes.unwrap().sizes(), &[16, 32, 64, 128]);
                assert_eq!(eviction, Some(EvictionPolicy::Lifo));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
