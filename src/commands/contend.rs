//! Implementation of the `interlock contend` command.
//!
//! Runs a fixed number of worker threads against one lock group. Each worker
//! walks every identifier `iterations` times, starting at a different offset
//! so that workers collide. An occupancy counter per identifier detects two
//! workers inside the same lock.

use super::{load_config, print_json};
use crate::cli::ContendArgs;
use interlock::config::Config;
use interlock::error::{InterlockError, Result};
use interlock::locks::{LockAdapter, LockGroup};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of one contention run.
#[derive(Debug, Serialize)]
pub struct ContendReport {
    pub threads: usize,
    pub identifiers: usize,
    pub iterations: usize,
    pub fair_locks: bool,
    pub acquisitions: usize,
    pub violations: usize,
    /// Highest reference count observed on any identifier while held.
    pub max_references: usize,
    /// Identifiers still tracked by the group after every worker finished.
    pub tracked_after: usize,
    pub disposed: bool,
    pub elapsed_ms: u64,
}

/// Execute the `interlock contend` command.
pub fn cmd_contend(args: ContendArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let report = run_contend(&args, &config)?;

    if args.json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if report.violations > 0 {
        return Err(InterlockError::Exclusion(format!(
            "{} overlapping acquisition(s) observed",
            report.violations
        )));
    }
    Ok(())
}

pub fn run_contend(args: &ContendArgs, config: &Config) -> Result<ContendReport> {
    if args.threads == 0 || args.identifiers == 0 {
        return Err(InterlockError::Usage(
            "--threads and --identifiers must be greater than 0".to_string(),
        ));
    }

    let group = Arc::new(LockGroup::from_config(config));
    let adapters: Vec<LockAdapter> = (0..args.identifiers)
        .map(|i| group.adapter(format!("resource-{}", i)))
        .collect();
    let occupancy: Vec<AtomicUsize> =
        (0..args.identifiers).map(|_| AtomicUsize::new(0)).collect();
    let acquisitions = AtomicUsize::new(0);
    let violations = AtomicUsize::new(0);
    let max_references = AtomicUsize::new(0);
    let hold = Duration::from_millis(args.hold_ms);
    let iterations = args.iterations;
    let started = Instant::now();

    thread::scope(|scope| {
        for worker in 0..args.threads {
            let (group, adapters, occupancy) = (&group, &adapters, &occupancy);
            let (acquisitions, violations, max_references) =
                (&acquisitions, &violations, &max_references);

            scope.spawn(move || {
                for round in 0..iterations {
                    for offset in 0..adapters.len() {
                        let slot = (worker + round + offset) % adapters.len();
                        let adapter = &adapters[slot];
                        let _guard = adapter.guard();

                        max_references.fetch_max(
                            group.reference_count(adapter.identifier()),
                            Ordering::SeqCst,
                        );
                        if occupancy[slot].fetch_add(1, Ordering::SeqCst) != 0 {
                            violations.fetch_add(1, Ordering::SeqCst);
                            tracing::error!(
                                lock = adapter.identifier(),
                                worker,
                                "two holders inside one lock"
                            );
                        }
                        if !hold.is_zero() {
                            thread::sleep(hold);
                        }
                        occupancy[slot].fetch_sub(1, Ordering::SeqCst);
                        acquisitions.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    let tracked_after = group.tracked_identifiers().len();
    let disposed = group.dispose();
    let report = ContendReport {
        threads: args.threads,
        identifiers: args.identifiers,
        iterations,
        fair_locks: config.fair_locks,
        acquisitions: acquisitions.into_inner(),
        violations: violations.into_inner(),
        max_references: max_references.into_inner(),
        tracked_after,
        disposed,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    tracing::debug!(?report, "contention run finished");
    Ok(report)
}

fn print_report(report: &ContendReport) {
    println!("Contention Run");
    println!("==============");
    println!();
    println!("  Threads:        {}", report.threads);
    println!("  Identifiers:    {}", report.identifiers);
    println!("  Iterations:     {}", report.iterations);
    println!(
        "  Locks:          {}",
        if report.fair_locks { "fair" } else { "barging" }
    );
    println!();
    println!("  Acquisitions:   {}", report.acquisitions);
    println!("  Violations:     {}", report.violations);
    println!("  Max references: {}", report.max_references);
    println!("  Still tracked:  {}", report.tracked_after);
    println!(
        "  Disposed:       {}",
        if report.disposed { "yes" } else { "no (timed out)" }
    );
    println!("  Elapsed:        {} ms", report.elapsed_ms);
}
