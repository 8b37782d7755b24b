//! Implementation of the `interlock execute` command.
//!
//! Builds a transactional template from configuration plus command-line
//! overrides, runs one callback through it against the in-memory transaction
//! manager, and reports the invocation result and the transaction journal.

use super::{load_config, print_json};
use crate::cli::ExecuteArgs;
use interlock::config::{Config, TemplateMode};
use interlock::error::{ExecutionError, InterlockError, Result};
use interlock::execution::{ExecutionContext, ExecutionTemplate, InvocationResult};
use interlock::transaction::{
    InMemoryTransactionManager, JournalEntry, TransactionAction, TransactionFactory,
};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Failure raised by the callback when `--fail` is given.
#[derive(Debug, Error)]
#[error("callback failed on request")]
struct RequestedFailure;

/// Outcome of one `execute` run.
#[derive(Debug, Serialize)]
pub struct ExecuteReport {
    pub action: TransactionAction,
    pub mode: TemplateMode,
    pub stages: Vec<&'static str>,
    /// Payload is the id of the transaction the callback saw, or "none".
    pub result: InvocationResult<String>,
    pub journal: Vec<JournalEntry>,
    #[serde(skip)]
    pub error: Option<ExecutionError>,
}

/// Execute the `interlock execute` command.
///
/// Exits with the execution failure code when the invocation did not succeed.
pub fn cmd_execute(args: ExecuteArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut report = run_execute(&args, config)?;

    if args.json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    match report.error.take() {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

pub fn run_execute(args: &ExecuteArgs, mut config: Config) -> Result<ExecuteReport> {
    apply_overrides(args, &mut config)?;
    config.validate()?;

    let manager = Arc::new(InMemoryTransactionManager::new());
    if args.external {
        manager.offer_external(args.xa);
    }
    let factory: Arc<dyn TransactionFactory> = manager.clone();
    let template = ExecutionTemplate::<String>::from_config(&config, Some(factory));

    let mut ctx = ExecutionContext::new().with_component("interlock-cli");
    if args.ambient {
        ctx = ctx.with_transaction(manager.create(args.xa));
    }

    let work = Duration::from_millis(args.work_ms);
    let outcome = template.execute_in(&mut ctx, |ctx| {
        if !work.is_zero() {
            thread::sleep(work);
        }
        let seen = ctx.transaction().map(|transaction| {
            if args.rollback_only {
                transaction.set_rollback_only();
            }
            transaction.id().to_string()
        });
        if args.fail {
            return Err(ExecutionError::callback(RequestedFailure));
        }
        Ok(seen.unwrap_or_else(|| "none".to_string()))
    });

    // The caller's scope ends here: whatever it still has bound is resolved
    // the way the caller would.
    let finished = if outcome.is_ok() {
        ctx.resolve_transaction()
    } else {
        ctx.rollback_transaction()
    };
    finished.map_err(ExecutionError::from)?;

    let (result, error) = match outcome {
        Ok(seen) => (InvocationResult::successful(seen), None),
        Err(error) => (InvocationResult::from_error(&error), Some(error)),
    };

    Ok(ExecuteReport {
        action: config.transaction.action,
        mode: config.transaction.mode,
        stages: template.chain().stage_names(),
        result,
        journal: manager.journal(),
        error,
    })
}

fn apply_overrides(args: &ExecuteArgs, config: &mut Config) -> Result<()> {
    if let Some(action) = &args.action {
        config.transaction.action = TransactionAction::from_str(action).ok_or_else(|| {
            let known: Vec<&str> = TransactionAction::ALL.iter().map(|a| a.as_str()).collect();
            InterlockError::Usage(format!(
                "unknown transaction action '{}' (expected one of: {})",
                action,
                known.join(", ")
            ))
        })?;
    }
    if let Some(mode) = &args.mode {
        config.transaction.mode = TemplateMode::from_str(mode).ok_or_else(|| {
            InterlockError::Usage(format!(
                "unknown template mode '{}' (expected one of: standard, scope, compatibility)",
                mode
            ))
        })?;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.transaction.timeout_ms = Some(timeout_ms);
    }
    if args.external {
        config.transaction.interact_with_external = true;
    }
    Ok(())
}

fn print_report(report: &ExecuteReport) {
    println!("Execution");
    println!("=========");
    println!();
    println!(
        "  Action:  {} ({} mode)",
        report.action,
        report.mode.as_str()
    );
    println!("  Stages:  {}", report.stages.join(" -> "));

    println!("  Status:  {}", report.result.status().as_str());
    if let Some(payload) = report.result.payload() {
        println!("  Saw:     {}", payload);
    }
    if let Some(message) = report.result.error_message() {
        println!("  Error:   {}", message);
    }
    println!();

    if report.journal.is_empty() {
        println!("No transaction activity.");
        return;
    }
    println!("Journal ({} entries):", report.journal.len());
    for entry in &report.journal {
        let detail = entry
            .detail
            .as_deref()
            .map(|d| format!(" ({})", d))
            .unwrap_or_default();
        println!(
            "  {}  {}  {}{}",
            entry.at.format("%H:%M:%S%.3f"),
            entry.transaction,
            entry.event.as_str(),
            detail
        );
    }
}
