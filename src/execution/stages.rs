//! Behaviour of each interceptor stage.
//!
//! Every stage receives the context and a `proceed` continuation running the
//! stages inside it. A stage may short-circuit by not calling `proceed`.

use super::context::{ExecutionContext, discard_leftover};
use super::failure::{Failure, Outcome};
use super::handler::{ExceptionHandler, HandlerOutcome};
use super::interceptor::ResolveOptions;
use crate::error::{ExecutionError, TransactionError};
use crate::transaction::{Transaction, TransactionAction, TransactionConfig};
use std::sync::Arc;
use std::time::Duration;

pub(super) fn rethrow<T, P>(ctx: &mut ExecutionContext, proceed: P) -> Outcome<T>
where
    P: FnOnce(&mut ExecutionContext) -> Outcome<T>,
{
    match proceed(ctx) {
        Err(Failure::Handled { cause, substitute }) => {
            tracing::debug!(error = %cause, "failure handled; returning substitute result");
            Ok(substitute)
        }
        outcome => outcome,
    }
}

pub(super) fn join_external<T, P>(
    config: &TransactionConfig,
    ctx: &mut ExecutionContext,
    proceed: P,
) -> Outcome<T>
where
    P: FnOnce(&mut ExecutionContext) -> Outcome<T>,
{
    let factory = match &config.factory {
        Some(factory)
            if config.interact_with_external
                && config.action.joins_external()
                && ctx.transaction().is_none() =>
        {
            factory
        }
        _ => return proceed(ctx),
    };

    let Some(joined) = factory.join_external()? else {
        return proceed(ctx);
    };
    tracing::debug!(transaction = joined.id(), "joined external transaction");
    ctx.bind(Arc::clone(&joined))?;

    let outcome = proceed(ctx);
    if ctx
        .transaction()
        .is_some_and(|bound| bound.id() == joined.id())
    {
        ctx.unbind();
    }
    outcome
}

pub(super) fn isolate_current<T, P>(
    config: &TransactionConfig,
    ctx: &mut ExecutionContext,
    proceed: P,
) -> Outcome<T>
where
    P: FnOnce(&mut ExecutionContext) -> Outcome<T>,
{
    if config.action != TransactionAction::NotSupported {
        return proceed(ctx);
    }
    let Some(detached) = ctx.unbind() else {
        return proceed(ctx);
    };

    tracing::debug!(transaction = detached.id(), "isolating from current transaction");
    let outcome = proceed(ctx);
    if let Some(leftover) = ctx.rebind(Arc::clone(&detached)) {
        discard_leftover(&leftover, "restoring an isolated transaction");
    }
    outcome
}

pub(super) fn validate_state<T, P>(
    config: &TransactionConfig,
    resolve_previous: bool,
    ctx: &mut ExecutionContext,
    proceed: P,
) -> Outcome<T>
where
    P: FnOnce(&mut ExecutionContext) -> Outcome<T>,
{
    let violation = match (config.action, ctx.transaction()) {
        (TransactionAction::Never, Some(bound)) => Some(format!(
            "action '{}' forbids the bound transaction {}",
            config.action,
            bound.id()
        )),
        (TransactionAction::AlwaysJoin, None) => Some(format!(
            "action '{}' requires a bound transaction",
            config.action
        )),
        (TransactionAction::AlwaysBegin, Some(bound)) if !bound.is_xa() && !resolve_previous => {
            Some(format!(
                "action '{}' cannot begin while non-XA transaction {} is bound",
                config.action,
                bound.id()
            ))
        }
        _ => None,
    };

    if let Some(reason) = violation {
        return Err(ExecutionError::IllegalTransactionState(reason).into());
    }
    proceed(ctx)
}

pub(super) fn suspend_xa<T, P>(
    config: &TransactionConfig,
    ctx: &mut ExecutionContext,
    proceed: P,
) -> Outcome<T>
where
    P: FnOnce(&mut ExecutionContext) -> Outcome<T>,
{
    let bound_xa = ctx.transaction().is_some_and(|bound| bound.is_xa());
    if !config.action.suspends_xa() || !bound_xa {
        return proceed(ctx);
    }

    let suspended = ctx.suspend()?;
    let outcome = proceed(ctx);
    let resumed = ctx.resume(suspended);

    match (outcome, resumed) {
        (outcome, Ok(())) => outcome,
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(failure), Err(e)) => {
            tracing::error!(error = %e, "failed to resume suspended transaction");
            Err(failure)
        }
    }
}

pub(super) fn resolve_previous<T, P>(
    config: &TransactionConfig,
    ctx: &mut ExecutionContext,
    proceed: P,
) -> Outcome<T>
where
    P: FnOnce(&mut ExecutionContext) -> Outcome<T>,
{
    if config.action.resolves_previous()
        && let Some(previous) = ctx.transaction()
    {
        tracing::debug!(
            transaction = previous.id(),
            action = config.action.as_str(),
            "resolving previous transaction"
        );
        ctx.resolve_transaction()?;
    }
    proceed(ctx)
}

pub(super) fn begin_and_resolve<T, P>(
    config: &TransactionConfig,
    default_timeout: Duration,
    options: ResolveOptions,
    ctx: &mut ExecutionContext,
    proceed: P,
) -> Outcome<T>
where
    P: FnOnce(&mut ExecutionContext) -> Outcome<T>,
{
    let started = if config.action.begins(ctx.transaction().is_some()) {
        Some(begin(config, default_timeout, ctx)?)
    } else {
        None
    };

    match proceed(ctx) {
        Ok(value) => {
            if options.error_at_timeout
                && let Some(transaction) = &started
                && transaction.is_timed_out()
            {
                let id = transaction.id().to_string();
                if ctx.transaction().is_some_and(|bound| bound.id() == id) {
                    ctx.unbind();
                }
                tracing::warn!(transaction = %id, "transaction timed out; rolling back");
                if let Err(e) = transaction.rollback() {
                    tracing::error!(
                        transaction = %id,
                        error = %e,
                        "failed to roll back timed out transaction"
                    );
                }
                return Err(TransactionError::Timeout(id).into());
            }

            if started.is_some() || options.resolve_any {
                ctx.resolve_transaction()?;
            }
            Ok(value)
        }
        Err(failure) => {
            if options.process_on_exception && (started.is_some() || options.resolve_any) {
                if let Err(e) = ctx.rollback_transaction() {
                    tracing::error!(
                        error = %e,
                        cause = %failure.error(),
                        "failed to roll back transaction after failure"
                    );
                }
            }
            Err(failure)
        }
    }
}

fn begin(
    config: &TransactionConfig,
    default_timeout: Duration,
    ctx: &mut ExecutionContext,
) -> Result<Arc<dyn Transaction>, ExecutionError> {
    let Some(factory) = &config.factory else {
        return Err(ExecutionError::IllegalTransactionState(format!(
            "action '{}' needs a transaction factory to begin a transaction",
            config.action
        )));
    };

    let transaction = factory.begin()?;
    transaction.set_timeout(config.timeout.unwrap_or(default_timeout));
    if let Err(e) = ctx.bind(Arc::clone(&transaction)) {
        if let Err(rollback) = transaction.rollback() {
            tracing::error!(
                transaction = transaction.id(),
                error = %rollback,
                "failed to roll back unbound transaction"
            );
        }
        return Err(e);
    }
    ctx.mark_transaction_started();
    tracing::debug!(
        transaction = transaction.id(),
        action = config.action.as_str(),
        "began transaction"
    );
    Ok(transaction)
}

/// Failures leaving this stage never commit: a transaction this invocation
/// began that the handler left bound is rolled back.
pub(super) fn handle_exception<T, P>(
    handler: Option<&dyn ExceptionHandler<T>>,
    ctx: &mut ExecutionContext,
    proceed: P,
) -> Outcome<T>
where
    P: FnOnce(&mut ExecutionContext) -> Outcome<T>,
{
    let error = match proceed(ctx) {
        Err(Failure::Raised(error)) => error,
        outcome => return outcome,
    };

    let failure = match handler.filter(|handler| handler.accepts(&error)) {
        None => Failure::Raised(error),
        Some(handler) => match handler.handle(&error, ctx) {
            HandlerOutcome::Handled(substitute) => {
                tracing::debug!(component = ctx.component(), error = %error, "exception handled");
                Failure::Handled {
                    cause: error,
                    substitute,
                }
            }
            HandlerOutcome::Propagate => Failure::Raised(error),
            HandlerOutcome::Replace(replacement) => {
                tracing::debug!(
                    component = ctx.component(),
                    error = %error,
                    replacement = %replacement,
                    "exception replaced by handler"
                );
                Failure::Raised(replacement)
            }
        },
    };

    if ctx.is_transaction_started()
        && let Err(e) = ctx.rollback_transaction()
    {
        tracing::error!(
            error = %e,
            cause = %failure.error(),
            "failed to roll back transaction after failure"
        );
    }
    Err(failure)
}

pub(super) fn commit_transaction<T, P>(ctx: &mut ExecutionContext, proceed: P) -> Outcome<T>
where
    P: FnOnce(&mut ExecutionContext) -> Outcome<T>,
{
    let value = proceed(ctx)?;
    if ctx.is_transaction_started() && ctx.transaction().is_some() {
        ctx.resolve_transaction()?;
    }
    Ok(value)
}
