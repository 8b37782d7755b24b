//! Interceptor stages and the immutable chain they form.

use super::context::ExecutionContext;
use super::failure::{Failure, Outcome};
use super::handler::ExceptionHandler;
use super::stages;
use crate::error::ExecutionError;
use crate::transaction::TransactionConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Resolution policy of a [`Interceptor::BeginAndResolve`] stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Roll back on failure.
    pub process_on_exception: bool,
    /// Resolve whatever transaction is bound, not only one this stage began.
    pub resolve_any: bool,
    /// Fail a successful call whose begun transaction timed out.
    pub error_at_timeout: bool,
}

/// One concern wrapped around the callback.
pub enum Interceptor<T> {
    /// Turn a handled failure into its substitute result.
    Rethrow,
    /// Join an external transaction when none is bound.
    JoinExternal(TransactionConfig),
    /// Detach the ambient transaction for `NotSupported`.
    IsolateCurrent(TransactionConfig),
    /// Reject actions incompatible with the ambient transaction.
    ValidateState {
        config: TransactionConfig,
        resolve_previous: bool,
    },
    /// Suspend a bound XA transaction around the call.
    SuspendXa(TransactionConfig),
    /// Resolve the bound transaction before proceeding.
    ResolvePrevious(TransactionConfig),
    /// Begin a transaction if the action asks for one, and resolve afterwards.
    BeginAndResolve {
        config: TransactionConfig,
        default_timeout: Duration,
        options: ResolveOptions,
    },
    /// Give raised failures to an exception handler.
    HandleException(Option<Arc<dyn ExceptionHandler<T>>>),
    /// Resolve the transaction this invocation began after a successful call.
    CommitTransaction,
}

impl<T> Interceptor<T> {
    pub fn name(&self) -> &'static str {
        match self {
            Interceptor::Rethrow => "rethrow",
            Interceptor::JoinExternal(_) => "join_external",
            Interceptor::IsolateCurrent(_) => "isolate_current",
            Interceptor::ValidateState { .. } => "validate_state",
            Interceptor::SuspendXa(_) => "suspend_xa",
            Interceptor::ResolvePrevious(_) => "resolve_previous",
            Interceptor::BeginAndResolve { .. } => "begin_and_resolve",
            Interceptor::HandleException(_) => "handle_exception",
            Interceptor::CommitTransaction => "commit_transaction",
        }
    }

    fn intercept<F>(&self, ctx: &mut ExecutionContext, next: Next<'_, T>, callback: F) -> Outcome<T>
    where
        F: FnOnce(&mut ExecutionContext) -> Result<T, ExecutionError>,
    {
        let proceed = move |ctx: &mut ExecutionContext| next.proceed(ctx, callback);
        match self {
            Interceptor::Rethrow => stages::rethrow(ctx, proceed),
            Interceptor::JoinExternal(config) => stages::join_external(config, ctx, proceed),
            Interceptor::IsolateCurrent(config) => stages::isolate_current(config, ctx, proceed),
            Interceptor::ValidateState {
                config,
                resolve_previous,
            } => stages::validate_state(config, *resolve_previous, ctx, proceed),
            Interceptor::SuspendXa(config) => stages::suspend_xa(config, ctx, proceed),
            Interceptor::ResolvePrevious(config) => stages::resolve_previous(config, ctx, proceed),
            Interceptor::BeginAndResolve {
                config,
                default_timeout,
                options,
            } => stages::begin_and_resolve(config, *default_timeout, *options, ctx, proceed),
            Interceptor::HandleException(handler) => {
                stages::handle_exception(handler.as_deref(), ctx, proceed)
            }
            Interceptor::CommitTransaction => stages::commit_transaction(ctx, proceed),
        }
    }
}

impl<T> fmt::Debug for Interceptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The stages still to run, innermost last.
pub struct Next<'a, T> {
    remaining: &'a [Interceptor<T>],
}

impl<T> Next<'_, T> {
    /// Run the remaining stages and finally the callback.
    pub fn proceed<F>(self, ctx: &mut ExecutionContext, callback: F) -> Outcome<T>
    where
        F: FnOnce(&mut ExecutionContext) -> Result<T, ExecutionError>,
    {
        match self.remaining.split_first() {
            Some((stage, rest)) => stage.intercept(ctx, Next { remaining: rest }, callback),
            None => callback(ctx).map_err(Failure::Raised),
        }
    }
}

/// Ordered, immutable list of stages, outermost first.
///
/// Built once and shared by every call; all per-call state lives in the
/// [`ExecutionContext`].
pub struct InterceptorChain<T> {
    stages: Arc<[Interceptor<T>]>,
}

impl<T> Clone for InterceptorChain<T> {
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
        }
    }
}

impl<T> fmt::Debug for InterceptorChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stages.iter()).finish()
    }
}

impl<T> InterceptorChain<T> {
    pub fn builder() -> ChainBuilder<T> {
        ChainBuilder { stages: Vec::new() }
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Interceptor::name).collect()
    }

    /// Run `callback` through every stage.
    pub fn execute<F>(&self, ctx: &mut ExecutionContext, callback: F) -> Outcome<T>
    where
        F: FnOnce(&mut ExecutionContext) -> Result<T, ExecutionError>,
    {
        Next {
            remaining: &self.stages,
        }
        .proceed(ctx, callback)
    }
}

/// Assembles a chain from the outside in.
pub struct ChainBuilder<T> {
    stages: Vec<Interceptor<T>>,
}

impl<T> ChainBuilder<T> {
    /// Add `stage` inside the stages added so far.
    pub fn stage(mut self, stage: Interceptor<T>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Add a stage only when `condition` holds.
    pub fn stage_if(self, condition: bool, stage: impl FnOnce() -> Interceptor<T>) -> Self {
        if condition { self.stage(stage()) } else { self }
    }

    pub fn build(self) -> InterceptorChain<T> {
        InterceptorChain {
            stages: self.stages.into(),
        }
    }
}
