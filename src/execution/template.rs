//! Execution templates: fixed interceptor pipelines behind one `execute` call.

use super::context::{ExecutionContext, discard_leftover};
use super::failure::Failure;
use super::handler::ExceptionHandler;
use super::interceptor::{Interceptor, InterceptorChain, ResolveOptions};
use super::result::InvocationResult;
use crate::config::{Config, TemplateMode};
use crate::error::ExecutionError;
use crate::transaction::{TransactionConfig, TransactionFactory};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Timeout for begun transactions when neither the template nor its
/// transaction configuration sets one.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs callbacks under transaction demarcation and error handling.
///
/// The chain is built once at construction and shared by every call, so a
/// template can be used from many threads at once.
pub struct ExecutionTemplate<T> {
    chain: InterceptorChain<T>,
}

impl<T> Clone for ExecutionTemplate<T> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
        }
    }
}

impl<T> fmt::Debug for ExecutionTemplate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionTemplate")
            .field("chain", &self.chain)
            .finish()
    }
}

impl<T> ExecutionTemplate<T> {
    /// Template for the outermost unit of message processing: failures go to
    /// an exception handler and any transaction still bound at the end is
    /// resolved.
    pub fn error_handling() -> ErrorHandlingBuilder<T> {
        ErrorHandlingBuilder {
            handler: None,
            config: TransactionConfig::default(),
            default_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }

    /// Transactional template in standard mode.
    pub fn transactional(config: TransactionConfig) -> Self {
        Self::transactional_with_mode(config, TemplateMode::Standard)
    }

    pub fn transactional_with_mode(config: TransactionConfig, mode: TemplateMode) -> Self {
        Self::transactional_with_timeout(config, mode, DEFAULT_TRANSACTION_TIMEOUT)
    }

    /// Transactional template whose begun transactions time out after
    /// `default_timeout` unless the configuration says otherwise.
    pub fn transactional_with_timeout(
        config: TransactionConfig,
        mode: TemplateMode,
        default_timeout: Duration,
    ) -> Self {
        let (resolve_previous, error_at_timeout) = match mode {
            TemplateMode::Standard => (false, true),
            TemplateMode::Scope => (false, false),
            TemplateMode::Compatibility => (true, false),
        };
        let options = ResolveOptions {
            process_on_exception: true,
            resolve_any: false,
            error_at_timeout,
        };

        let chain = InterceptorChain::builder()
            .stage_if(config.interact_with_external, || {
                Interceptor::JoinExternal(config.clone())
            })
            .stage(Interceptor::IsolateCurrent(config.clone()))
            .stage(Interceptor::ValidateState {
                config: config.clone(),
                resolve_previous,
            })
            .stage(Interceptor::SuspendXa(config.clone()))
            .stage_if(resolve_previous, || {
                Interceptor::ResolvePrevious(config.clone())
            })
            .stage(Interceptor::BeginAndResolve {
                config,
                default_timeout,
                options,
            })
            .build();

        Self { chain }
    }

    /// Transactional template built from loaded configuration.
    pub fn from_config(config: &Config, factory: Option<Arc<dyn TransactionFactory>>) -> Self {
        Self::transactional_with_timeout(
            TransactionConfig::from_settings(&config.transaction, factory),
            config.transaction.mode,
            config.transaction_timeout(),
        )
    }

    pub fn chain(&self) -> &InterceptorChain<T> {
        &self.chain
    }

    /// Run `callback` with a fresh context.
    ///
    /// A transaction the chain leaves bound can never be resolved by anyone
    /// else, so it is rolled back with a warning.
    pub fn execute<F>(&self, callback: F) -> Result<T, ExecutionError>
    where
        F: FnOnce(&mut ExecutionContext) -> Result<T, ExecutionError>,
    {
        let mut ctx = ExecutionContext::new();
        let result = self.execute_in(&mut ctx, callback);
        if let Some(leftover) = ctx.unbind() {
            discard_leftover(&leftover, "finishing an invocation");
        }
        result
    }

    /// Run `callback` within the caller's context, e.g. inside its ambient
    /// transaction.
    pub fn execute_in<F>(
        &self,
        ctx: &mut ExecutionContext,
        callback: F,
    ) -> Result<T, ExecutionError>
    where
        F: FnOnce(&mut ExecutionContext) -> Result<T, ExecutionError>,
    {
        let outer_started = ctx.replace_transaction_started(false);
        let outcome = self.chain.execute(ctx, callback);
        ctx.replace_transaction_started(outer_started);

        match outcome {
            Ok(value) => Ok(value),
            Err(Failure::Raised(error)) => Err(error),
            Err(Failure::Handled { cause, .. }) => {
                tracing::warn!(
                    error = %cause,
                    "handled failure reached the template without a rethrow stage"
                );
                Err(cause)
            }
        }
    }

    /// Run `callback` and report the outcome as an [`InvocationResult`].
    pub fn invoke<F>(&self, callback: F) -> InvocationResult<T>
    where
        F: FnOnce(&mut ExecutionContext) -> Result<T, ExecutionError>,
    {
        self.execute(callback).into()
    }
}

/// Builder for [`ExecutionTemplate::error_handling`].
pub struct ErrorHandlingBuilder<T> {
    handler: Option<Arc<dyn ExceptionHandler<T>>>,
    config: TransactionConfig,
    default_timeout: Duration,
}

impl<T> ErrorHandlingBuilder<T> {
    pub fn with_handler(mut self, handler: impl ExceptionHandler<T> + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Transaction demarcation applied inside error handling.
    pub fn with_transaction_config(mut self, config: TransactionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn build(self) -> ExecutionTemplate<T> {
        let chain = InterceptorChain::builder()
            .stage(Interceptor::Rethrow)
            .stage(Interceptor::SuspendXa(self.config.clone()))
            .stage(Interceptor::BeginAndResolve {
                config: TransactionConfig::default(),
                default_timeout: self.default_timeout,
                options: ResolveOptions {
                    resolve_any: true,
                    ..ResolveOptions::default()
                },
            })
            .stage(Interceptor::BeginAndResolve {
                config: self.config,
                default_timeout: self.default_timeout,
                options: ResolveOptions::default(),
            })
            .stage(Interceptor::HandleException(self.handler))
            .stage(Interceptor::CommitTransaction)
            .build();

        ExecutionTemplate { chain }
    }
}
