//! Tests for execution templates and interceptor stages.

use super::*;
use crate::config::{Config, TemplateMode};
use crate::error::{ExecutionError, InterlockError, LockError, TransactionError};
use crate::locks::{Interrupter, LockGroup};
use crate::transaction::{
    InMemoryTransactionManager, JournalEvent, Transaction, TransactionAction, TransactionConfig,
    TransactionFactory,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RETURN_VALUE: &str = "value";

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("fail: {0}")]
struct Fail(String);

fn manager() -> Arc<InMemoryTransactionManager> {
    Arc::new(InMemoryTransactionManager::new())
}

fn config(
    action: TransactionAction,
    manager: &Arc<InMemoryTransactionManager>,
) -> TransactionConfig {
    TransactionConfig::new(action).with_factory(manager.clone())
}

fn transactional(
    action: TransactionAction,
    manager: &Arc<InMemoryTransactionManager>,
) -> ExecutionTemplate<&'static str> {
    ExecutionTemplate::transactional(config(action, manager))
}

fn compatibility(
    action: TransactionAction,
    manager: &Arc<InMemoryTransactionManager>,
) -> ExecutionTemplate<&'static str> {
    ExecutionTemplate::transactional_with_mode(
        config(action, manager),
        TemplateMode::Compatibility,
    )
}

fn succeed(_: &mut ExecutionContext) -> Result<&'static str, ExecutionError> {
    Ok(RETURN_VALUE)
}

fn fail(_: &mut ExecutionContext) -> Result<&'static str, ExecutionError> {
    Err(ExecutionError::callback(Fail("x".to_string())))
}

fn mark_rollback_only(ctx: &mut ExecutionContext) -> Result<&'static str, ExecutionError> {
    ctx.transaction().unwrap().set_rollback_only();
    Ok(RETURN_VALUE)
}

fn bound_id(ctx: &ExecutionContext) -> Option<String> {
    ctx.transaction().map(|tx| tx.id().to_string())
}

/// Identifier of the most recently created transaction.
fn last_begun(manager: &InMemoryTransactionManager) -> String {
    manager.begun().last().cloned().unwrap()
}

fn timeout_detail(manager: &InMemoryTransactionManager, transaction: &str) -> Option<String> {
    manager
        .journal()
        .into_iter()
        .find(|entry| entry.transaction == transaction && entry.event == JournalEvent::TimeoutSet)
        .and_then(|entry| entry.detail)
}

// ============================================================================
// Testable properties
// ============================================================================

#[test]
fn test_error_handling_template_returns_handler_substitute() {
    let template = ExecutionTemplate::<&'static str>::error_handling()
        .with_handler(|error: &ExecutionError, _: &mut ExecutionContext| {
            if error.callback_error::<Fail>().is_some() {
                HandlerOutcome::Handled("handled")
            } else {
                HandlerOutcome::Propagate
            }
        })
        .build();

    let result = template.execute(fail);

    assert_eq!(result.unwrap(), "handled");
}

#[test]
fn test_transactional_template_rolls_back_begun_transaction_on_failure() {
    let manager = manager();
    let template = transactional(TransactionAction::AlwaysBegin, &manager);

    let err = template.execute(fail).unwrap_err();

    assert_eq!(err.callback_error::<Fail>(), Some(&Fail("x".to_string())));
    let tx = last_begun(&manager);
    assert_eq!(manager.count(&tx, JournalEvent::RolledBack), 1);
    assert_eq!(manager.count(&tx, JournalEvent::Committed), 0);
}

#[test]
fn test_transactional_template_begins_and_commits_once() {
    let manager = manager();
    let template = transactional(TransactionAction::BeginOrJoin, &manager);

    let result = template.execute(succeed);

    assert_eq!(result.unwrap(), RETURN_VALUE);
    assert_eq!(manager.begun().len(), 1);
    let tx = last_begun(&manager);
    assert_eq!(
        manager.journal_for(&tx),
        vec![
            JournalEvent::Begun,
            JournalEvent::TimeoutSet,
            JournalEvent::Committed
        ]
    );
}

// ============================================================================
// Transaction action matrix
// ============================================================================

#[test]
fn test_action_indifferent() {
    let manager = manager();
    let template = transactional(TransactionAction::Indifferent, &manager);
    let mut ctx = ExecutionContext::new();

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);
    assert!(ctx.transaction().is_none());
    assert!(manager.journal().is_empty());
}

#[test]
fn test_action_never_without_transaction() {
    let manager = manager();
    let template = transactional(TransactionAction::Never, &manager);

    assert_eq!(template.execute(succeed).unwrap(), RETURN_VALUE);
    assert!(manager.begun().is_empty());
}

#[test]
fn test_action_never_with_transaction() {
    let manager = manager();
    let ambient = manager.create(false);
    let template = transactional(TransactionAction::Never, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    let err = template.execute_in(&mut ctx, succeed).unwrap_err();

    assert!(err.is_illegal_state());
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
    assert_eq!(manager.journal_for(ambient.id()), vec![JournalEvent::Begun]);
}

#[test]
fn test_action_none_without_transaction() {
    let manager = manager();
    let template = transactional(TransactionAction::None, &manager);

    assert_eq!(template.execute(succeed).unwrap(), RETURN_VALUE);
    assert!(manager.begun().is_empty());
}

#[test]
fn test_action_none_leaves_local_transaction_alone() {
    let manager = manager();
    let ambient = manager.create(false);
    let template = transactional(TransactionAction::None, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 0);
}

#[test]
fn test_action_none_resolves_previous_transaction_by_commit() {
    let manager = manager();
    let ambient = manager.create(false);
    let template = compatibility(TransactionAction::None, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 1);
    assert_eq!(manager.count(ambient.id(), JournalEvent::RolledBack), 0);
    assert!(ctx.transaction().is_none());
}

#[test]
fn test_action_none_resolves_previous_transaction_by_rollback() {
    let manager = manager();
    let ambient = manager.create(false);
    ambient.set_rollback_only();
    let template = compatibility(TransactionAction::None, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    assert_eq!(manager.count(ambient.id(), JournalEvent::RolledBack), 1);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 0);
}

#[test]
fn test_action_none_suspends_xa_transaction() {
    let manager = manager();
    let ambient = manager.create(true);
    let template = transactional(TransactionAction::None, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    let observer =
        ExecutionTemplate::<bool>::transactional(config(TransactionAction::None, &manager));
    let saw_transaction = observer
        .execute_in(&mut ctx, |ctx| Ok(ctx.transaction().is_some()))
        .unwrap();
    assert!(!saw_transaction);

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Suspended), 2);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Resumed), 2);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 0);
    assert_eq!(manager.count(ambient.id(), JournalEvent::RolledBack), 0);
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
}

#[test]
fn test_action_none_with_external_transaction_and_no_transaction() {
    let manager = manager();
    let external = manager.offer_external(true);
    let template = ExecutionTemplate::transactional(
        config(TransactionAction::None, &manager).interacting_with_external(true),
    );
    let mut ctx = ExecutionContext::new();

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    assert_eq!(
        manager.journal_for(external.id()),
        vec![
            JournalEvent::Begun,
            JournalEvent::Joined,
            JournalEvent::Suspended,
            JournalEvent::Resumed
        ]
    );
    assert!(ctx.transaction().is_none());
}

#[test]
fn test_action_none_with_external_transaction_and_transaction() {
    let manager = manager();
    let ambient = manager.create(false);
    let external = manager.offer_external(true);
    let template = ExecutionTemplate::transactional_with_mode(
        config(TransactionAction::None, &manager).interacting_with_external(true),
        TemplateMode::Compatibility,
    );
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 1);
    assert_eq!(manager.count(external.id(), JournalEvent::Joined), 0);
    assert!(ctx.transaction().is_none());
}

#[test]
fn test_action_always_begin_without_transaction() {
    let manager = manager();
    let template = transactional(TransactionAction::AlwaysBegin, &manager);
    let mut ctx = ExecutionContext::new();

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    let tx = last_begun(&manager);
    assert_eq!(manager.count(&tx, JournalEvent::Committed), 1);
    assert_eq!(manager.count(&tx, JournalEvent::RolledBack), 0);
    assert!(ctx.transaction().is_none());
}

#[test]
fn test_action_always_begin_commits_previous_and_new_transaction() {
    let manager = manager();
    let ambient = manager.create(false);
    let template = compatibility(TransactionAction::AlwaysBegin, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    let new_tx = last_begun(&manager);
    assert_ne!(new_tx, ambient.id());
    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 1);
    assert_eq!(manager.count(&new_tx, JournalEvent::Committed), 1);
    assert_eq!(manager.count(ambient.id(), JournalEvent::RolledBack), 0);
    assert_eq!(manager.count(&new_tx, JournalEvent::RolledBack), 0);
    assert!(ctx.transaction().is_none());
}

#[test]
fn test_action_always_begin_rolls_back_previous_and_commits_new_transaction() {
    let manager = manager();
    let ambient = manager.create(false);
    ambient.set_rollback_only();
    let template = compatibility(TransactionAction::AlwaysBegin, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    let new_tx = last_begun(&manager);
    assert_eq!(manager.count(ambient.id(), JournalEvent::RolledBack), 1);
    assert_eq!(manager.count(&new_tx, JournalEvent::Committed), 1);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 0);
    assert_eq!(manager.count(&new_tx, JournalEvent::RolledBack), 0);
}

#[test]
fn test_action_always_begin_rolls_back_previous_and_new_transaction() {
    let manager = manager();
    let ambient = manager.create(false);
    ambient.set_rollback_only();
    let template = compatibility(TransactionAction::AlwaysBegin, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(
        template.execute_in(&mut ctx, mark_rollback_only).unwrap(),
        RETURN_VALUE
    );

    let new_tx = last_begun(&manager);
    assert_eq!(manager.count(ambient.id(), JournalEvent::RolledBack), 1);
    assert_eq!(manager.count(&new_tx, JournalEvent::RolledBack), 1);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 0);
    assert_eq!(manager.count(&new_tx, JournalEvent::Committed), 0);
    assert!(ctx.transaction().is_none());
}

#[test]
fn test_action_always_begin_rejects_local_transaction_outside_compatibility_mode() {
    let manager = manager();
    let ambient = manager.create(false);
    let template = transactional(TransactionAction::AlwaysBegin, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    let err = template.execute_in(&mut ctx, succeed).unwrap_err();

    assert!(err.is_illegal_state());
    assert_eq!(manager.begun(), vec![ambient.id().to_string()]);
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
}

#[test]
fn test_action_always_begin_suspends_xa_and_commits_new_transaction() {
    let manager = manager();
    let ambient = manager.create(true);
    let template = transactional(TransactionAction::AlwaysBegin, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    let new_tx = last_begun(&manager);
    assert_eq!(manager.count(&new_tx, JournalEvent::Committed), 1);
    assert_eq!(manager.count(&new_tx, JournalEvent::RolledBack), 0);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Suspended), 1);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Resumed), 1);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 0);
    assert_eq!(manager.count(ambient.id(), JournalEvent::RolledBack), 0);
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
}

#[test]
fn test_action_always_begin_suspends_xa_and_rolls_back_new_transaction() {
    let manager = manager();
    let ambient = manager.create(true);
    let template = transactional(TransactionAction::AlwaysBegin, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(
        template.execute_in(&mut ctx, mark_rollback_only).unwrap(),
        RETURN_VALUE
    );

    let new_tx = last_begun(&manager);
    assert_eq!(manager.count(&new_tx, JournalEvent::RolledBack), 1);
    assert_eq!(manager.count(&new_tx, JournalEvent::Committed), 0);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Suspended), 1);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Resumed), 1);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 0);
    assert_eq!(manager.count(ambient.id(), JournalEvent::RolledBack), 0);
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
}

#[test]
fn test_action_always_join_without_transaction() {
    let manager = manager();
    let template = transactional(TransactionAction::AlwaysJoin, &manager);

    let err = template.execute(succeed).unwrap_err();

    assert!(err.is_illegal_state());
    assert!(manager.begun().is_empty());
}

#[test]
fn test_action_always_join_with_transaction() {
    let manager = manager();
    let ambient = manager.create(false);
    let template = transactional(TransactionAction::AlwaysJoin, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 0);
    assert_eq!(manager.count(ambient.id(), JournalEvent::RolledBack), 0);
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
}

#[test]
fn test_action_begin_or_join_with_transaction() {
    let manager = manager();
    let ambient = manager.create(false);
    let template = transactional(TransactionAction::BeginOrJoin, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    assert_eq!(manager.begun(), vec![ambient.id().to_string()]);
    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 0);
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
}

#[test]
fn test_action_join_if_possible_without_transaction() {
    let manager = manager();
    let template = transactional(TransactionAction::JoinIfPossible, &manager);
    let mut ctx = ExecutionContext::new();

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    assert!(manager.begun().is_empty());
    assert!(ctx.transaction().is_none());
}

#[test]
fn test_action_join_if_possible_with_transaction() {
    let manager = manager();
    let ambient = manager.create(false);
    let template = transactional(TransactionAction::JoinIfPossible, &manager);
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    let joined = template
        .execute_in(&mut ctx, |ctx| {
            Ok(if ctx.transaction().is_some() {
                "joined"
            } else {
                "alone"
            })
        })
        .unwrap();

    assert_eq!(joined, "joined");
    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 0);
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
}

#[test]
fn test_action_not_supported_isolates_transaction() {
    let manager = manager();
    let ambient = manager.create(false);
    let template =
        ExecutionTemplate::<bool>::transactional(config(TransactionAction::NotSupported, &manager));
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    let saw_transaction = template
        .execute_in(&mut ctx, |ctx| Ok(ctx.transaction().is_some()))
        .unwrap();
    assert!(!saw_transaction);
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));

    let err = template
        .execute_in(&mut ctx, |_| -> Result<bool, ExecutionError> {
            Err(ExecutionError::callback(Fail("isolated".to_string())))
        })
        .unwrap_err();
    assert!(err.callback_error::<Fail>().is_some());
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
    assert_eq!(manager.journal_for(ambient.id()), vec![JournalEvent::Begun]);
}

// ============================================================================
// Transactional template edge cases
// ============================================================================

#[test]
fn test_marked_rollback_only_transaction_is_rolled_back_on_success() {
    let manager = manager();
    let template = transactional(TransactionAction::BeginOrJoin, &manager);

    assert_eq!(template.execute(mark_rollback_only).unwrap(), RETURN_VALUE);

    let tx = last_begun(&manager);
    assert_eq!(manager.count(&tx, JournalEvent::RolledBack), 1);
    assert_eq!(manager.count(&tx, JournalEvent::Committed), 0);
}

#[test]
fn test_standard_mode_fails_timed_out_transaction() {
    let manager = manager();
    let template = ExecutionTemplate::transactional(
        config(TransactionAction::AlwaysBegin, &manager).with_timeout(Duration::from_millis(1)),
    );

    let err = template
        .execute(|_| {
            thread::sleep(Duration::from_millis(20));
            Ok(RETURN_VALUE)
        })
        .unwrap_err();

    let tx = last_begun(&manager);
    assert!(matches!(
        err,
        ExecutionError::Transaction(TransactionError::Timeout(ref id)) if *id == tx
    ));
    assert_eq!(manager.count(&tx, JournalEvent::RolledBack), 1);
    assert_eq!(manager.count(&tx, JournalEvent::Committed), 0);
}

#[test]
fn test_scope_mode_commits_timed_out_transaction() {
    let manager = manager();
    let template = ExecutionTemplate::transactional_with_mode(
        config(TransactionAction::AlwaysBegin, &manager).with_timeout(Duration::from_millis(1)),
        TemplateMode::Scope,
    );

    let result = template.execute(|_| {
        thread::sleep(Duration::from_millis(20));
        Ok(RETURN_VALUE)
    });

    assert_eq!(result.unwrap(), RETURN_VALUE);
    assert_eq!(manager.count(&last_begun(&manager), JournalEvent::Committed), 1);
}

#[test]
fn test_default_timeout_applies_when_config_has_none() {
    let manager = manager();
    let template = ExecutionTemplate::transactional_with_timeout(
        config(TransactionAction::AlwaysBegin, &manager),
        TemplateMode::Standard,
        Duration::from_millis(1234),
    );

    template.execute(succeed).unwrap();

    let entry = manager
        .journal()
        .into_iter()
        .find(|entry| entry.event == JournalEvent::TimeoutSet)
        .unwrap();
    assert_eq!(entry.detail.as_deref(), Some("1234ms"));
}

#[test]
fn test_begin_without_factory_is_illegal_state() {
    let template = ExecutionTemplate::<&'static str>::transactional(TransactionConfig::new(
        TransactionAction::AlwaysBegin,
    ));

    let err = template.execute(succeed).unwrap_err();

    assert!(err.is_illegal_state());
    assert!(err.to_string().contains("transaction factory"));
}

#[test]
fn test_begin_failure_propagates() {
    let manager = Arc::new(InMemoryTransactionManager::new().failing_begin());
    let template = transactional(TransactionAction::AlwaysBegin, &manager);

    let err = template.execute(succeed).unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::Transaction(TransactionError::Begin(_))
    ));
}

#[test]
fn test_commit_failure_propagates() {
    let manager = Arc::new(InMemoryTransactionManager::new().failing_commit());
    let template = transactional(TransactionAction::AlwaysBegin, &manager);

    let err = template.execute(succeed).unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::Transaction(TransactionError::Commit { .. })
    ));
}

#[test]
fn test_failed_rollback_keeps_original_failure() {
    let manager = manager();
    let template = transactional(TransactionAction::BeginOrJoin, &manager);

    let err = template
        .execute(|ctx| {
            ctx.transaction().unwrap().rollback().unwrap();
            Err(ExecutionError::callback(Fail("original".to_string())))
        })
        .unwrap_err();

    assert_eq!(
        err.callback_error::<Fail>(),
        Some(&Fail("original".to_string()))
    );
    let tx = last_begun(&manager);
    assert_eq!(manager.count(&tx, JournalEvent::RolledBack), 1);
    assert_eq!(manager.count(&tx, JournalEvent::Failed), 1);
}

#[test]
fn test_interrupted_lock_inside_callback_rolls_back() {
    let manager = manager();
    let group = LockGroup::with_timeout(Duration::from_millis(100));
    let interrupter = Interrupter::new();
    interrupter.interrupt();
    let template = transactional(TransactionAction::AlwaysBegin, &manager);

    let err = template
        .execute(|_| {
            group.lock_interruptibly("orders", &interrupter)?;
            Ok(RETURN_VALUE)
        })
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Interrupted));
    assert_eq!(manager.count(&last_begun(&manager), JournalEvent::RolledBack), 1);
    assert!(!group.is_tracked("orders"));
}

#[test]
fn test_transaction_left_bound_by_callback_is_rolled_back() {
    let manager = manager();
    let template = transactional(TransactionAction::Indifferent, &manager);
    let stray = manager.create(false);

    let stray_ref: Arc<dyn Transaction> = stray.clone();
    let result = template.execute(move |ctx| {
        ctx.bind(stray_ref)?;
        Ok(RETURN_VALUE)
    });

    assert_eq!(result.unwrap(), RETURN_VALUE);
    assert_eq!(manager.count(stray.id(), JournalEvent::RolledBack), 1);
}

#[test]
fn test_template_is_shared_across_threads() {
    let manager = manager();
    let template = Arc::new(transactional(TransactionAction::BeginOrJoin, &manager));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let template = Arc::clone(&template);
            thread::spawn(move || template.execute(succeed))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), RETURN_VALUE);
    }

    let begun = manager.begun();
    assert_eq!(begun.len(), 8);
    for tx in &begun {
        assert_eq!(manager.count(tx, JournalEvent::Committed), 1);
    }
}

#[test]
fn test_template_from_config() {
    let manager = manager();
    let yaml = r#"
default_transaction_timeout_ms: 900
transaction:
  action: always_begin
  mode: compatibility
  interact_with_external: true
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let factory: Arc<dyn TransactionFactory> = manager.clone();
    let template = ExecutionTemplate::<&'static str>::from_config(&config, Some(factory));

    assert_eq!(
        template.chain().stage_names(),
        vec![
            "join_external",
            "isolate_current",
            "validate_state",
            "suspend_xa",
            "resolve_previous",
            "begin_and_resolve"
        ]
    );
    assert_eq!(template.execute(succeed).unwrap(), RETURN_VALUE);
    let begun = last_begun(&manager);
    assert_eq!(manager.count(&begun, JournalEvent::Committed), 1);
    assert_eq!(timeout_detail(&manager, &begun).as_deref(), Some("900ms"));
}

#[test]
fn test_template_from_config_prefers_transaction_timeout() {
    let manager = manager();
    let yaml = r#"
default_transaction_timeout_ms: 900
transaction:
  action: always_begin
  timeout_ms: 400
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let factory: Arc<dyn TransactionFactory> = manager.clone();
    let template = ExecutionTemplate::<&'static str>::from_config(&config, Some(factory));

    assert_eq!(template.execute(succeed).unwrap(), RETURN_VALUE);
    let begun = last_begun(&manager);
    assert_eq!(timeout_detail(&manager, &begun).as_deref(), Some("400ms"));
}

#[test]
fn test_transactional_chain_order() {
    let manager = manager();
    let template = transactional(TransactionAction::BeginOrJoin, &manager);

    assert_eq!(
        template.chain().stage_names(),
        vec![
            "isolate_current",
            "validate_state",
            "suspend_xa",
            "begin_and_resolve"
        ]
    );
}

// ============================================================================
// Error-handling template
// ============================================================================

#[test]
fn test_error_handling_chain_order() {
    let template = ExecutionTemplate::<&'static str>::error_handling().build();

    assert_eq!(
        template.chain().stage_names(),
        vec![
            "rethrow",
            "suspend_xa",
            "begin_and_resolve",
            "begin_and_resolve",
            "handle_exception",
            "commit_transaction"
        ]
    );
}

#[test]
fn test_error_handling_without_handler_propagates() {
    let template = ExecutionTemplate::<&'static str>::error_handling().build();

    let err = template.execute(fail).unwrap_err();

    assert_eq!(err.callback_error::<Fail>(), Some(&Fail("x".to_string())));
}

#[test]
fn test_error_handling_handler_can_decline() {
    struct OnlyIllegalState;

    impl ExceptionHandler<&'static str> for OnlyIllegalState {
        fn accepts(&self, error: &ExecutionError) -> bool {
            error.is_illegal_state()
        }

        fn handle(
            &self,
            _: &ExecutionError,
            _: &mut ExecutionContext,
        ) -> HandlerOutcome<&'static str> {
            HandlerOutcome::Handled("handled")
        }
    }

    let template = ExecutionTemplate::error_handling()
        .with_handler(OnlyIllegalState)
        .build();

    assert!(template.execute(fail).is_err());
    assert_eq!(
        template
            .execute(|_| Err(ExecutionError::IllegalTransactionState("x".to_string())))
            .unwrap(),
        "handled"
    );
}

#[test]
fn test_error_handling_handler_can_replace_failure() {
    let template = ExecutionTemplate::<&'static str>::error_handling()
        .with_handler(|_: &ExecutionError, _: &mut ExecutionContext| {
            HandlerOutcome::Replace(ExecutionError::Interrupted)
        })
        .build();

    assert!(matches!(
        template.execute(fail),
        Err(ExecutionError::Interrupted)
    ));
}

#[test]
fn test_error_handling_handler_sees_component_and_event() {
    let template = ExecutionTemplate::<String>::error_handling()
        .with_handler(|error: &ExecutionError, ctx: &mut ExecutionContext| {
            HandlerOutcome::Handled(format!(
                "{} in {} for event {}",
                error,
                ctx.component().unwrap_or("?"),
                ctx.event::<u32>().copied().unwrap_or_default()
            ))
        })
        .build();
    let mut ctx = ExecutionContext::new()
        .with_component("orders-flow")
        .with_event(42u32);

    let result = template.execute_in(&mut ctx, |_| {
        Err(ExecutionError::callback(Fail("x".to_string())))
    });

    assert_eq!(result.unwrap(), "fail: x in orders-flow for event 42");
}

#[test]
fn test_error_handling_commits_begun_transaction_once() {
    let manager = manager();
    let template = ExecutionTemplate::<&'static str>::error_handling()
        .with_transaction_config(config(TransactionAction::AlwaysBegin, &manager))
        .build();

    assert_eq!(template.execute(succeed).unwrap(), RETURN_VALUE);

    let tx = last_begun(&manager);
    assert_eq!(manager.count(&tx, JournalEvent::Committed), 1);
    assert_eq!(manager.count(&tx, JournalEvent::Failed), 0);
}

#[test]
fn test_error_handling_rolls_back_begun_transaction_when_handled() {
    let manager = manager();
    let template = ExecutionTemplate::<&'static str>::error_handling()
        .with_transaction_config(config(TransactionAction::AlwaysBegin, &manager))
        .with_handler(|_: &ExecutionError, _: &mut ExecutionContext| {
            HandlerOutcome::Handled("handled")
        })
        .build();

    assert_eq!(template.execute(fail).unwrap(), "handled");

    let tx = last_begun(&manager);
    assert_eq!(manager.count(&tx, JournalEvent::RolledBack), 1);
    assert_eq!(manager.count(&tx, JournalEvent::Committed), 0);
}

#[test]
fn test_error_handling_resolves_ambient_transaction() {
    let manager = manager();
    let ambient = manager.create(false);
    let template = ExecutionTemplate::<&'static str>::error_handling().build();
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, succeed).unwrap(), RETURN_VALUE);

    assert_eq!(manager.count(ambient.id(), JournalEvent::Committed), 1);
    assert!(ctx.transaction().is_none());
}

#[test]
fn test_error_handling_keeps_ambient_transaction_on_handled_failure() {
    let manager = manager();
    let ambient = manager.create(false);
    let template = ExecutionTemplate::<&'static str>::error_handling()
        .with_handler(|_: &ExecutionError, _: &mut ExecutionContext| {
            HandlerOutcome::Handled("handled")
        })
        .build();
    let mut ctx = ExecutionContext::new().with_transaction(ambient.clone());

    assert_eq!(template.execute_in(&mut ctx, fail).unwrap(), "handled");

    assert_eq!(manager.journal_for(ambient.id()), vec![JournalEvent::Begun]);
    assert_eq!(bound_id(&ctx).as_deref(), Some(ambient.id()));
}

// ============================================================================
// Chains and invocation results
// ============================================================================

#[test]
fn test_custom_chain_from_builder() {
    let handler: Arc<dyn ExceptionHandler<i32>> =
        Arc::new(|_: &ExecutionError, _: &mut ExecutionContext| HandlerOutcome::Handled(-1i32));
    let chain = InterceptorChain::<i32>::builder()
        .stage(Interceptor::Rethrow)
        .stage_if(false, || Interceptor::CommitTransaction)
        .stage(Interceptor::HandleException(Some(handler)))
        .build();
    let mut ctx = ExecutionContext::new();

    assert_eq!(chain.stage_names(), vec!["rethrow", "handle_exception"]);
    assert_eq!(chain.execute(&mut ctx, |_| Ok(7)).unwrap(), 7);
    assert_eq!(
        chain
            .execute(&mut ctx, |_| Err(ExecutionError::Interrupted))
            .unwrap(),
        -1
    );
}

#[test]
fn test_handled_failure_without_rethrow_surfaces_cause() {
    let handler: Arc<dyn ExceptionHandler<i32>> =
        Arc::new(|_: &ExecutionError, _: &mut ExecutionContext| HandlerOutcome::Handled(-1i32));
    let chain = InterceptorChain::<i32>::builder()
        .stage(Interceptor::HandleException(Some(handler)))
        .build();
    let mut ctx = ExecutionContext::new();

    let failure = chain
        .execute(&mut ctx, |_| Err(ExecutionError::Interrupted))
        .unwrap_err();

    assert!(failure.is_handled());
    assert!(matches!(failure.error(), ExecutionError::Interrupted));
    assert!(matches!(failure.into_error(), ExecutionError::Interrupted));
}

#[test]
fn test_invoke_maps_outcomes() {
    let manager = manager();

    let successful = transactional(TransactionAction::BeginOrJoin, &manager).invoke(succeed);
    assert_eq!(successful.status(), InvocationStatus::Successful);
    assert_eq!(successful.payload(), Some(&RETURN_VALUE));
    assert_eq!(successful.error_message(), None);

    let not_supported = transactional(TransactionAction::AlwaysJoin, &manager).invoke(succeed);
    assert_eq!(not_supported.status(), InvocationStatus::NotSupported);
    assert_eq!(not_supported.payload(), None);
    assert!(not_supported
        .error_message()
        .unwrap()
        .contains("requires a bound transaction"));

    let failed = transactional(TransactionAction::BeginOrJoin, &manager).invoke(fail);
    assert_eq!(failed.status(), InvocationStatus::Failed);
    assert_eq!(failed.error_message(), Some("fail: x"));
    assert_eq!(failed.into_payload(), None);
}

#[test]
fn test_error_message_cannot_be_set_on_successful_result() {
    let mut successful = InvocationResult::successful(1);
    let err = successful.set_error_message("nope").unwrap_err();
    assert!(matches!(err, InterlockError::Usage(_)));
    assert_eq!(successful.error_message(), None);

    let mut failed = InvocationResult::<i32>::failed("first");
    failed.set_error_message("second").unwrap();
    assert_eq!(failed.error_message(), Some("second"));

    let mut not_supported = InvocationResult::<i32>::not_supported();
    not_supported.set_error_message("refused").unwrap();
    assert_eq!(not_supported.error_message(), Some("refused"));
}

#[test]
fn test_invocation_result_serializes() {
    let json = serde_json::to_value(InvocationResult::successful("ok")).unwrap();
    assert_eq!(json["status"], "successful");
    assert_eq!(json["payload"], "ok");
    assert!(json.get("error_message").is_none());
}

#[test]
fn test_invocation_status_names_match_serialized_form() {
    for status in [
        InvocationStatus::NotSupported,
        InvocationStatus::Successful,
        InvocationStatus::Failed,
    ] {
        assert_eq!(serde_json::to_value(status).unwrap(), status.as_str());
    }
    assert_eq!(InvocationStatus::NotSupported.as_str(), "not_supported");
}

#[test]
fn test_lock_errors_convert_for_callbacks() {
    let template = ExecutionTemplate::<&'static str>::error_handling().build();

    let err = template
        .execute(|_| Err(LockError::NotOwner("orders".to_string()).into()))
        .unwrap_err();

    assert_eq!(
        err.callback_error::<LockError>(),
        Some(&LockError::NotOwner("orders".to_string()))
    );
}
