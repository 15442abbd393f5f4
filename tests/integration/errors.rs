//! Error propagation: execution failures, short-circuits, missing tokens,
//! cycles, and dropped completions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use deferred_helpers::error::HelperError;
use serde_json::json;

use crate::common;

/// A sync helper's error surfaces with the helper's name and message.
#[tokio::test]
async fn test_sync_failure_carries_context() -> Result<()> {
    common::init_test_logging();
    let engine = common::pinned_engine();
    engine.register_sync("boomer", |_| anyhow::bail!("boom"))?;

    let tok = engine.wrap("boomer")?.call(&[json!("x")]);
    let err = engine.resolve_token(&tok).await.unwrap_err();

    assert!(matches!(err, HelperError::Execution { .. }));
    let msg = err.to_string();
    assert!(msg.contains("boomer"), "missing helper name: {msg}");
    assert!(msg.contains("boom"), "missing cause: {msg}");
    assert!(msg.contains("\"x\""), "missing args: {msg}");
    Ok(())
}

/// An async helper rejecting through its completion fails the same way.
#[tokio::test]
async fn test_async_rejection_carries_context() -> Result<()> {
    common::init_test_logging();
    let engine = common::pinned_engine();
    engine.register_async("refuser", |_, done| {
        done.reject(anyhow::anyhow!("no thanks"));
    })?;

    let tok = engine.wrap("refuser")?.call(&[]);
    let err = engine.resolve_token(&tok).await.unwrap_err();

    assert!(matches!(err, HelperError::Execution { .. }));
    assert!(err.to_string().contains("no thanks"));
    Ok(())
}

/// A dependent of a failed call never runs and reports the identical error.
#[tokio::test]
async fn test_dependency_failure_short_circuits() -> Result<()> {
    common::init_test_logging();
    let engine = common::pinned_engine();
    engine.register_sync("boomer", |_| anyhow::bail!("boom"))?;

    let dependent_calls = Arc::new(AtomicUsize::new(0));
    let seen = dependent_calls.clone();
    engine.register_sync("dependent", move |args| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(args.first().cloned().unwrap_or(json!(null)))
    })?;

    let failing = engine.wrap("boomer")?.call(&[json!("x")]);
    let blocked = engine.wrap("dependent")?.call(&[json!(failing.clone())]);

    let direct = engine.resolve_token(&failing).await.unwrap_err();
    let through = engine.resolve_token(&blocked).await.unwrap_err();

    assert_eq!(direct, through);
    assert_eq!(dependent_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

/// The failure also aborts resolve_all with the original error.
#[tokio::test]
async fn test_resolve_all_aborts_on_failure() -> Result<()> {
    common::init_test_logging();
    let engine = common::pinned_engine();
    engine.register_sync("boomer", |_| anyhow::bail!("boom"))?;
    engine.register_sync("fine", |_| Ok(json!("ok")))?;

    let bad = engine.wrap("boomer")?.call(&[]);
    let good = engine.wrap("fine")?.call(&[]);

    let err = engine.resolve_all(&format!("{bad} {good}")).await.unwrap_err();
    assert!(matches!(err, HelperError::Execution { .. }));
    Ok(())
}

/// Tokens that were never minted resolve to NotFound.
#[tokio::test]
async fn test_unknown_token_is_not_found() {
    common::init_test_logging();
    let engine = common::pinned_engine();

    let err = engine.resolve_token("__async0_0__").await.unwrap_err();
    assert!(matches!(err, HelperError::NotFound { .. }));
}

/// Tokens minted by one instance are unknown to another.
#[tokio::test]
async fn test_cross_instance_resolution_fails() -> Result<()> {
    common::init_test_logging();
    let (a, b) = common::pinned_engine_pair();
    a.register_sync("upper", |args| {
        let s = args.first().and_then(|v| v.as_str()).unwrap_or_default();
        Ok(json!(s.to_uppercase()))
    })?;

    let foreign = a.wrap("upper")?.call(&[json!("x")]);
    assert!(!b.stash().contains(&foreign));

    let err = b.resolve_token(&foreign).await.unwrap_err();
    assert!(matches!(err, HelperError::NotFound { .. }));
    Ok(())
}

/// A helper that resolves to its own token is reported as a cycle instead of
/// recursing forever.
#[tokio::test]
async fn test_self_referential_token_is_a_cycle() -> Result<()> {
    common::init_test_logging();
    let engine = common::pinned_engine();

    let own_token: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let slot = own_token.clone();
    engine.register_sync("selfie", move |_| {
        let tok = slot.lock().unwrap().clone();
        Ok(json!(tok))
    })?;

    let tok = engine.wrap("selfie")?.call(&[]);
    *own_token.lock().unwrap() = tok.clone();

    let err = engine.resolve_token(&tok).await.unwrap_err();
    match err {
        HelperError::CircularDependency { chain, .. } => {
            assert!(chain.contains("selfie"), "chain was {chain}");
        }
        other => panic!("expected cycle error, got {other:?}"),
    }
    Ok(())
}

/// Dropping the completion without delivering fails resolution rather than
/// hanging it.
#[tokio::test]
async fn test_dropped_completion_surfaces() -> Result<()> {
    common::init_test_logging();
    let engine = common::pinned_engine();
    engine.register_async("ghost", |_, done| {
        drop(done);
    })?;

    let tok = engine.wrap("ghost")?.call(&[]);
    let err = engine.resolve_token(&tok).await.unwrap_err();
    assert!(matches!(err, HelperError::CompletionDropped { .. }));
    Ok(())
}

/// Failed records are terminal: re-resolving returns the cached error
/// without re-running the helper.
#[tokio::test]
async fn test_failure_is_memoized() -> Result<()> {
    common::init_test_logging();
    let engine = common::pinned_engine();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    engine.register_sync("boomer", move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("boom")
    })?;

    let tok = engine.wrap("boomer")?.call(&[]);
    let first = engine.resolve_token(&tok).await.unwrap_err();
    let second = engine.resolve_token(&tok).await.unwrap_err();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

/// Registration argument validation is part of the public contract.
#[test]
fn test_invalid_helper_name_is_rejected() {
    common::init_test_logging();
    let engine = common::pinned_engine();

    let err = engine.register_sync("", |_| Ok(json!(0))).unwrap_err();
    assert!(matches!(err, HelperError::InvalidName { .. }));

    let err = engine.register_sync("9lives", |_| Ok(json!(0))).unwrap_err();
    assert!(matches!(err, HelperError::InvalidName { .. }));
}

/// Wrapping an unregistered name fails up front.
#[test]
fn test_wrap_unknown_helper_fails() {
    common::init_test_logging();
    let engine = common::pinned_engine();

    let err = engine.wrap("nobody").unwrap_err();
    assert!(matches!(err, HelperError::UnknownHelper { .. }));
}
