//! Tests for router module

use super::*;
use crate::error::Error;
use std::sync::Arc;
use std::time::Duration;

fn providers() -> (Arc<MockProvider>, Arc<MockProvider>) {
    (
        Arc::new(MockProvider::new().with_name("local")),
        Arc::new(MockProvider::new().with_name("remote")),
    )
}

#[test]
fn test_complexity_recommended_tier() {
    assert_eq!(Complexity::Simple.recommended_tier(), ModelTier::Local);
    assert_eq!(Complexity::Medium.recommended_tier(), ModelTier::Standard);
    assert_eq!(Complexity::Complex.recommended_tier(), ModelTier::Premium);
}

#[test]
fn test_complexity_deserializes_lowercase() {
    let c: Complexity = serde_json::from_str(r#""complex""#).unwrap();
    assert_eq!(c, Complexity::Complex);
    assert_eq!(Complexity::default(), Complexity::Medium);
}

#[test]
fn test_simple_always_local() {
    let (local, remote) = providers();
    let router = ModelRouter::new(RouterConfig::default(), local, Some(remote));

    assert!(router.availability().is_remote());
    let handle = router.select(Complexity::Simple, 0.2);
    assert_eq!(handle.provider_name(), "local");
    assert_eq!(handle.tier, ModelTier::Local);
    assert_eq!(handle.model_name, RouterConfig::default().local_model);
}

#[test]
fn test_medium_and_complex_go_remote() {
    let (local, remote) = providers();
    let config = RouterConfig::default().with_remote_models("std-model", "big-model");
    let router = ModelRouter::new(config, local, Some(remote));

    let medium = router.select(Complexity::Medium, 0.7);
    assert_eq!(medium.provider_name(), "remote");
    assert_eq!(medium.model_name, "std-model");

    let complex = router.select(Complexity::Complex, 0.7);
    assert_eq!(complex.provider_name(), "remote");
    assert_eq!(complex.model_name, "big-model");
    assert_eq!(complex.tier, ModelTier::Premium);
}

#[test]
fn test_fallback_when_credentials_missing() {
    let local = Arc::new(MockProvider::new().with_name("local"));
    let remote = Arc::new(MockProvider::new().with_name("remote").without_credentials());
    let router = ModelRouter::new(RouterConfig::default(), local, Some(remote));

    match router.availability() {
        Availability::LocalFallback { reason } => assert!(reason.contains("missing api key")),
        other => panic!("expected fallback, got {other:?}"),
    }

    let handle = router.select(Complexity::Complex, 0.5);
    assert_eq!(handle.provider_name(), "local");
    assert_eq!(handle.tier, ModelTier::Local);
}

#[test]
fn test_fallback_without_remote() {
    let (local, _) = providers();
    let router = ModelRouter::local_only(RouterConfig::default(), local);
    assert!(!router.availability().is_remote());
    assert_eq!(router.select(Complexity::Medium, 0.5).provider_name(), "local");
}

#[test]
fn test_temperature_passthrough() {
    let (local, remote) = providers();
    let router = ModelRouter::new(RouterConfig::default(), local, Some(remote));
    assert_eq!(router.select(Complexity::Medium, 0.13).temperature, 0.13);
    assert_eq!(router.select(Complexity::Simple, 1.9).temperature, 1.9);
}

#[test]
fn test_selection_is_stable() {
    let (local, remote) = providers();
    let router = ModelRouter::new(RouterConfig::default(), local, Some(remote));

    let a = router.select(Complexity::Medium, 0.3);
    let b = router.select(Complexity::Medium, 0.3);
    assert!(Arc::ptr_eq(a.provider(), b.provider()));
    assert_eq!(a.model_name, b.model_name);
    assert_eq!(a.tier, b.tier);
}

#[test]
fn test_estimate_cost() {
    let (local, remote) = providers();
    let router = ModelRouter::new(RouterConfig::default(), local, Some(remote));

    let usage = TokenUsage::new(1000, 1000);
    assert_eq!(router.select(Complexity::Simple, 0.0).estimate_cost(&usage), 0.0);
    let cost = router.select(Complexity::Complex, 0.0).estimate_cost(&usage);
    assert!((cost - 0.0125).abs() < 1e-9);
}

#[tokio::test]
async fn test_invoke_passes_model_and_temperature() {
    let (local, remote) = providers();
    remote.push_response("done");
    let router = ModelRouter::new(RouterConfig::default(), local, Some(remote.clone()));

    let handle = router.select(Complexity::Medium, 0.4);
    let response = handle
        .invoke(
            vec![Message::system("sys"), Message::user("hi")],
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "done");
    let calls = remote.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].model, "gpt-4o-mini");
    assert_eq!(calls[0].temperature, 0.4);
    assert_eq!(calls[0].system, "sys");
}

struct SlowProvider;

#[async_trait::async_trait]
impl LlmProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    fn default_model(&self) -> &str {
        "slow-model"
    }

    async fn complete(&self, _request: CompletionRequest) -> crate::Result<CompletionResponse> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err(Error::backend("unreachable"))
    }
}

#[tokio::test]
async fn test_invoke_deadline() {
    let router = ModelRouter::local_only(RouterConfig::default(), Arc::new(SlowProvider));
    let handle = router.select(Complexity::Simple, 0.0);

    let err = handle
        .invoke(vec![Message::user("hi")], Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(20)));
    assert!(err.is_transient());
}
