//! Shadow testing through the async dispatcher
//!
//! Routes with a mock shadow executor attached and checks that the shadow
//! side runs in the background, pairs up with reported production results,
//! and that failures, expiry and retention behave.


use agent_router::config::RouterConfig;
use agent_router::observability::metrics::RouterMetrics;
use agent_router::routing::{Router, RoutingRequest};
use agent_router::shadow::{ShadowCoordinator, ShadowTestStatus};
use agent_router::testing::{agent, test_router_config, MockShadowExecutor};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::wait_for;

fn shadow_router(config: &RouterConfig, executor: Arc<MockShadowExecutor>) -> Router {
    let router = Router::from_config(config)
        .unwrap()
        .with_shadow_executor(executor);
    router.register_agent(agent("prod", "chat")).unwrap();
    router
        .register_agent(agent("canary", "chat").as_shadow())
        .unwrap();
    router
}

#[tokio::test]
async fn test_shadow_runs_in_background_and_pairs_with_production() {
    let executor = Arc::new(MockShadowExecutor::fixed(
        json!({"answer": 42, "meta": {"model": "m1", "tokens": 7}}),
    ));
    let router = shadow_router(&test_router_config(true), executor.clone());

    let decision = router
        .route(&RoutingRequest::new("chat").with_payload(json!({"q": "meaning"})))
        .unwrap();
    assert_eq!(decision.agent_id, "prod");
    let test_id = decision.shadow_test_id.clone().unwrap();

    assert!(wait_for(Duration::from_secs(2), || executor.call_count() == 1).await);
    let (shadow_agent, request) = executor.calls().remove(0);
    assert_eq!(shadow_agent, "canary");
    assert_eq!(request["q"], json!("meaning"));
    assert_eq!(request["_shadow_test"], json!(true));
    assert_eq!(request["_production_agent"], json!("prod"));
    assert_eq!(request["_shadow_test_id"], json!(test_id));

    // shadow side is in; the record waits for production
    assert!(
        wait_for(Duration::from_secs(2), || {
            router
                .shadow_test(&test_id)
                .is_some_and(|r| r.shadow_result.is_some())
        })
        .await
    );
    assert_eq!(
        router.shadow_test(&test_id).unwrap().status,
        ShadowTestStatus::Pending
    );

    let matched = router.record_production_result(
        &test_id,
        json!({"meta": {"tokens": 7, "model": "m1"}, "answer": 42}),
    );
    assert_eq!(matched, Some(true));

    let record = router.shadow_test(&test_id).unwrap();
    assert_eq!(record.status, ShadowTestStatus::Completed);
    assert_eq!(record.matched, Some(true));
    assert_eq!(record.shadow_hash, record.production_hash);

    router.shutdown().await;
}

#[tokio::test]
async fn test_production_first_then_shadow_detects_mismatch() {
    let executor = Arc::new(
        MockShadowExecutor::fixed(json!({"answer": "draft"}))
            .with_delay(Duration::from_millis(50)),
    );
    let router = shadow_router(&test_router_config(true), executor.clone());

    let test_id = router
        .route(&RoutingRequest::new("chat"))
        .unwrap()
        .shadow_test_id
        .unwrap();

    // production reported before the shadow finishes
    assert_eq!(
        router.record_production_result(&test_id, json!({"answer": "final"})),
        None
    );

    assert!(
        wait_for(Duration::from_secs(3), || {
            router
                .shadow_test(&test_id)
                .is_some_and(|r| r.status == ShadowTestStatus::Completed)
        })
        .await
    );

    let record = router.shadow_test(&test_id).unwrap();
    assert_eq!(record.matched, Some(false));
    assert_ne!(record.shadow_hash, record.production_hash);

    let summary = router.shadow_summary();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.mismatched, 1);
    assert_eq!(summary.match_rate, Some(0.0));

    router.shutdown().await;
}

#[tokio::test]
async fn test_failing_shadow_marks_record_failed() {
    let executor = Arc::new(MockShadowExecutor::failing("model not loaded"));
    let router = shadow_router(&test_router_config(true), executor.clone());

    let decision = router.route(&RoutingRequest::new("chat")).unwrap();
    let test_id = decision.shadow_test_id.unwrap();

    assert!(
        wait_for(Duration::from_secs(2), || {
            router
                .shadow_test(&test_id)
                .is_some_and(|r| r.status == ShadowTestStatus::Failed)
        })
        .await
    );

    let record = router.shadow_test(&test_id).unwrap();
    assert!(record.failure.unwrap().contains("model not loaded"));

    // a late production report does not revive a failed test
    assert_eq!(router.record_production_result(&test_id, json!({})), None);
    assert_eq!(
        router.shadow_test(&test_id).unwrap().status,
        ShadowTestStatus::Failed
    );

    let metrics = router.metrics();
    assert_eq!(metrics.shadow.failed, 1);

    router.shutdown().await;
}

#[tokio::test]
async fn test_shadow_failure_never_affects_production_routing() {
    let executor = Arc::new(MockShadowExecutor::failing("boom"));
    let router = shadow_router(&test_router_config(true), executor.clone());

    for _ in 0..20 {
        let decision = router.route(&RoutingRequest::new("chat")).unwrap();
        assert_eq!(decision.agent_id, "prod");
        assert!(decision.shadow_test_id.is_some());
    }

    router.shutdown().await;
    assert_eq!(executor.call_count(), 20);
    assert_eq!(router.shadow_summary().failed, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_routes_each_get_one_shadow_test() {
    let executor = Arc::new(MockShadowExecutor::echo());
    let router = Arc::new(shadow_router(&test_router_config(true), executor.clone()));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router
                    .route(&RoutingRequest::new("chat").with_payload(json!({"n": i})))
                    .map(|d| d.shadow_test_id)
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let test_ids: std::collections::HashSet<String> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap().unwrap())
        .collect();
    assert_eq!(test_ids.len(), 16);

    assert!(wait_for(Duration::from_secs(2), || executor.call_count() == 16).await);
    assert_eq!(router.shadow_tests().len(), 16);

    router.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drains_queued_shadow_work() {
    let executor = Arc::new(
        MockShadowExecutor::echo().with_delay(Duration::from_millis(20)),
    );
    let router = shadow_router(&test_router_config(true), executor.clone());

    for i in 0..10 {
        router
            .route(&RoutingRequest::new("chat").with_payload(json!({"n": i})))
            .unwrap();
    }
    router.shutdown().await;

    assert_eq!(executor.call_count(), 10);
    assert!(router
        .shadow_tests()
        .iter()
        .all(|r| r.shadow_result.is_some()));

    // routing still works after shutdown; new shadow work is marked failed
    let decision = router.route(&RoutingRequest::new("chat")).unwrap();
    let record = router
        .shadow_test(&decision.shadow_test_id.unwrap())
        .unwrap();
    assert_eq!(record.status, ShadowTestStatus::Failed);
}

#[tokio::test]
async fn test_retention_keeps_most_recent_records() {
    let mut config = test_router_config(true);
    config.shadow.max_records = 5;
    let executor = Arc::new(MockShadowExecutor::echo());
    let router = shadow_router(&config, executor);

    let ids: Vec<String> = (0..12)
        .map(|_| {
            router
                .route(&RoutingRequest::new("chat"))
                .unwrap()
                .shadow_test_id
                .unwrap()
        })
        .collect();

    let retained: Vec<String> = router
        .shadow_tests()
        .into_iter()
        .map(|r| r.test_id)
        .collect();
    assert_eq!(retained, ids[7..].to_vec());
    assert!(router.shadow_test(&ids[0]).is_none());

    router.shutdown().await;
    assert_eq!(router.metrics().shadow.evicted, 7);
}

#[test]
fn test_stale_pending_tests_expire() {
    let coordinator = ShadowCoordinator::new(
        100,
        Duration::from_secs(300),
        Arc::new(RouterMetrics::new()),
    );
    let opened_at = Utc::now();

    let stale = coordinator.open_at("canary", "prod", "chat", &json!({}), opened_at);
    let fresh = coordinator.open_at(
        "canary",
        "prod",
        "chat",
        &json!({}),
        opened_at + ChronoDuration::seconds(200),
    );

    assert_eq!(
        coordinator.expire_stale_at(opened_at + ChronoDuration::seconds(301)),
        1
    );
    assert_eq!(
        coordinator.get(&stale.test_id).unwrap().status,
        ShadowTestStatus::Expired
    );
    assert_eq!(
        coordinator.get(&fresh.test_id).unwrap().status,
        ShadowTestStatus::Pending
    );

    // an explicit full report still settles an expired test
    assert_eq!(
        coordinator.record_shadow_result(&stale.test_id, json!([1, 2]), json!([1, 2])),
        Some(true)
    );
    assert_eq!(
        coordinator.get(&stale.test_id).unwrap().status,
        ShadowTestStatus::Completed
    );
}

#[test]
fn test_no_shadow_without_healthy_shadow_agent() {
    use agent_router::health::HealthStatus;

    let router = Router::from_config(&test_router_config(true)).unwrap();
    router.register_agent(agent("prod", "chat")).unwrap();
    router
        .register_agent(agent("canary", "chat").as_shadow())
        .unwrap();
    router.update_health("canary", HealthStatus::Unhealthy, 0, Some("down"));

    let decision = router.route(&RoutingRequest::new("chat")).unwrap();
    assert_eq!(decision.agent_id, "prod");
    assert!(decision.shadow_test_id.is_none());
    assert!(router.shadow_tests().is_empty());
    assert_eq!(router.metrics().shadow.skipped, 1);
}

#[test]
fn test_shadow_disabled_creates_no_records() {
    let router = Router::from_config(&test_router_config(false)).unwrap();
    router.register_agent(agent("prod", "chat")).unwrap();
    router
        .register_agent(agent("canary", "chat").as_shadow())
        .unwrap();

    let decision = router.route(&RoutingRequest::new("chat")).unwrap();
    assert!(decision.shadow_test_id.is_none());
    assert!(router.shadow_tests().is_empty());
}
