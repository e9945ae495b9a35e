//! Concurrency tests for budget enforcement
//!
//! Many threads route against one shared router. The number of successful
//! decisions per agent must never exceed its request budget.


use agent_router::routing::{Router, RoutingRequest};
use agent_router::testing::{agent, router_with_agents};
use agent_router::RouterError;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const ATTEMPTS_PER_THREAD: usize = 25;

fn hammer(router: Arc<Router>, request: RoutingRequest) -> (usize, usize) {
    let barrier = Arc::new(Barrier::new(THREADS));
    let successes = Arc::new(AtomicUsize::new(0));
    let rejections = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let router = Arc::clone(&router);
            let request = request.clone();
            let barrier = Arc::clone(&barrier);
            let successes = Arc::clone(&successes);
            let rejections = Arc::clone(&rejections);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ATTEMPTS_PER_THREAD {
                    match router.route(&request) {
                        Ok(_) => {
                            successes.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(RouterError::NoAvailableAgent { .. }) => {
                            rejections.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => panic!("unexpected routing error: {e}"),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    (successes.load(Ordering::SeqCst), rejections.load(Ordering::SeqCst))
}

#[test]
fn test_request_budget_never_overspent_under_contention() {
    let router = Arc::new(
        router_with_agents(false, [agent("only", "chat").with_max_requests_per_min(37)]).unwrap(),
    );

    let (successes, rejections) = hammer(Arc::clone(&router), RoutingRequest::new("chat"));

    assert_eq!(successes, 37);
    assert_eq!(rejections, THREADS * ATTEMPTS_PER_THREAD - 37);

    let stats = router.get_agent_stats("only").unwrap();
    assert_eq!(stats.current_load.requests_per_min, 37);
}

#[test]
fn test_token_budget_never_overspent_under_contention() {
    // canonical payload is 40 chars, 10 tokens at 4 chars per token
    let payload = json!({"prompt": "abcdefghijklmnopqrstuvwxyz0"});
    assert_eq!(serde_json::to_string(&payload).unwrap().len(), 40);

    let router = Arc::new(
        router_with_agents(false, [agent("tokens", "chat").with_max_tokens_per_min(105)]).unwrap(),
    );

    let (successes, _) = hammer(
        Arc::clone(&router),
        RoutingRequest::new("chat").with_payload(payload),
    );

    // budget is checked before charging, so the last admitted request may overshoot
    assert_eq!(successes, 11);
    let stats = router.get_agent_stats("tokens").unwrap();
    assert!(
        stats.current_load.tokens_per_min <= 105 + 10,
        "token usage {} overshot the budget by more than one request",
        stats.current_load.tokens_per_min
    );
    assert_eq!(stats.current_load.tokens_per_min, successes as u64 * 10);
}

#[test]
fn test_pool_capacity_is_sum_of_budgets() {
    let router = Arc::new(
        router_with_agents(
            false,
            [
                agent("a", "search").with_max_requests_per_min(10),
                agent("b", "search").with_max_requests_per_min(20),
                agent("c", "search").with_max_requests_per_min(30),
                agent("shadow", "search").as_shadow(),
            ],
        )
        .unwrap(),
    );

    let (successes, _) = hammer(Arc::clone(&router), RoutingRequest::new("search"));
    assert_eq!(successes, 60);

    for (id, budget) in [("a", 10), ("b", 20), ("c", 30)] {
        let stats = router.get_agent_stats(id).unwrap();
        assert_eq!(stats.current_load.requests_per_min, budget, "agent {id}");
    }

    // shadow agents never carry production load
    let shadow = router.get_agent_stats("shadow").unwrap();
    assert_eq!(shadow.current_load.requests_per_min, 0);
}

#[test]
fn test_health_reports_race_with_routing() {
    use agent_router::health::HealthStatus;

    let router = Arc::new(test_helpers::code_router());

    let reporter = {
        let router = Arc::clone(&router);
        thread::spawn(move || {
            for i in 0..200u64 {
                let status = if i % 2 == 0 {
                    HealthStatus::Unhealthy
                } else {
                    HealthStatus::Healthy
                };
                router.update_health("code-economy", status, i, None);
            }
            router.update_health("code-economy", HealthStatus::Healthy, 10, None);
        })
    };

    let (successes, rejections) = hammer(
        Arc::clone(&router),
        RoutingRequest::new("code").with_strategy("cost"),
    );
    reporter.join().unwrap();

    // standard and premium agents always back the economy one up
    assert_eq!(successes, THREADS * ATTEMPTS_PER_THREAD);
    assert_eq!(rejections, 0);
    assert_eq!(
        router.get_agent_stats("code-economy").unwrap().health_status,
        HealthStatus::Healthy
    );
}
