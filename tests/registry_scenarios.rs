//! End-to-end registry behaviour through the public API.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{HangingCaller, ScriptedProbe, StubCaller};
use service_registry::config::CircuitBreakerConfig;
use service_registry::load_balancer::RoundRobin;
use service_registry::{
    Availability, CircuitState, HealthMonitor, InstanceRef, Outcome, Registry, RegistryConfig,
    RegistryError,
};
use service_registry::registry::ProbeTransition;

const SINGLE_POST: &str = "https://jsonplaceholder.typicode.com/posts/1";
const SINGLE_POST_MIRROR: &str = "https://mirror.example.com/posts/1";

fn config_with_breaker(cooldown_secs: f64) -> RegistryConfig {
    RegistryConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_trip_ratio: 0.5,
            failure_trip_min_samples: 5,
            cooldown_secs,
        },
        ..RegistryConfig::default()
    }
}

/// Push `n` failed calls through one instance, reviving it between calls.
fn fail_calls(registry: &Registry, instance: &InstanceRef, n: usize) {
    for _ in 0..n {
        registry.record_probe(instance, true).unwrap();
        let assignment = registry.assign(&instance.name).unwrap();
        registry
            .release(&assignment, Outcome::Failure, Duration::from_millis(20))
            .unwrap();
    }
}

#[test]
fn test_first_probe_outcomes_show_in_snapshot() {
    let registry = Registry::default();
    let a = registry.register("GetSinglePost", SINGLE_POST).unwrap();
    let b = registry
        .register("GetAllPosts", "https://jsonplaceholder.typicode.com/posts")
        .unwrap();

    assert_eq!(registry.record_probe(&a, true).unwrap(), ProbeTransition::Promoted);
    assert_eq!(
        registry.record_probe(&b, false).unwrap(),
        ProbeTransition::StillStarting { attempts: 1 }
    );

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["GetSinglePost"][0].availability, Availability::Available);
    assert_eq!(snapshot["GetAllPosts"][0].availability, Availability::Starting);
    assert!(!snapshot["GetSinglePost"][0].assigned);
    assert_eq!(registry.service_names(), vec!["GetAllPosts", "GetSinglePost"]);
}

#[test]
fn test_probe_promotes_only_healthy_instance() {
    let registry = Registry::default();
    let a = registry.register("GetSinglePost", SINGLE_POST).unwrap();
    let b = registry.register("GetSinglePost", SINGLE_POST_MIRROR).unwrap();

    registry.record_probe(&a, true).unwrap();
    registry.record_probe(&b, false).unwrap();

    let snapshot = registry.snapshot();
    let instances = &snapshot["GetSinglePost"];
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0].url, SINGLE_POST);
    assert_eq!(instances[0].availability, Availability::Available);
    assert_eq!(instances[1].url, SINGLE_POST_MIRROR);
    assert_eq!(instances[1].availability, Availability::Starting);

    let assignment = registry.assign("GetSinglePost").unwrap();
    assert_eq!(assignment.instance, a);
}

#[test]
fn test_single_instance_is_exclusive() {
    let registry = Registry::default();
    let only = registry
        .register("GetAllPosts", "https://jsonplaceholder.typicode.com/posts")
        .unwrap();
    registry.record_probe(&only, true).unwrap();

    let first = registry.assign("GetAllPosts").unwrap();
    assert_eq!(
        registry.assign("GetAllPosts").unwrap_err(),
        RegistryError::NoAvailableInstance("GetAllPosts".into())
    );

    registry
        .release(&first, Outcome::Success, Duration::from_millis(5))
        .unwrap();
    assert!(registry.assign("GetAllPosts").is_ok());
}

#[test]
fn test_release_by_wrong_holder_rejected() {
    let registry = Registry::default();
    let only = registry.register("svc", "http://a").unwrap();
    registry.record_probe(&only, true).unwrap();

    let mut assignment = registry.assign_as("svc", "session-a").unwrap();
    assignment.holder = "session-b".into();

    assert!(matches!(
        registry.release(&assignment, Outcome::Success, Duration::ZERO),
        Err(RegistryError::NotAssigned { .. })
    ));
    assert!(registry.instances("svc").unwrap()[0].assigned);
}

#[test]
fn test_failures_trip_breaker_until_cooldown() {
    let registry = Registry::new(config_with_breaker(0.05));
    let instance = registry.register("GetSinglePost", SINGLE_POST).unwrap();

    fail_calls(&registry, &instance, 4);
    assert_eq!(registry.breaker("GetSinglePost").unwrap().state, CircuitState::Closed);

    fail_calls(&registry, &instance, 1);
    let breaker = registry.breaker("GetSinglePost").unwrap();
    assert_eq!(breaker.state, CircuitState::Open);
    assert_eq!(breaker.failure_requests, 5);

    registry.record_probe(&instance, true).unwrap();
    assert!(matches!(
        registry.assign("GetSinglePost"),
        Err(RegistryError::CircuitOpen { .. })
    ));

    std::thread::sleep(Duration::from_millis(80));

    let trial = registry.assign("GetSinglePost").unwrap();
    assert_eq!(registry.breaker("GetSinglePost").unwrap().state, CircuitState::HalfOpen);
    assert!(matches!(
        registry.assign("GetSinglePost"),
        Err(RegistryError::CircuitOpen { .. })
    ));

    registry
        .release(&trial, Outcome::Success, Duration::from_millis(10))
        .unwrap();
    let breaker = registry.breaker("GetSinglePost").unwrap();
    assert_eq!(breaker.state, CircuitState::Closed);
    assert_eq!(breaker.total_requests, 0);
}

#[test]
fn test_failed_trial_reopens() {
    let registry = Registry::new(config_with_breaker(0.05));
    let instance = registry.register("svc", "http://a").unwrap();
    fail_calls(&registry, &instance, 5);

    std::thread::sleep(Duration::from_millis(80));
    registry.record_probe(&instance, true).unwrap();
    let trial = registry.assign("svc").unwrap();
    registry
        .release(&trial, Outcome::Failure, Duration::from_millis(10))
        .unwrap();

    assert_eq!(registry.breaker("svc").unwrap().state, CircuitState::Open);
    registry.record_probe(&instance, true).unwrap();
    match registry.assign("svc") {
        Err(RegistryError::CircuitOpen { retry_in, .. }) => {
            assert!(retry_in <= Duration::from_millis(50))
        }
        other => panic!("expected CircuitOpen, got {other:?}"),
    }
}

#[test]
fn test_shutdown_then_register_gets_fresh_breaker() {
    let registry = Registry::new(config_with_breaker(60.0));
    let instance = registry.register("GetSinglePost", SINGLE_POST).unwrap();
    fail_calls(&registry, &instance, 5);
    assert_eq!(registry.breaker("GetSinglePost").unwrap().state, CircuitState::Open);

    assert_eq!(registry.shutdown("GetSinglePost").unwrap(), 1);
    assert!(registry.instances("GetSinglePost").is_err());

    let fresh = registry.register("GetSinglePost", SINGLE_POST).unwrap();
    let breaker = registry.breaker("GetSinglePost").unwrap();
    assert_eq!(breaker.state, CircuitState::Closed);
    assert_eq!(breaker.total_requests, 0);

    registry.record_probe(&fresh, true).unwrap();
    assert!(registry.assign("GetSinglePost").is_ok());
}

#[test]
fn test_instance_count_tracks_register_and_deregister() {
    let registry = Registry::default();
    let urls: Vec<String> = (0..6).map(|i| format!("http://10.0.0.{i}:8080")).collect();
    for url in &urls {
        registry.register("svc", url).unwrap();
    }
    assert_eq!(registry.instances("svc").unwrap().len(), 6);

    for url in &urls[..2] {
        registry.deregister("svc", url).unwrap();
    }
    assert!(registry.register("svc", &urls[3]).is_err());
    assert_eq!(registry.instances("svc").unwrap().len(), 4);
}

#[test]
fn test_concurrent_assignment_never_double_assigns() {
    let registry = Registry::default();
    for i in 0..4 {
        let instance = registry.register("svc", &format!("http://node-{i}")).unwrap();
        registry.record_probe(&instance, true).unwrap();
    }

    let assignments = std::thread::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|_| s.spawn(|| registry.assign("svc").ok()))
            .collect();
        handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert_eq!(assignments.len(), 4);
    let urls: HashSet<_> = assignments.iter().map(|a| a.instance.url.clone()).collect();
    assert_eq!(urls.len(), 4);
    assert!(registry.instances("svc").unwrap().iter().all(|i| i.assigned));
}

#[test]
fn test_round_robin_rotates() {
    let registry = Registry::with_selector(RegistryConfig::default(), Arc::new(RoundRobin::new()));
    for url in ["http://a", "http://b"] {
        let instance = registry.register("svc", url).unwrap();
        registry.record_probe(&instance, true).unwrap();
    }

    let mut picked = Vec::new();
    for _ in 0..4 {
        let assignment = registry.assign("svc").unwrap();
        picked.push(assignment.instance.url.clone());
        registry
            .release(&assignment, Outcome::Success, Duration::ZERO)
            .unwrap();
    }

    assert_eq!(picked, vec!["http://a", "http://b", "http://a", "http://b"]);
}

#[tokio::test]
async fn test_call_failure_marks_instance_down() {
    let registry = Registry::default();
    let instance = registry.register("svc", "http://a").unwrap();
    registry.record_probe(&instance, true).unwrap();

    let err = registry
        .call("svc", &StubCaller { succeed: false })
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::RequestFailed { .. }));

    let snap = registry.instances("svc").unwrap();
    assert_eq!(snap[0].availability, Availability::Down);
    assert!(!snap[0].assigned);
    assert_eq!(registry.breaker("svc").unwrap().failure_requests, 1);

    registry.record_probe(&instance, true).unwrap();
    let body = registry
        .call("svc", &StubCaller { succeed: true })
        .await
        .unwrap();
    assert_eq!(body, "ok");
    assert_eq!(registry.breaker("svc").unwrap().successful_requests, 1);
}

#[tokio::test]
async fn test_monitor_evicts_instance_that_never_starts() {
    let mut config = RegistryConfig::default();
    config.health_check.startup_max_retries = 1;
    let registry = Arc::new(Registry::new(config));
    registry.register("svc", "http://ok").unwrap();
    registry.register("svc", "http://never").unwrap();

    let probe = ScriptedProbe::default();
    probe.set("http://ok", true);
    let monitor = HealthMonitor::new(registry.clone(), probe.clone());

    let first = monitor.check_all().await;
    assert_eq!(first.probed, 2);
    assert_eq!(first.promoted, 1);
    assert_eq!(first.evicted, 0);

    let second = monitor.check_all().await;
    assert_eq!(second.evicted, 1);

    let remaining = registry.instances("svc").unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].url, "http://ok");
    assert_eq!(probe.probe_count(), 4);
}

#[test]
fn test_release_from_before_shutdown_leaves_fresh_breaker_alone() {
    let registry = Registry::default();
    let instance = registry.register("svc", "http://a").unwrap();
    registry.record_probe(&instance, true).unwrap();
    let stale = registry.assign("svc").unwrap();

    registry.shutdown("svc").unwrap();
    let fresh = registry.register("svc", "http://a").unwrap();

    assert!(matches!(
        registry.release(&stale, Outcome::Failure, Duration::from_secs(3)),
        Err(RegistryError::UnknownInstance { .. })
    ));
    let breaker = registry.breaker("svc").unwrap();
    assert_eq!(breaker.total_requests, 0);
    assert_eq!(breaker.failure_requests, 0);
    assert_eq!(breaker.duration, 0.0);

    registry.record_probe(&fresh, true).unwrap();
    assert!(registry.assign("svc").is_ok());
}

#[test]
fn test_only_trial_release_decides_half_open() {
    let registry = Registry::new(config_with_breaker(0.05));
    let a = registry.register("svc", "http://a").unwrap();
    let b = registry.register("svc", "http://b").unwrap();
    registry.record_probe(&a, true).unwrap();
    registry.record_probe(&b, true).unwrap();

    let straggler = registry.assign_as("svc", "straggler").unwrap();
    assert_eq!(straggler.instance, a);

    // Trip the breaker through b while a is still held.
    for _ in 0..5 {
        registry.record_probe(&b, true).unwrap();
        let held = registry.assign("svc").unwrap();
        assert_eq!(held.instance, b);
        registry
            .release(&held, Outcome::Failure, Duration::from_millis(5))
            .unwrap();
    }
    assert_eq!(registry.breaker("svc").unwrap().state, CircuitState::Open);

    std::thread::sleep(Duration::from_millis(80));
    registry.record_probe(&b, true).unwrap();
    let trial = registry.assign("svc").unwrap();
    assert_eq!(trial.instance, b);

    registry
        .release(&straggler, Outcome::Success, Duration::from_millis(5))
        .unwrap();
    assert_eq!(registry.breaker("svc").unwrap().state, CircuitState::HalfOpen);
    assert!(matches!(
        registry.assign("svc"),
        Err(RegistryError::CircuitOpen { .. })
    ));

    registry
        .release(&trial, Outcome::Success, Duration::from_millis(5))
        .unwrap();
    let breaker = registry.breaker("svc").unwrap();
    assert_eq!(breaker.state, CircuitState::Closed);
    assert_eq!(breaker.total_requests, 0);
}

#[tokio::test]
async fn test_cancelled_call_releases_instance() {
    let registry = Registry::default();
    let instance = registry.register("svc", "http://a").unwrap();
    registry.record_probe(&instance, true).unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(20), registry.call("svc", &HangingCaller)).await;
    assert!(cancelled.is_err());

    let snap = registry.instances("svc").unwrap();
    assert!(!snap[0].assigned);
    assert_eq!(snap[0].assigned_service, None);
    assert_eq!(snap[0].availability, Availability::Down);
    assert_eq!(registry.breaker("svc").unwrap().failure_requests, 1);

    registry.record_probe(&instance, true).unwrap();
    assert_eq!(
        registry.call("svc", &StubCaller { succeed: true }).await.unwrap(),
        "ok"
    );
}

#[tokio::test]
async fn test_cancelled_trial_call_does_not_wedge_breaker() {
    let registry = Registry::new(config_with_breaker(0.05));
    let instance = registry.register("svc", "http://a").unwrap();
    fail_calls(&registry, &instance, 5);

    tokio::time::sleep(Duration::from_millis(80)).await;
    registry.record_probe(&instance, true).unwrap();
    let cancelled =
        tokio::time::timeout(Duration::from_millis(20), registry.call("svc", &HangingCaller)).await;
    assert!(cancelled.is_err());

    // The dropped trial counts as a failed trial: open again, not stuck half-open.
    assert_eq!(registry.breaker("svc").unwrap().state, CircuitState::Open);
    tokio::time::sleep(Duration::from_millis(80)).await;
    registry.record_probe(&instance, true).unwrap();
    assert!(registry.call("svc", &StubCaller { succeed: true }).await.is_ok());
    assert_eq!(registry.breaker("svc").unwrap().state, CircuitState::Closed);
}
