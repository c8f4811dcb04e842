use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use kafka_bootstrap::{
    BootstrapError, BrokerAdminPort, BrokerError, ConfigError, ReadinessCoordinator,
    RegistryHealthPort, RetryPolicy, TopicListing, TopicSpec, TransportUnavailable,
};
use reqwest::StatusCode;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Listing = Result<Vec<&'static str>, &'static str>;

/// Broker fake replaying scripted listings; the last one sticks.
#[derive(Default)]
struct FakeBroker {
    listings: Mutex<VecDeque<Listing>>,
    last_listing: Mutex<Vec<&'static str>>,
    create_failures: Mutex<usize>,
    create_calls: Mutex<Vec<Instant>>,
    list_calls: Mutex<Vec<Instant>>,
}

impl FakeBroker {
    fn with_listings(listings: Vec<Listing>) -> Arc<Self> {
        Arc::new(Self {
            listings: Mutex::new(listings.into()),
            ..Self::default()
        })
    }

    fn failing_creation(self: Arc<Self>, failures: usize) -> Arc<Self> {
        *self.create_failures.lock().expect("lock") = failures;
        self
    }

    fn list_count(&self) -> usize {
        self.list_calls.lock().expect("lock").len()
    }

    fn create_count(&self) -> usize {
        self.create_calls.lock().expect("lock").len()
    }

    /// Gaps between consecutive listing calls, in milliseconds.
    fn list_gaps_ms(&self) -> Vec<u64> {
        gaps_ms(&self.list_calls.lock().expect("lock"))
    }

    fn create_gaps_ms(&self) -> Vec<u64> {
        gaps_ms(&self.create_calls.lock().expect("lock"))
    }
}

fn gaps_ms(instants: &[Instant]) -> Vec<u64> {
    instants
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
        .collect()
}

#[async_trait]
impl BrokerAdminPort for FakeBroker {
    async fn create_topics(&self, specs: &[TopicSpec]) -> Result<(), BrokerError> {
        assert!(!specs.is_empty(), "batch must carry every spec");
        let mut calls = self.create_calls.lock().expect("lock");
        calls.push(Instant::now());
        let mut failures = self.create_failures.lock().expect("lock");
        if *failures > 0 {
            *failures -= 1;
            return Err(BrokerError::Request(format!("attempt {}", calls.len())));
        }
        Ok(())
    }

    async fn list_topics(&self) -> Result<TopicListing, BrokerError> {
        self.list_calls.lock().expect("lock").push(Instant::now());
        let next = self.listings.lock().expect("lock").pop_front();
        let mut last = self.last_listing.lock().expect("lock");
        match next {
            Some(Ok(names)) => {
                *last = names.clone();
                Ok(names.into_iter().collect())
            }
            Some(Err(reason)) => Err(BrokerError::Request(reason.to_owned())),
            None => Ok(last.iter().copied().collect()),
        }
    }
}

/// Registry fake replaying scripted probe results; answers 200 once drained.
#[derive(Default)]
struct FakeRegistry {
    responses: Mutex<VecDeque<Option<u16>>>,
    probes: Mutex<Vec<Instant>>,
}

impl FakeRegistry {
    fn with_responses(responses: Vec<Option<u16>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        })
    }

    fn probe_count(&self) -> usize {
        self.probes.lock().expect("lock").len()
    }

    fn probe_gaps_ms(&self) -> Vec<u64> {
        gaps_ms(&self.probes.lock().expect("lock"))
    }
}

#[async_trait]
impl RegistryHealthPort for FakeRegistry {
    async fn probe(&self, url: &str) -> Result<StatusCode, TransportUnavailable> {
        assert_eq!(url, REGISTRY_URL);
        self.probes.lock().expect("lock").push(Instant::now());
        match self.responses.lock().expect("lock").pop_front() {
            Some(Some(code)) => Ok(StatusCode::from_u16(code).expect("valid status code")),
            Some(None) => Err(TransportUnavailable {
                reason: "connection refused".to_owned(),
            }),
            None => Ok(StatusCode::OK),
        }
    }
}

const REGISTRY_URL: &str = "http://registry.test/subjects";

fn policy(max_attempts: u32, sleep_time_ms: u64, multiplier: f64) -> RetryPolicy {
    RetryPolicy {
        initial_interval_ms: 100,
        max_interval_ms: 150,
        multiplier,
        max_attempts,
        sleep_time_ms,
    }
}

fn specs(names: &[&str]) -> Vec<TopicSpec> {
    names
        .iter()
        .map(|name| TopicSpec::new(name, 3, 1).expect("valid topic spec"))
        .collect()
}

fn coordinator(
    broker: &Arc<FakeBroker>,
    registry: &Arc<FakeRegistry>,
    policy: RetryPolicy,
    topics: &[&str],
) -> ReadinessCoordinator<Arc<FakeBroker>, Arc<FakeRegistry>> {
    ReadinessCoordinator::new(
        Arc::clone(broker),
        Arc::clone(registry),
        policy,
        specs(topics),
        REGISTRY_URL,
    )
    .expect("test policy must be valid")
}

#[tokio::test(start_paused = true)]
async fn topics_appearing_one_by_one_back_off_100_200_400() {
    let broker = FakeBroker::with_listings(vec![
        Ok(vec![]),
        Ok(vec!["topicA"]),
        Ok(vec!["topicA", "topicB"]),
        Ok(vec!["topicA", "topicB", "topicC"]),
    ]);
    let registry = FakeRegistry::with_responses(vec![]);
    let coordinator = coordinator(
        &broker,
        &registry,
        policy(3, 100, 2.0),
        &["topicA", "topicB", "topicC"],
    );

    let started = Instant::now();
    let topics = coordinator
        .await_topics_visible()
        .await
        .expect("topics must become visible");

    assert_eq!(topics, vec!["topicA", "topicB", "topicC"]);
    assert_eq!(broker.list_gaps_ms(), vec![100, 200, 400]);
    assert_eq!(started.elapsed(), Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn exactly_max_attempts_retries_are_permitted() {
    for max_attempts in 1..=4u32 {
        let mut listings: Vec<Listing> = (0..max_attempts).map(|_| Ok(vec![])).collect();
        listings.push(Ok(vec!["orders"]));
        let broker = FakeBroker::with_listings(listings);
        let registry = FakeRegistry::with_responses(vec![]);
        let coordinator = coordinator(&broker, &registry, policy(max_attempts, 10, 2.0), &["orders"]);

        coordinator
            .await_topics_visible()
            .await
            .unwrap_or_else(|err| panic!("max_attempts={max_attempts}: {err}"));
        assert_eq!(broker.list_count(), max_attempts as usize + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn one_missing_observation_too_many_times_out() {
    for max_attempts in 1..=4u32 {
        let mut listings: Vec<Listing> = (0..=max_attempts).map(|_| Ok(vec![])).collect();
        listings.push(Ok(vec!["orders"]));
        let broker = FakeBroker::with_listings(listings);
        let registry = FakeRegistry::with_responses(vec![]);
        let coordinator = coordinator(&broker, &registry, policy(max_attempts, 10, 2.0), &["orders"]);

        let err = coordinator
            .await_topics_visible()
            .await
            .expect_err("budget must be exceeded");
        match err {
            BootstrapError::TopicVisibilityTimeout { topic, attempts } => {
                assert_eq!(topic, "orders");
                assert_eq!(attempts, max_attempts);
            }
            other => panic!("expected visibility timeout, got {other:?}"),
        }
        assert_eq!(broker.list_count(), max_attempts as usize + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn polling_growth_uses_truncated_multiplier_only() {
    let broker = FakeBroker::with_listings(vec![
        Ok(vec![]),
        Ok(vec![]),
        Ok(vec![]),
        Ok(vec![]),
        Ok(vec!["events"]),
    ]);
    let registry = FakeRegistry::with_responses(vec![]);
    let policy = RetryPolicy {
        initial_interval_ms: 1,
        max_interval_ms: 1,
        multiplier: 3.7,
        max_attempts: 4,
        sleep_time_ms: 50,
    };
    let coordinator = coordinator(&broker, &registry, policy, &["events"]);

    coordinator
        .await_topics_visible()
        .await
        .expect("topic must become visible");
    assert_eq!(broker.list_gaps_ms(), vec![50, 150, 450, 1350]);
}

#[tokio::test(start_paused = true)]
async fn visibility_check_is_case_insensitive_and_idempotent() {
    let broker = FakeBroker::with_listings(vec![Ok(vec!["ORDERS", "Payments"])]);
    let registry = FakeRegistry::with_responses(vec![]);
    let coordinator = coordinator(&broker, &registry, policy(3, 100, 2.0), &["orders", "payments"]);

    coordinator
        .await_topics_visible()
        .await
        .expect("first check must succeed");

    let started = Instant::now();
    coordinator
        .await_topics_visible()
        .await
        .expect("second check must succeed");
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(broker.list_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn failing_listing_surfaces_listing_exhausted() {
    let broker = FakeBroker::with_listings(vec![
        Err("metadata timeout"),
        Err("metadata timeout"),
        Err("metadata timeout"),
    ]);
    let registry = FakeRegistry::with_responses(vec![]);
    let coordinator = coordinator(&broker, &registry, policy(3, 100, 2.0), &["orders"]);

    let err = coordinator
        .await_topics_visible()
        .await
        .expect_err("listing must fail");
    assert!(matches!(
        err,
        BootstrapError::TopicListingExhausted { attempts: 3, .. }
    ));
    // Listing retries use the capped executor interval.
    assert_eq!(broker.list_gaps_ms(), vec![100, 150]);
}

#[tokio::test(start_paused = true)]
async fn registry_failing_past_budget_never_reaches_success() {
    let broker = FakeBroker::with_listings(vec![]);
    let registry = FakeRegistry::with_responses(vec![
        Some(503),
        Some(503),
        Some(503),
        Some(503),
        Some(503),
        Some(200),
    ]);
    let coordinator = coordinator(&broker, &registry, policy(4, 100, 2.0), &["orders"]);

    let err = coordinator
        .await_registry_healthy()
        .await
        .expect_err("registry must be reported unreachable");
    match err {
        BootstrapError::RegistryUnreachable {
            url,
            attempts,
            last_status,
        } => {
            assert_eq!(url, REGISTRY_URL);
            assert_eq!(attempts, 4);
            assert_eq!(last_status, 503);
        }
        other => panic!("expected registry unreachable, got {other:?}"),
    }
    assert_eq!(registry.probe_count(), 5);
    assert_eq!(registry.probe_gaps_ms(), vec![100, 200, 400, 800]);
}

#[tokio::test(start_paused = true)]
async fn registry_transport_errors_read_as_not_ready() {
    let broker = FakeBroker::with_listings(vec![]);
    let registry = FakeRegistry::with_responses(vec![None, Some(404), None, Some(204)]);
    let coordinator = coordinator(&broker, &registry, policy(3, 10, 2.0), &["orders"]);

    let status = coordinator
        .await_registry_healthy()
        .await
        .expect("registry must become healthy");
    assert_eq!(status, 204);
    assert_eq!(registry.probe_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn creation_exhaustion_wraps_last_broker_error() {
    let broker = FakeBroker::with_listings(vec![]).failing_creation(usize::MAX);
    let registry = FakeRegistry::with_responses(vec![]);
    let coordinator = coordinator(&broker, &registry, policy(3, 100, 2.0), &["a", "b"]);

    let err = coordinator
        .create_topics()
        .await
        .expect_err("creation must be exhausted");
    match err {
        BootstrapError::TopicCreationExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert_eq!(source.to_string(), "broker request failed: attempt 3");
        }
        other => panic!("expected creation exhausted, got {other:?}"),
    }
    assert_eq!(broker.create_count(), 3);
    assert_eq!(broker.create_gaps_ms(), vec![100, 150]);
}

#[tokio::test(start_paused = true)]
async fn creation_recovers_within_budget() {
    let broker = FakeBroker::with_listings(vec![]).failing_creation(2);
    let registry = FakeRegistry::with_responses(vec![]);
    let coordinator = coordinator(&broker, &registry, policy(3, 100, 2.0), &["a"]);

    coordinator
        .create_topics()
        .await
        .expect("third attempt must succeed");
    assert_eq!(broker.create_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_runs_steps_in_order() {
    let broker = FakeBroker::with_listings(vec![Ok(vec![]), Ok(vec!["orders"])]);
    let registry = FakeRegistry::with_responses(vec![Some(503), Some(200)]);
    let coordinator = coordinator(&broker, &registry, policy(3, 100, 2.0), &[" orders "]);

    let ready = coordinator.bootstrap().await.expect("bootstrap must succeed");

    assert_eq!(ready.topics, vec!["orders"]);
    assert_eq!(ready.registry_status, 200);
    assert_eq!(broker.create_count(), 1);
    assert_eq!(broker.list_count(), 2);
    assert_eq!(registry.probe_count(), 2);

    let created = broker.create_calls.lock().expect("lock")[0];
    let first_list = broker.list_calls.lock().expect("lock")[0];
    let first_probe = registry.probes.lock().expect("lock")[0];
    assert!(created <= first_list);
    assert!(first_list < first_probe);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_stops_at_first_failure() {
    let broker = FakeBroker::with_listings(vec![]).failing_creation(usize::MAX);
    let registry = FakeRegistry::with_responses(vec![]);
    let coordinator = coordinator(&broker, &registry, policy(2, 100, 2.0), &["orders"]);

    let err = coordinator.bootstrap().await.expect_err("bootstrap must fail");
    assert!(matches!(err, BootstrapError::TopicCreationExhausted { .. }));
    assert_eq!(broker.list_count(), 0);
    assert_eq!(registry.probe_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_backoff_interrupts_polling() {
    let broker = FakeBroker::with_listings(vec![Ok(vec![])]);
    let registry = FakeRegistry::with_responses(vec![]);
    let token = CancellationToken::new();
    let coordinator = coordinator(&broker, &registry, policy(5, 1_000, 2.0), &["orders"])
        .with_cancellation(token.clone());

    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        token.cancel();
    });

    let err = coordinator
        .await_topics_visible()
        .await
        .expect_err("cancellation must abort the loop");
    assert!(matches!(err, BootstrapError::RetryInterrupted { .. }));
    assert_eq!(broker.list_count(), 2);
    cancel.await.expect("cancel task must finish");
}

#[test]
fn invalid_retry_policy_is_rejected_at_construction() {
    let broker = FakeBroker::with_listings(vec![]);
    let registry = FakeRegistry::with_responses(vec![]);
    let invalid = [
        RetryPolicy {
            multiplier: 0.5,
            ..policy(3, 100, 2.0)
        },
        policy(0, 100, 2.0),
        RetryPolicy {
            initial_interval_ms: 10,
            max_interval_ms: 5,
            ..policy(3, 100, 2.0)
        },
    ];

    for policy in invalid {
        let result = ReadinessCoordinator::new(
            Arc::clone(&broker),
            Arc::clone(&registry),
            policy.clone(),
            specs(&["orders"]),
            REGISTRY_URL,
        );
        match result {
            Err(ConfigError::InvalidRetryPolicy(_)) => {}
            Err(other) => panic!("expected invalid retry policy for {policy:?}, got {other:?}"),
            Ok(_) => panic!("policy {policy:?} must be rejected"),
        }
    }
    assert_eq!(broker.create_count(), 0);
    assert_eq!(broker.list_count(), 0);
}
