use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::{
    retry::{sleep_or_cancel, PollBackoff, RetryExecutor, RetryFailure},
    BootstrapError, BrokerAdminPort, ConfigError, Ready, RegistryHealthPort, Result,
    RetryPolicy, TopicListing, TopicSpec,
};

/// Status a failed registry transport is read as.
const UNAVAILABLE: StatusCode = StatusCode::SERVICE_UNAVAILABLE;

/// Gates startup on broker topics and schema-registry health.
///
/// The three steps run in a fixed order through [`ReadinessCoordinator::bootstrap`],
/// or one by one through the individual methods:
/// - [`ReadinessCoordinator::create_topics`]
/// - [`ReadinessCoordinator::await_topics_visible`]
/// - [`ReadinessCoordinator::await_registry_healthy`]
#[derive(Debug)]
pub struct ReadinessCoordinator<B, R> {
    broker: B,
    registry: R,
    policy: RetryPolicy,
    topics: Vec<TopicSpec>,
    registry_url: String,
    cancel: Option<CancellationToken>,
}

impl<B, R> ReadinessCoordinator<B, R>
where
    B: BrokerAdminPort,
    R: RegistryHealthPort,
{
    /// Builds a coordinator, rejecting a `policy` that fails [`RetryPolicy::validate`].
    pub fn new(
        broker: B,
        registry: R,
        policy: RetryPolicy,
        topics: Vec<TopicSpec>,
        registry_url: impl Into<String>,
    ) -> std::result::Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            broker,
            registry,
            policy,
            topics,
            registry_url: registry_url.into(),
            cancel: None,
        })
    }

    /// Lets `token` interrupt any backoff sleep with [`BootstrapError::RetryInterrupted`].
    ///
    /// Without a token every retry loop runs to success or exhaustion.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Creates topics, waits until they are listed, then waits for the registry.
    pub async fn bootstrap(&self) -> Result<Ready> {
        self.create_topics().await?;
        let topics = self.await_topics_visible().await?;
        let registry_status = self.await_registry_healthy().await?;
        tracing::info!(
            topics = ?topics,
            registry_status,
            "kafka cluster ready"
        );
        Ok(Ready {
            topics,
            registry_status,
        })
    }

    /// Submits all topic specs as one batch, retrying the whole batch.
    ///
    /// Success only means the broker accepted the request; use
    /// [`ReadinessCoordinator::await_topics_visible`] to confirm the topics exist.
    pub async fn create_topics(&self) -> Result<()> {
        let executor = self.executor();
        let specs = self.topics.as_slice();
        executor
            .execute("create topics", |attempt| {
                tracing::info!(count = specs.len(), attempt, "creating topic(s)");
                self.broker.create_topics(specs)
            })
            .await
            .map_err(|failure| match failure {
                RetryFailure::Exhausted { attempts, last } => {
                    BootstrapError::TopicCreationExhausted {
                        attempts,
                        source: last,
                    }
                }
                RetryFailure::Interrupted => BootstrapError::RetryInterrupted {
                    operation: "topic creation",
                },
            })
    }

    /// Polls the topic listing until every configured topic is present.
    ///
    /// One retry budget is shared by all topics of the call, and every
    /// missing-topic retry fetches a fresh listing. Returns the confirmed names.
    pub async fn await_topics_visible(&self) -> Result<Vec<String>> {
        let mut backoff = PollBackoff::new(&self.policy);
        let mut listing = self.list_topics().await?;

        for spec in &self.topics {
            while !listing.contains_ignore_case(spec.name()) {
                if backoff.exhausted() {
                    tracing::error!(
                        topic = spec.name(),
                        retries = backoff.retries(),
                        "topic never became visible"
                    );
                    return Err(BootstrapError::TopicVisibilityTimeout {
                        topic: spec.name().to_owned(),
                        attempts: backoff.retries(),
                    });
                }
                let attempt = backoff.attempt();
                let delay = backoff.advance();
                tracing::info!(
                    topic = spec.name(),
                    attempt,
                    sleep_ms = delay.as_millis() as u64,
                    "topic not visible yet"
                );
                if sleep_or_cancel(delay, self.cancel.as_ref()).await {
                    return Err(BootstrapError::RetryInterrupted {
                        operation: "topic visibility",
                    });
                }
                listing = self.list_topics().await?;
            }
        }

        Ok(self.topics.iter().map(|spec| spec.name().to_owned()).collect())
    }

    /// Polls the schema registry until it answers with a 2xx status.
    ///
    /// Transport failures count as "not ready" and are never returned.
    /// Returns the successful status code.
    pub async fn await_registry_healthy(&self) -> Result<u16> {
        let url = self.registry_url.as_str();
        let mut backoff = PollBackoff::new(&self.policy);

        loop {
            let status = self.probe_registry().await;
            if status.is_success() {
                tracing::info!(url, status = status.as_u16(), "schema registry is up");
                return Ok(status.as_u16());
            }
            if backoff.exhausted() {
                tracing::error!(
                    url,
                    status = status.as_u16(),
                    retries = backoff.retries(),
                    "schema registry never became healthy"
                );
                return Err(BootstrapError::RegistryUnreachable {
                    url: url.to_owned(),
                    attempts: backoff.retries(),
                    last_status: status.as_u16(),
                });
            }
            let attempt = backoff.attempt();
            let delay = backoff.advance();
            tracing::info!(
                url,
                status = status.as_u16(),
                attempt,
                sleep_ms = delay.as_millis() as u64,
                "schema registry not ready yet"
            );
            if sleep_or_cancel(delay, self.cancel.as_ref()).await {
                return Err(BootstrapError::RetryInterrupted {
                    operation: "registry health",
                });
            }
        }
    }

    async fn probe_registry(&self) -> StatusCode {
        match self.registry.probe(&self.registry_url).await {
            Ok(status) => status,
            Err(err) => {
                tracing::debug!(error = %err, "registry probe failed");
                UNAVAILABLE
            }
        }
    }

    async fn list_topics(&self) -> Result<TopicListing> {
        self.executor()
            .execute("list topics", |attempt| {
                tracing::debug!(attempt, "reading kafka topics");
                self.broker.list_topics()
            })
            .await
            .map_err(|failure| match failure {
                RetryFailure::Exhausted { attempts, last } => {
                    BootstrapError::TopicListingExhausted {
                        attempts,
                        source: last,
                    }
                }
                RetryFailure::Interrupted => BootstrapError::RetryInterrupted {
                    operation: "topic listing",
                },
            })
    }

    fn executor(&self) -> RetryExecutor<'_> {
        RetryExecutor::new(&self.policy).with_cancellation(self.cancel.as_ref())
    }
}
