//! librdkafka-backed broker admin adapter.
//!
//! Enabled with the `kafka` feature.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication, TopicResult};
use rdkafka::client::ClientContext;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;

use crate::{BrokerAdminPort, BrokerError, TopicListing, TopicSpec};

/// Routes librdkafka client errors into `tracing`.
#[derive(Clone, Debug)]
pub struct AdminClientContext {
    bootstrap_servers: String,
}

impl ClientContext for AdminClientContext {
    fn log(&self, _level: RDKafkaLogLevel, _facility: &str, _message: &str) {
        // Connection problems already arrive through `error`.
    }

    fn error(&self, error: KafkaError, reason: &str) {
        tracing::warn!(
            target: "kafka_bootstrap::kafka",
            bootstrap_servers = %self.bootstrap_servers,
            error = %error,
            reason = %reason,
            "kafka admin client error"
        );
    }
}

/// Broker admin adapter over an rdkafka [`AdminClient`].
#[derive(Clone)]
pub struct KafkaAdminClient {
    admin: Arc<AdminClient<AdminClientContext>>,
    timeout: Duration,
}

impl std::fmt::Debug for KafkaAdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaAdminClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl KafkaAdminClient {
    /// Connects an admin client to `bootstrap_servers`.
    pub fn new(bootstrap_servers: &str, timeout_ms: u64) -> Result<Self, BrokerError> {
        let context = AdminClientContext {
            bootstrap_servers: bootstrap_servers.to_owned(),
        };
        let admin: AdminClient<AdminClientContext> = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .create_with_context(context)?;
        Ok(Self {
            admin: Arc::new(admin),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

fn to_i32(value: u32, what: &str, topic: &str) -> Result<i32, BrokerError> {
    i32::try_from(value).map_err(|_| BrokerError::TopicRejected {
        topic: topic.to_owned(),
        reason: format!("{what} {value} exceeds the broker limit"),
    })
}

/// Maps one per-topic creation result; an existing topic counts as created.
fn creation_outcome(result: TopicResult) -> Result<(), BrokerError> {
    match result {
        Ok(topic) => {
            tracing::info!(topic = %topic, "topic created");
            Ok(())
        }
        Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
            tracing::info!(topic = %topic, "topic already exists");
            Ok(())
        }
        Err((topic, code)) => Err(BrokerError::TopicRejected {
            topic,
            reason: code.to_string(),
        }),
    }
}

#[async_trait]
impl BrokerAdminPort for KafkaAdminClient {
    async fn create_topics(&self, specs: &[TopicSpec]) -> Result<(), BrokerError> {
        let mut topics = Vec::with_capacity(specs.len());
        for spec in specs {
            let partitions = to_i32(spec.partitions(), "partition count", spec.name())?;
            let replication = to_i32(spec.replication_factor(), "replication factor", spec.name())?;
            topics.push(NewTopic::new(
                spec.name(),
                partitions,
                TopicReplication::Fixed(replication),
            ));
        }

        let options = AdminOptions::new().operation_timeout(Some(self.timeout));
        let results = self.admin.create_topics(&topics, &options).await?;

        results.into_iter().try_for_each(creation_outcome)
    }

    async fn list_topics(&self) -> Result<TopicListing, BrokerError> {
        let admin = Arc::clone(&self.admin);
        let timeout = self.timeout;
        // fetch_metadata blocks on librdkafka, keep it off the async workers.
        let metadata = tokio::task::spawn_blocking(move || {
            admin.inner().fetch_metadata(None, timeout).map(|metadata| {
                metadata
                    .topics()
                    .iter()
                    .map(|topic| topic.name().to_owned())
                    .collect::<TopicListing>()
            })
        })
        .await
        .map_err(|err| BrokerError::Request(format!("metadata task failed: {err}")))??;

        for name in metadata.names() {
            tracing::debug!(topic = %name, "listed topic");
        }
        Ok(metadata)
    }
}
