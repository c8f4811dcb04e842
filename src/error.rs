use std::fmt;

/// Error type returned by the readiness coordinator.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The batch topic creation request failed on every permitted attempt.
    #[error("topic creation failed after {attempts} attempt(s): {source}")]
    TopicCreationExhausted {
        attempts: u32,
        /// Failure reported by the last attempt.
        #[source]
        source: BrokerError,
    },
    /// Listing topics failed on every permitted attempt.
    #[error("topic listing failed after {attempts} attempt(s): {source}")]
    TopicListingExhausted {
        attempts: u32,
        #[source]
        source: BrokerError,
    },
    /// A configured topic never showed up in the broker's topic listing.
    #[error("topic '{topic}' not visible after {attempts} retries")]
    TopicVisibilityTimeout { topic: String, attempts: u32 },
    /// The schema registry never answered with a 2xx status.
    #[error("schema registry at {url} unreachable after {attempts} retries (last status {last_status})")]
    RegistryUnreachable {
        url: String,
        attempts: u32,
        last_status: u16,
    },
    /// A backoff sleep was cancelled before it elapsed.
    #[error("retry interrupted while waiting on {operation}")]
    RetryInterrupted { operation: &'static str },
}

/// Coarse classification of [`BootstrapError`], used for log fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapErrorKind {
    TopicCreationExhausted,
    TopicListingExhausted,
    TopicVisibilityTimeout,
    RegistryUnreachable,
    RetryInterrupted,
}

impl BootstrapError {
    pub fn kind(&self) -> BootstrapErrorKind {
        match self {
            Self::TopicCreationExhausted { .. } => BootstrapErrorKind::TopicCreationExhausted,
            Self::TopicListingExhausted { .. } => BootstrapErrorKind::TopicListingExhausted,
            Self::TopicVisibilityTimeout { .. } => BootstrapErrorKind::TopicVisibilityTimeout,
            Self::RegistryUnreachable { .. } => BootstrapErrorKind::RegistryUnreachable,
            Self::RetryInterrupted { .. } => BootstrapErrorKind::RetryInterrupted,
        }
    }
}

impl fmt::Display for BootstrapErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TopicCreationExhausted => "topic_creation_exhausted",
            Self::TopicListingExhausted => "topic_listing_exhausted",
            Self::TopicVisibilityTimeout => "topic_visibility_timeout",
            Self::RegistryUnreachable => "registry_unreachable",
            Self::RetryInterrupted => "retry_interrupted",
        };
        f.write_str(name)
    }
}

/// Failure reported by a broker admin adapter.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The admin request could not be issued or did not complete.
    #[error("broker request failed: {0}")]
    Request(String),
    /// The broker refused to create one topic of the batch.
    #[error("topic '{topic}' rejected by broker: {reason}")]
    TopicRejected { topic: String, reason: String },
    /// Error surfaced by librdkafka.
    #[cfg(feature = "kafka")]
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// Transport-level failure of a registry health probe.
///
/// Never leaves the coordinator: it is read as "not ready yet".
#[derive(Debug, thiserror::Error)]
#[error("registry transport unavailable: {reason}")]
pub struct TransportUnavailable {
    pub reason: String,
}

impl From<reqwest::Error> for TransportUnavailable {
    fn from(err: reqwest::Error) -> Self {
        Self {
            reason: err.to_string(),
        }
    }
}

/// Configuration loading or validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
}

/// Error raised by a stream ingestion runner.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid stream configuration: {0}")]
    InvalidConfig(String),
    #[error("stream runner already started")]
    AlreadyStarted,
    #[error("stream transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("stream endpoint returned http {status}")]
    Http { status: u16 },
}
