//! `kafka-bootstrap` gates service startup on a ready Kafka cluster.
//!
//! [`ReadinessCoordinator`] runs the bootstrap sequence:
//! - [`ReadinessCoordinator::create_topics`]
//! - [`ReadinessCoordinator::await_topics_visible`]
//! - [`ReadinessCoordinator::await_registry_healthy`]
//!
//! Once it succeeds, a [`stream::StreamRunner`] starts forwarding status
//! events to a [`stream::StatusListener`].

mod client;
mod coordinator;
mod error;
mod ports;
mod retry;
mod types;

pub mod config;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod stream;
pub mod telemetry;

pub use client::{RegistryHttpClient, DEFAULT_PROBE_TIMEOUT_MS};
pub use config::AppConfig;
pub use coordinator::ReadinessCoordinator;
pub use error::{
    BootstrapError, BootstrapErrorKind, BrokerError, ConfigError, StreamError,
    TransportUnavailable,
};
pub use ports::{BrokerAdminPort, RegistryHealthPort};
pub use retry::{PollBackoff, RetryExecutor, RetryFailure, RetryPolicy};
pub use types::{Ready, TopicListing, TopicSpec};

pub type Result<T> = std::result::Result<T, BootstrapError>;
