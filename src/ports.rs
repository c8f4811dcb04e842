//! Capabilities the coordinator needs from the outside world.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{BrokerError, TopicListing, TopicSpec, TransportUnavailable};

/// Administrative access to the broker cluster.
#[async_trait]
pub trait BrokerAdminPort: Send + Sync {
    /// Submits one creation request covering every spec.
    async fn create_topics(&self, specs: &[TopicSpec]) -> Result<(), BrokerError>;

    /// Lists the topics currently known to the cluster.
    async fn list_topics(&self) -> Result<TopicListing, BrokerError>;
}

/// Health probe against the schema registry.
#[async_trait]
pub trait RegistryHealthPort: Send + Sync {
    /// Issues a GET against `url`. Transport failures are returned, never panicked.
    async fn probe(&self, url: &str) -> Result<StatusCode, TransportUnavailable>;
}

#[async_trait]
impl<T: BrokerAdminPort + ?Sized> BrokerAdminPort for std::sync::Arc<T> {
    async fn create_topics(&self, specs: &[TopicSpec]) -> Result<(), BrokerError> {
        (**self).create_topics(specs).await
    }

    async fn list_topics(&self) -> Result<TopicListing, BrokerError> {
        (**self).list_topics().await
    }
}

#[async_trait]
impl<T: RegistryHealthPort + ?Sized> RegistryHealthPort for std::sync::Arc<T> {
    async fn probe(&self, url: &str) -> Result<StatusCode, TransportUnavailable> {
        (**self).probe(url).await
    }
}
