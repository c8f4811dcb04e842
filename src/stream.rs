//! Status event ingestion, started once the cluster is ready.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{config::StreamConfig, StreamError};

pub mod live;
pub mod mock;

pub use live::LiveStreamRunner;
pub use mock::MockStreamRunner;

/// A status event as carried by the stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub created_at: String,
    pub id: String,
    pub text: String,
    pub user: StatusUser,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUser {
    pub id: String,
}

/// Sink receiving every status a runner pulls.
pub trait StatusListener: Send + Sync {
    fn on_status(&self, status: &Status);
}

/// Listener that logs each status.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingStatusListener;

impl StatusListener for LoggingStatusListener {
    fn on_status(&self, status: &Status) {
        tracing::info!(
            id = %status.id,
            user = %status.user.id,
            created_at = %status.created_at,
            text = %status.text,
            "received status"
        );
    }
}

/// Source of status events running on a background task.
#[async_trait]
pub trait StreamRunner: Send {
    fn name(&self) -> &'static str;

    /// Starts forwarding events and returns without waiting for them.
    async fn start(&mut self) -> Result<(), StreamError>;

    /// Stops the background task and waits for it. Safe to call repeatedly,
    /// or without a prior `start`.
    async fn shutdown(&mut self);
}

pub type DynStreamRunner = Box<dyn StreamRunner>;

/// Picks the synthetic or the live runner from configuration.
pub fn runner_from_config(
    config: &StreamConfig,
    listener: Arc<dyn StatusListener>,
) -> DynStreamRunner {
    if config.enable_mock_tweets {
        Box::new(MockStreamRunner::new(config.clone(), listener))
    } else {
        Box::new(LiveStreamRunner::new(config.clone(), listener))
    }
}

/// Background task owned by a runner.
///
/// Dropping it cancels and aborts the task, so the stream is released on
/// every exit path even when `stop` is never awaited.
#[derive(Debug)]
pub(crate) struct RunnerTask {
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RunnerTask {
    pub(crate) fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(body(shutdown.clone()));
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub(crate) async fn stop(&mut self, name: &'static str) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(runner = name, error = %err, "stream task ended abnormally");
            }
        }
    }
}

impl Drop for RunnerTask {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.as_ref() {
            handle.abort();
        }
    }
}
