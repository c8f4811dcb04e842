//! Live status subscription over a newline-delimited JSON HTTP stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header;
use tokio_util::sync::CancellationToken;

use super::{RunnerTask, Status, StatusListener, StreamRunner};
use crate::{config::StreamConfig, retry::sleep_or_cancel, StreamError};

/// Longest status line kept while waiting for its newline.
pub(crate) const MAX_LINE_BYTES: usize = 64 * 1024;

/// Filtered subscription, resolved once at `start`.
#[derive(Clone)]
struct Subscription {
    url: String,
    track: String,
    language: Option<String>,
    authorization: Option<String>,
}

enum StreamEnd {
    Shutdown,
    Closed,
}

/// Forwards statuses from a persistent HTTP subscription, reconnecting
/// after `reconnect_delay_ms` whenever the connection drops.
pub struct LiveStreamRunner {
    config: StreamConfig,
    listener: Arc<dyn StatusListener>,
    http: reqwest::Client,
    task: Option<RunnerTask>,
}

impl std::fmt::Debug for LiveStreamRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStreamRunner")
            .field("live_url", &self.config.live_url)
            .field("keywords", &self.config.keywords)
            .field("bearer_token", &self.config.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("running", &self.task.is_some())
            .finish()
    }
}

impl LiveStreamRunner {
    pub fn new(config: StreamConfig, listener: Arc<dyn StatusListener>) -> Self {
        Self {
            config,
            listener,
            http: reqwest::Client::new(),
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    fn subscription(&self) -> Result<Subscription, StreamError> {
        let url = self
            .config
            .live_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| StreamError::InvalidConfig("live_url is not configured".to_owned()))?;
        if self.config.keywords.is_empty() {
            return Err(StreamError::InvalidConfig(
                "at least one keyword is required".to_owned(),
            ));
        }
        Ok(Subscription {
            url: url.to_owned(),
            track: self.config.keywords.join(","),
            language: self.config.language.clone(),
            authorization: self
                .config
                .bearer_token
                .as_deref()
                .map(normalize_bearer_authorization),
        })
    }
}

#[async_trait]
impl StreamRunner for LiveStreamRunner {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn start(&mut self) -> Result<(), StreamError> {
        if self.task.is_some() {
            return Err(StreamError::AlreadyStarted);
        }
        let subscription = self.subscription()?;
        let http = self.http.clone();
        let listener = Arc::clone(&self.listener);
        let reconnect_delay = Duration::from_millis(self.config.reconnect_delay_ms);

        tracing::info!(
            url = %subscription.url,
            track = %subscription.track,
            "starting live status stream"
        );
        self.task = Some(RunnerTask::spawn(move |shutdown| async move {
            loop {
                match stream_once(&http, &subscription, listener.as_ref(), &shutdown).await {
                    Ok(StreamEnd::Shutdown) => break,
                    Ok(StreamEnd::Closed) => {
                        tracing::warn!(url = %subscription.url, "live stream closed by server")
                    }
                    Err(err) => {
                        tracing::warn!(url = %subscription.url, error = %err, "live stream failed")
                    }
                }
                if sleep_or_cancel(reconnect_delay, Some(&shutdown)).await {
                    break;
                }
                tracing::info!(url = %subscription.url, "reconnecting live status stream");
            }
        }));
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(mut task) = self.task.take() {
            tracing::info!("closing live status stream");
            task.stop(self.name()).await;
        }
    }
}

async fn stream_once(
    http: &reqwest::Client,
    subscription: &Subscription,
    listener: &dyn StatusListener,
    shutdown: &CancellationToken,
) -> Result<StreamEnd, StreamError> {
    let mut request = http
        .get(&subscription.url)
        .query(&[("track", subscription.track.as_str())]);
    if let Some(language) = subscription.language.as_deref() {
        request = request.query(&[("language", language)]);
    }
    if let Some(authorization) = subscription.authorization.as_deref() {
        request = request.header(header::AUTHORIZATION, authorization);
    }

    let response = tokio::select! {
        _ = shutdown.cancelled() => return Ok(StreamEnd::Shutdown),
        response = request.send() => response?,
    };
    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Http {
            status: status.as_u16(),
        });
    }

    let mut body = Box::pin(response.bytes_stream());
    let mut lines = LineBuffer::default();
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return Ok(StreamEnd::Shutdown),
            next = body.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                for line in lines.push(&chunk) {
                    dispatch_line(&line, listener);
                }
            }
            Some(Err(err)) => return Err(err.into()),
            None => {
                if let Some(line) = lines.finish() {
                    dispatch_line(&line, listener);
                }
                return Ok(StreamEnd::Closed);
            }
        }
    }
}

/// Splits a byte stream into newline-terminated lines.
///
/// A line growing past [`MAX_LINE_BYTES`] is dropped up to its newline.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
    discarding: bool,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut complete = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|byte| *byte == b'\n') {
            let (head, tail) = rest.split_at(pos + 1);
            if self.discarding {
                self.discarding = false;
            } else if self.pending.len() + head.len() > MAX_LINE_BYTES + 1 {
                warn_oversized(self.pending.len() + head.len());
                self.pending.clear();
            } else {
                self.pending.extend_from_slice(head);
                complete.push(std::mem::take(&mut self.pending));
            }
            rest = tail;
        }
        if !self.discarding {
            if self.pending.len() + rest.len() > MAX_LINE_BYTES {
                warn_oversized(self.pending.len() + rest.len());
                self.pending.clear();
                self.discarding = true;
            } else {
                self.pending.extend_from_slice(rest);
            }
        }
        complete
    }

    /// Returns the unterminated tail once the stream has ended.
    pub(crate) fn finish(&mut self) -> Option<Vec<u8>> {
        let discarding = std::mem::take(&mut self.discarding);
        let pending = std::mem::take(&mut self.pending);
        (!discarding && !pending.is_empty()).then_some(pending)
    }
}

fn warn_oversized(len: usize) {
    tracing::warn!(
        len,
        limit = MAX_LINE_BYTES,
        "dropping oversized status line"
    );
}

/// Decodes one stream line; blank keep-alive lines yield `None`.
pub(crate) fn decode_line(line: &[u8]) -> Option<Result<Status, serde_json::Error>> {
    let start = line.iter().position(|byte| !byte.is_ascii_whitespace())?;
    let end = line
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(line.len(), |pos| pos + 1);
    Some(serde_json::from_slice(&line[start..end]))
}

fn dispatch_line(line: &[u8], listener: &dyn StatusListener) {
    match decode_line(line) {
        Some(Ok(status)) => listener.on_status(&status),
        Some(Err(err)) => tracing::warn!(error = %err, "skipping undecodable status line"),
        None => {}
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
