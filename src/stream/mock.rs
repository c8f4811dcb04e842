//! Synthetic status source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;

use super::{RunnerTask, Status, StatusListener, StatusUser, StreamRunner};
use crate::{config::StreamConfig, retry::sleep_or_cancel, StreamError};

const MOCK_WORDS: &[&str] = &[
    "Lorem",
    "ipsum",
    "dolor",
    "sit",
    "dolor",
    "amet",
    "consectetur",
    "adipiscing",
    "elit",
    "Maecenas",
    "id",
    "sapien",
    "sit",
    "amet",
    "lacus",
    "elementum",
    "pretium",
    "eu",
    "at",
    "eros",
];

/// Same layout as the live stream's `created_at`.
const STATUS_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Builds random statuses mentioning one of the configured keywords.
#[derive(Clone, Debug)]
pub struct StatusGenerator {
    keywords: Vec<String>,
    min_words: usize,
    max_words: usize,
}

impl StatusGenerator {
    pub fn new(
        keywords: Vec<String>,
        min_words: usize,
        max_words: usize,
    ) -> Result<Self, StreamError> {
        if keywords.is_empty() {
            return Err(StreamError::InvalidConfig(
                "at least one keyword is required".to_owned(),
            ));
        }
        if min_words > max_words {
            return Err(StreamError::InvalidConfig(format!(
                "mock_min_tweet_length ({min_words}) exceeds mock_max_tweet_length ({max_words})"
            )));
        }
        Ok(Self {
            keywords,
            min_words,
            max_words,
        })
    }

    pub fn next_status(&self) -> Status {
        let mut rng = rand::thread_rng();
        Status {
            created_at: Utc::now().format(STATUS_DATE_FORMAT).to_string(),
            id: rng.gen_range(0..i64::MAX).to_string(),
            text: self.random_text(&mut rng),
            user: StatusUser {
                id: rng.gen_range(0..i64::MAX).to_string(),
            },
        }
    }

    fn random_text<R: Rng>(&self, rng: &mut R) -> String {
        let length = rng.gen_range(self.min_words..=self.max_words);
        let mut words = Vec::with_capacity(length + 1);
        for index in 0..length {
            words.push(MOCK_WORDS.choose(rng).copied().unwrap_or("Lorem"));
            if index == length / 2 {
                if let Some(keyword) = self.keywords.choose(rng) {
                    words.push(keyword.as_str());
                }
            }
        }
        words.join(" ")
    }
}

/// Emits a generated status every `mock_sleep_ms` on a single background task.
pub struct MockStreamRunner {
    config: StreamConfig,
    listener: Arc<dyn StatusListener>,
    task: Option<RunnerTask>,
}

impl std::fmt::Debug for MockStreamRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStreamRunner")
            .field("keywords", &self.config.keywords)
            .field("running", &self.task.is_some())
            .finish()
    }
}

impl MockStreamRunner {
    pub fn new(config: StreamConfig, listener: Arc<dyn StatusListener>) -> Self {
        Self {
            config,
            listener,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

#[async_trait]
impl StreamRunner for MockStreamRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn start(&mut self) -> Result<(), StreamError> {
        if self.task.is_some() {
            return Err(StreamError::AlreadyStarted);
        }
        let generator = StatusGenerator::new(
            self.config.keywords.clone(),
            self.config.mock_min_tweet_length,
            self.config.mock_max_tweet_length,
        )?;
        let listener = Arc::clone(&self.listener);
        let interval = Duration::from_millis(self.config.mock_sleep_ms);

        tracing::info!(keywords = ?self.config.keywords, "starting mock status stream");
        self.task = Some(RunnerTask::spawn(move |shutdown| async move {
            loop {
                let status = generator.next_status();
                listener.on_status(&status);
                if sleep_or_cancel(interval, Some(&shutdown)).await {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(mut task) = self.task.take() {
            tracing::info!("closing mock status stream");
            task.stop(self.name()).await;
        }
    }
}
