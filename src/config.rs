use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{ConfigError, RetryPolicy, TopicSpec};

const ENV_PREFIX: &str = "KAFKA_BOOTSTRAP";
const DEFAULT_CONFIG_FILE: &str = "config/application";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub schema_registry_url: String,
    pub topic_names_to_create: Vec<String>,
    #[serde(default = "default_count")]
    pub num_of_partitions: u32,
    #[serde(default = "default_count")]
    pub replication_factor: u32,
    #[serde(default = "default_admin_timeout_ms")]
    pub admin_timeout_ms: u64,
    #[serde(default = "default_registry_timeout_ms")]
    pub registry_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:19092".to_owned(),
            schema_registry_url: "http://localhost:8081/subjects".to_owned(),
            topic_names_to_create: vec!["twitter-topic".to_owned()],
            num_of_partitions: default_count(),
            replication_factor: default_count(),
            admin_timeout_ms: default_admin_timeout_ms(),
            registry_timeout_ms: default_registry_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub keywords: Vec<String>,
    pub welcome_message: String,
    /// Selects the synthetic source instead of the live subscription.
    pub enable_mock_tweets: bool,
    pub mock_sleep_ms: u64,
    pub mock_min_tweet_length: usize,
    pub mock_max_tweet_length: usize,
    /// Endpoint serving newline-delimited JSON statuses.
    pub live_url: Option<String>,
    pub bearer_token: Option<String>,
    pub language: Option<String>,
    pub reconnect_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            welcome_message: String::new(),
            enable_mock_tweets: true,
            mock_sleep_ms: 10_000,
            mock_min_tweet_length: 5,
            mock_max_tweet_length: 15,
            live_url: None,
            bearer_token: None,
            language: None,
            reconnect_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is not set.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            json: false,
        }
    }
}

const fn default_count() -> u32 {
    1
}

const fn default_admin_timeout_ms() -> u64 {
    10_000
}

const fn default_registry_timeout_ms() -> u64 {
    crate::DEFAULT_PROBE_TIMEOUT_MS
}

impl AppConfig {
    /// Loads `config/application.*` (optional) overlaid with
    /// `KAFKA_BOOTSTRAP__*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(
            Config::builder().add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        )
    }

    /// Loads an explicit configuration file, still overlaid with the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_builder(Config::builder().add_source(File::from(path.as_ref())))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("kafka.topic_names_to_create")
                    .with_list_parse_key("stream.keywords"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.topic_specs()?;
        Ok(())
    }

    /// Builds one spec per configured topic name, in configured order.
    pub fn topic_specs(&self) -> Result<Vec<TopicSpec>, ConfigError> {
        if self.kafka.topic_names_to_create.is_empty() {
            return Err(ConfigError::InvalidTopic(
                "no topic names configured".to_owned(),
            ));
        }
        self.kafka
            .topic_names_to_create
            .iter()
            .map(|name| {
                TopicSpec::new(
                    name,
                    self.kafka.num_of_partitions,
                    self.kafka.replication_factor,
                )
            })
            .collect()
    }
}
