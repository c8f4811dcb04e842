use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use kafka_bootstrap::{
    kafka::KafkaAdminClient,
    stream::{runner_from_config, LoggingStatusListener},
    telemetry::init_tracing,
    AppConfig, ReadinessCoordinator, RegistryHttpClient,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("kafka-bootstrap: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_tracing(&config.logging) {
        eprintln!("kafka-bootstrap: {err}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "kafka-bootstrap failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> anyhow::Result<AppConfig> {
    match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from(&path)
            .with_context(|| format!("failed to load configuration from {path}")),
        None => AppConfig::load().context("failed to load configuration"),
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(keywords = ?config.stream.keywords, "app is starting");
    if !config.stream.welcome_message.is_empty() {
        tracing::info!("{}", config.stream.welcome_message);
    }

    let broker = KafkaAdminClient::new(&config.kafka.bootstrap_servers, config.kafka.admin_timeout_ms)
        .context("failed to create kafka admin client")?;
    let registry = RegistryHttpClient::new().with_timeout_ms(config.kafka.registry_timeout_ms);
    let coordinator = ReadinessCoordinator::new(
        broker,
        registry,
        config.retry.clone(),
        config.topic_specs()?,
        config.kafka.schema_registry_url.clone(),
    )
    .context("invalid retry policy")?;

    tracing::info!(
        topics = ?config.kafka.topic_names_to_create,
        max_attempts = config.retry.max_attempts,
        "waiting for kafka cluster"
    );
    coordinator
        .bootstrap()
        .await
        .map_err(|err| {
            let kind = err.kind();
            anyhow::Error::new(err).context(format!("bootstrap failed ({kind})"))
        })?;

    let mut runner = runner_from_config(&config.stream, Arc::new(LoggingStatusListener));
    let started = runner.start().await;
    let outcome = match started {
        Ok(()) => tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal"),
        Err(err) => Err(err).context("failed to start status stream"),
    };

    tracing::info!(runner = runner.name(), "shutting down");
    runner.shutdown().await;
    outcome
}
