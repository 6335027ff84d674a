use std::sync::Arc;
use anyhow::Context;
use searchflow_core::{Dispatcher, Pipeline};
use searchflow_store::{app_config::Config, EventProducer, RedisRateStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "searchflow_worker=info,searchflow_core=info,searchflow_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(
        "Starting search worker: {} -> {} / {}",
        config.kafka.input_topic,
        config.kafka.backup_topic,
        config.kafka.output_topic
    );

    // Redis rate cache
    let rates = RedisRateStore::new(&config.redis.url, &config.redis.rate_key_prefix)
        .await
        .context("Failed to open Redis client")?;

    // Kafka producer for both output channels
    let producer = EventProducer::new(&config.kafka.brokers, config.kafka.message_timeout_ms)
        .context("Failed to create Kafka producer")?;

    let dispatcher = Dispatcher::new(Arc::new(producer), config.kafka.channel_topics());
    let pipeline = Pipeline::new(Arc::new(rates), dispatcher)
        .with_concurrency(config.pipeline.concurrency);

    worker::run(&config.kafka, &config.pipeline, pipeline).await
}
