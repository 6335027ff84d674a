use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use searchflow_core::{order_by_search_time, Pipeline, RawLine};
use searchflow_store::app_config::{KafkaConfig, PipelineConfig};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Consumes raw search lines and feeds them to the pipeline in batches.
pub async fn run(kafka: &KafkaConfig, settings: &PipelineConfig, pipeline: Pipeline) -> anyhow::Result<()> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &kafka.brokers)
        .set("group.id", &kafka.group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()?;

    consumer.subscribe(&[kafka.input_topic.as_str()])?;

    info!("Search worker started, listening to {}...", kafka.input_topic);

    let wait = Duration::from_millis(settings.batch_wait_ms);
    loop {
        let mut batch = next_batch(&consumer, settings.batch_size.max(1), wait).await;
        if batch.is_empty() {
            continue;
        }
        if settings.sort_by_search_time {
            order_by_search_time(&mut batch);
        }

        let report = pipeline.process_batch(batch).await;
        if !report.is_clean() {
            let summary = report.summary();
            warn!(
                batch_id = %report.batch_id,
                decode_failures = summary.decode_failures,
                enrich_failures = summary.enrich_failures,
                backup_failed = summary.backup.failed,
                output_failed = summary.output.failed,
                "Batch finished with failures"
            );
        }
    }
}

/// Collects up to `size` payloads, or whatever arrived once `wait` elapses.
async fn next_batch(consumer: &StreamConsumer, size: usize, wait: Duration) -> Vec<RawLine> {
    let mut batch = Vec::with_capacity(size);
    let deadline = sleep(wait);
    tokio::pin!(deadline);

    while batch.len() < size {
        tokio::select! {
            message = consumer.recv() => match message {
                Err(e) => error!("Kafka error: {}", e),
                Ok(m) => match m.payload_view::<str>() {
                    Some(Ok(payload)) => batch.push(RawLine::from_payload(payload)),
                    Some(Err(e)) => error!("Error reading payload: {}", e),
                    None => debug!("Skipping message without payload"),
                },
            },
            _ = &mut deadline => break,
        }
    }

    batch
}
