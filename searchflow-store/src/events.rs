use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use searchflow_core::dispatch::{DeliveryId, MessageSink, SinkError};
use std::time::Duration;
use tracing::{info, error};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str, message_timeout_ms: u64) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", message_timeout_ms.to_string())
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<DeliveryId, rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                let partition = delivery.partition;
                let offset = delivery.offset;
                info!("Sent message to {}/{}: partition {} offset {}", topic, key, partition, offset);
                Ok(delivery_id(topic, partition, offset))
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl MessageSink for EventProducer {
    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<DeliveryId, SinkError> {
        self.publish(topic, key, payload)
            .await
            .map_err(|e| SinkError(e.to_string()))
    }
}

/// `topic/partition/offset`, unique per accepted message.
fn delivery_id(topic: &str, partition: i32, offset: i64) -> DeliveryId {
    DeliveryId(format!("{}/{}/{}", topic, partition, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_id_format() {
        assert_eq!(delivery_id("searches.enriched", 2, 1041).to_string(), "searches.enriched/2/1041");
    }

    #[tokio::test]
    async fn test_producer_builds_without_broker() {
        // librdkafka connects lazily, so creation succeeds with nothing listening.
        assert!(EventProducer::new("localhost:9092", 5000).is_ok());
    }
}
