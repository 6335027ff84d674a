use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

/// The two logical destinations of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelName {
    /// Every decoded record, before enrichment.
    Backup,
    /// Every enriched record.
    Output,
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelName::Backup => f.write_str("backup"),
            ChannelName::Output => f.write_str("output"),
        }
    }
}

/// Opaque identifier handed back by the sink for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryId(pub String);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Transport that delivers serialized records to a topic.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<DeliveryId, SinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize record {key} for {channel}: {source}")]
    Serialize {
        channel: ChannelName,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to deliver record {key} to {channel} ({topic}): {source}")]
    Delivery {
        channel: ChannelName,
        topic: String,
        key: String,
        #[source]
        source: SinkError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTopics {
    pub backup: String,
    pub output: String,
}

pub struct Dispatcher {
    sink: Arc<dyn MessageSink>,
    topics: ChannelTopics,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn MessageSink>, topics: ChannelTopics) -> Self {
        Self { sink, topics }
    }

    pub fn topic(&self, channel: ChannelName) -> &str {
        match channel {
            ChannelName::Backup => &self.topics.backup,
            ChannelName::Output => &self.topics.output,
        }
    }

    /// Serializes `payload` as JSON and hands it to the channel's topic.
    pub async fn publish<T>(&self, channel: ChannelName, key: &str, payload: &T) -> Result<DeliveryId, PublishError>
    where
        T: Serialize + Sync,
    {
        let body = serde_json::to_string(payload).map_err(|source| PublishError::Serialize {
            channel,
            key: key.to_string(),
            source,
        })?;
        let topic = self.topic(channel);

        match self.sink.send(topic, key, &body).await {
            Ok(delivery) => {
                debug!(%channel, topic, key, %delivery, "Record published");
                Ok(delivery)
            }
            Err(source) => {
                error!(%channel, topic, key, error = %source, "Failed to publish record");
                Err(PublishError::Delivery {
                    channel,
                    topic: topic.to_string(),
                    key: key.to_string(),
                    source,
                })
            }
        }
    }
}
