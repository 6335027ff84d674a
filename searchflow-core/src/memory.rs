//! In-process test doubles for the collaborator traits, used by the unit and
//! integration tests in place of Redis and Kafka.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::dispatch::{DeliveryId, MessageSink, SinkError};
use crate::model::Period;
use crate::rates::{RateStore, StoreError};

#[derive(Default)]
pub struct InMemoryRateStore {
    rates: HashMap<(String, Period), Decimal>,
    lookups: AtomicUsize,
    failing: bool,
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, currency: &str, period: Period, rate: Decimal) -> Self {
        self.rates.insert((currency.to_string(), period), rate);
        self
    }

    /// Every lookup fails as if the backing store were down.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    async fn lookup_rate(&self, currency: &str, period: Period) -> Result<Option<Decimal>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(StoreError::Unavailable("in-memory store set to fail".to_string()));
        }
        Ok(self.rates.get(&(currency.to_string(), period)).copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

/// Records every message it accepts.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentMessage>>,
    rejected_keys: HashSet<(String, String)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse messages with `key` on `topic`.
    pub fn rejecting(mut self, topic: &str, key: &str) -> Self {
        self.rejected_keys.insert((topic.to_string(), key.to_string()));
        self
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, topic: &str) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.topic == topic).collect()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<DeliveryId, SinkError> {
        if self.rejected_keys.contains(&(topic.to_string(), key.to_string())) {
            return Err(SinkError(format!("{} rejected by {}", key, topic)));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| SinkError("recording sink poisoned".to_string()))?;
        sent.push(SentMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
        });
        Ok(DeliveryId(format!("{}/{}", topic, sent.len() - 1)))
    }
}
