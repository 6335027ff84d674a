use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::Period;

/// Prices in this currency are never converted.
pub const BASE_CURRENCY: &str = "EUR";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("rate store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed rate {value:?} stored under {key}")]
    Malformed { key: String, value: String },
}

/// Read-only access to the exchange-rate cache.
///
/// Rates are expressed as units of `currency` per 1 EUR.
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn lookup_rate(&self, currency: &str, period: Period) -> Result<Option<Decimal>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("no exchange rate for {currency} in {period}")]
    NotFound { currency: String, period: Period },
    #[error("exchange rate lookup for {currency} in {period} failed: {source}")]
    Lookup {
        currency: String,
        period: Period,
        #[source]
        source: StoreError,
    },
}

/// Resolves rates for one batch, remembering every answer the store gave.
pub struct RateResolver {
    store: Arc<dyn RateStore>,
    cache: RwLock<HashMap<(String, Period), Option<Decimal>>>,
}

impl RateResolver {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn resolve_rate(&self, currency: &str, period: Period) -> Result<Decimal, RateError> {
        if currency == BASE_CURRENCY {
            return Ok(Decimal::ONE);
        }

        let key = (currency.to_string(), period);
        let cached = self.cache.read().await.get(&key).copied();
        let rate = match cached {
            Some(rate) => rate,
            None => {
                let rate = self
                    .store
                    .lookup_rate(currency, period)
                    .await
                    .map_err(|source| RateError::Lookup {
                        currency: currency.to_string(),
                        period,
                        source,
                    })?;
                debug!(currency, %period, found = rate.is_some(), "Rate fetched from store");
                self.cache.write().await.insert(key, rate);
                rate
            }
        };

        rate.ok_or_else(|| RateError::NotFound {
            currency: currency.to_string(),
            period,
        })
    }

    /// Number of (currency, period) pairs answered so far.
    pub async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }
}
