use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use rust_decimal::Decimal;
use searchflow_core::model::Period;
use searchflow_core::rates::{RateStore, StoreError};
use std::str::FromStr;
use tracing::{debug, info};

/// Exchange-rate cache kept in Redis as `<prefix>:<CURRENCY>:<YYYY-MM>` -> decimal string.
#[derive(Clone)]
pub struct RedisRateStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRateStore {
    pub async fn new(connection_string: &str, key_prefix: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            key_prefix: key_prefix.to_string(),
        })
    }

    pub fn rate_key(&self, currency: &str, period: Period) -> String {
        format!("{}:{}:{}", self.key_prefix, currency.to_ascii_uppercase(), period)
    }

    pub async fn get_rate(&self, currency: &str, period: Period) -> RedisResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.get(self.rate_key(currency, period)).await
    }

    /// Seeds a rate. Regular population is done by the rate fetch job.
    pub async fn put_rate(&self, currency: &str, period: Period, rate: Decimal) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = self.rate_key(currency, period);
        conn.set::<_, _, ()>(&key, rate.to_string()).await?;
        info!("Rate stored: {} -> {}", key, rate);
        Ok(())
    }
}

#[async_trait]
impl RateStore for RedisRateStore {
    async fn lookup_rate(&self, currency: &str, period: Period) -> Result<Option<Decimal>, StoreError> {
        let stored = self
            .get_rate(currency, period)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        debug!(currency, %period, hit = stored.is_some(), "Rate cache lookup");

        stored
            .map(|value| parse_rate(&self.rate_key(currency, period), &value))
            .transpose()
    }
}

fn parse_rate(key: &str, value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value.trim()).map_err(|_| StoreError::Malformed {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_rate_key_layout() {
        // Opening a client does not connect.
        let store = RedisRateStore::new("redis://127.0.0.1/", "rate").await.unwrap();
        let period = Period::new(2024, 3).unwrap();
        assert_eq!(store.rate_key("usd", period), "rate:USD:2024-03");
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("rate:USD:2024-03", "1.0832").unwrap(), dec!(1.0832));
        assert_eq!(parse_rate("rate:JPY:2024-03", " 162.85\n").unwrap(), dec!(162.85));
        assert!(matches!(
            parse_rate("rate:USD:2024-03", "n/a"),
            Err(StoreError::Malformed { .. })
        ));
    }
}
