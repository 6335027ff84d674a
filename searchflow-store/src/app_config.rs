use searchflow_core::dispatch::ChannelTopics;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_rate_key_prefix")]
    pub rate_key_prefix: String,
}

fn default_rate_key_prefix() -> String { "rate".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub group_id: String,
    pub input_topic: String,
    pub backup_topic: String,
    pub output_topic: String,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
}

fn default_message_timeout_ms() -> u64 { 5000 }

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_wait_ms")]
    pub batch_wait_ms: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub sort_by_search_time: bool,
}

fn default_batch_size() -> usize { 100 }
fn default_batch_wait_ms() -> u64 { 1000 }
fn default_concurrency() -> usize { 8 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_wait_ms: default_batch_wait_ms(),
            concurrency: default_concurrency(),
            sort_by_search_time: false,
        }
    }
}

impl KafkaConfig {
    pub fn channel_topics(&self) -> ChannelTopics {
        ChannelTopics {
            backup: self.backup_topic.clone(),
            output: self.output_topic.clone(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `SEARCHFLOW_KAFKA__BROKERS=broker:9092`
            .add_source(config::Environment::with_prefix("SEARCHFLOW").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
