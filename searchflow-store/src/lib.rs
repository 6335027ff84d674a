pub mod app_config;
pub mod redis_repo;
pub mod events;

pub use redis_repo::RedisRateStore;
pub use events::EventProducer;
