pub mod config;
pub mod error;
pub mod kv;

pub use config::{
    CacheBackend, CacheConfig, Config, Environment, SearchConfig, ServerConfig, StoreConfig,
    ValidationResult, WeatherConfig,
};
pub use error::{AppError, CacheError, StoreError, ValidationError};
pub use kv::{KeyValueCache, MemoryCache, SqliteCache};

use anyhow::Result;

/// Initialize logging for the service.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    tracing::info!("propsearch core initialized");
    Ok(())
}
