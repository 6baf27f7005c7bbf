// Durable key-value storage trait
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored value for {key} is corrupt: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Stored value for `key`, `None` if it was never written.
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value for `key`; returns once the value is durable.
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
