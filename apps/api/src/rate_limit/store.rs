use async_trait::async_trait;
use thiserror::Error;

use crate::rate_limit::models::RateLimitRecord;

/// Attribute names shared by every persistent backend.
pub(crate) mod attr {
    pub const KEY: &str = "key";
    pub const CALLER_ID: &str = "userId";
    pub const ENDPOINT: &str = "endpoint";
    pub const REQUEST_COUNT: &str = "requestCount";
    pub const WINDOW_START: &str = "windowStart";
    pub const EXPIRY: &str = "ttl";
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("DynamoDB error: {0}")]
    Dynamo(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed rate-limit record '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

/// Point lookups and point writes keyed by the composite rate-limit key.
///
/// Record expiry is passive: backends honour `expiry_hint` with their own TTL
/// mechanism and the guard never deletes records.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StorageError>;

    /// Inserts or fully replaces the record stored under `record.key`.
    async fn put(&self, record: &RateLimitRecord) -> Result<(), StorageError>;

    /// Sets `request_count` on an existing record.
    async fn update_count(&self, key: &str, count: u32) -> Result<(), StorageError>;

    /// Decrements `request_count` if the record exists with a positive count.
    /// Returns whether a decrement happened.
    async fn decrement_count(&self, key: &str) -> Result<bool, StorageError>;
}
