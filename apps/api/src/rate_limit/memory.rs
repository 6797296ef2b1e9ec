use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::rate_limit::models::RateLimitRecord;
use crate::rate_limit::store::{RateLimitStore, StorageError};

/// Process-local record store for local development and tests.
///
/// Limits are per-process, not shared across instances. Records whose
/// `expiry_hint` has passed are dropped on the next `put`, judged by the
/// writer's clock (`window_start` of the incoming record).
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StorageError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn put(&self, record: &RateLimitRecord) -> Result<(), StorageError> {
        let now_secs = record.window_start.div_euclid(1000);
        let mut records = self.records.lock().await;
        records.retain(|_, existing| existing.expiry_hint >= now_secs);
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn update_count(&self, key: &str, count: u32) -> Result<(), StorageError> {
        if let Some(record) = self.records.lock().await.get_mut(key) {
            record.request_count = count;
        }
        Ok(())
    }

    async fn decrement_count(&self, key: &str) -> Result<bool, StorageError> {
        match self.records.lock().await.get_mut(key) {
            Some(record) if record.request_count > 0 => {
                record.request_count -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
