use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};

use crate::rate_limit::models::RateLimitRecord;
use crate::rate_limit::store::{attr, RateLimitStore, StorageError};

const KEY_PREFIX: &str = "ratelimit";

// Only touches hashes that already exist so a record evicted between the read
// and the write is not resurrected without its EXPIREAT.
const UPDATE_COUNT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
    return 1
end
return 0
"#;

const DECREMENT_SCRIPT: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], ARGV[1]))
if current and current > 0 then
    redis.call('HINCRBY', KEYS[1], ARGV[1], -1)
    return 1
end
return 0
"#;

/// One Redis hash per rate-limit key, expired with `EXPIREAT expiry_hint`.
pub struct RedisStore {
    client: Client,
    update_script: Script,
    decrement_script: Script,
}

impl RedisStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            update_script: Script::new(UPDATE_COUNT_SCRIPT),
            decrement_script: Script::new(DECREMENT_SCRIPT),
        }
    }

    pub fn open(url: &str) -> Result<Self, StorageError> {
        Ok(Self::new(Client::open(url)?))
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StorageError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

fn redis_key(key: &str) -> String {
    format!("{KEY_PREFIX}:{key}")
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StorageError> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(redis_key(key)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        fields_to_record(key, &fields).map(Some)
    }

    async fn put(&self, record: &RateLimitRecord) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let k = redis_key(&record.key);

        // DEL first so a replaced window never inherits stale fields.
        let _: () = redis::pipe()
            .atomic()
            .del(&k)
            .ignore()
            .hset_multiple(
                &k,
                &[
                    (attr::CALLER_ID, record.caller_id.clone()),
                    (attr::ENDPOINT, record.endpoint_name.clone()),
                    (attr::REQUEST_COUNT, record.request_count.to_string()),
                    (attr::WINDOW_START, record.window_start.to_string()),
                    (attr::EXPIRY, record.expiry_hint.to_string()),
                ],
            )
            .ignore()
            .cmd("EXPIREAT")
            .arg(&k)
            .arg(record.expiry_hint)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn update_count(&self, key: &str, count: u32) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let _: i64 = self
            .update_script
            .key(redis_key(key))
            .arg(attr::REQUEST_COUNT)
            .arg(count)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn decrement_count(&self, key: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection().await?;
        let decremented: i64 = self
            .decrement_script
            .key(redis_key(key))
            .arg(attr::REQUEST_COUNT)
            .invoke_async(&mut conn)
            .await?;
        Ok(decremented == 1)
    }
}

fn fields_to_record(
    key: &str,
    fields: &HashMap<String, String>,
) -> Result<RateLimitRecord, StorageError> {
    let number = |name: &str| -> Result<i64, StorageError> {
        fields
            .get(name)
            .and_then(|raw| raw.parse::<i64>().ok())
            .ok_or_else(|| StorageError::Malformed {
                key: key.to_string(),
                reason: format!("field '{name}' is missing or not a number"),
            })
    };

    let request_count =
        u32::try_from(number(attr::REQUEST_COUNT)?).map_err(|_| StorageError::Malformed {
            key: key.to_string(),
            reason: "requestCount out of range".to_string(),
        })?;

    Ok(RateLimitRecord {
        key: key.to_string(),
        caller_id: fields.get(attr::CALLER_ID).cloned().unwrap_or_default(),
        endpoint_name: fields.get(attr::ENDPOINT).cloned().unwrap_or_default(),
        request_count,
        window_start: number(attr::WINDOW_START)?,
        expiry_hint: number(attr::EXPIRY).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_keys_are_prefixed() {
        assert_eq!(redis_key("u-ai"), "ratelimit:u-ai");
    }

    #[test]
    fn test_fields_to_record() {
        let record = fields_to_record(
            "u-ai",
            &fields(&[
                ("userId", "u"),
                ("endpoint", "ai"),
                ("requestCount", "3"),
                ("windowStart", "1700000000000"),
                ("ttl", "1700003600"),
            ]),
        )
        .unwrap();
        assert_eq!(record.request_count, 3);
        assert_eq!(record.window_start, 1_700_000_000_000);
        assert_eq!(record.expiry_hint, 1_700_003_600);
        assert_eq!(record.caller_id, "u");
    }

    #[test]
    fn test_negative_count_is_malformed() {
        let err = fields_to_record(
            "k",
            &fields(&[("requestCount", "-1"), ("windowStart", "0")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_missing_window_start_is_malformed() {
        assert!(fields_to_record("k", &fields(&[("requestCount", "1")])).is_err());
    }
}
