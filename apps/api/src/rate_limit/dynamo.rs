use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::info;

use crate::config::Config;
use crate::rate_limit::models::RateLimitRecord;
use crate::rate_limit::store::{attr, RateLimitStore, StorageError};

/// Rate-limit records in a DynamoDB table keyed by `key`.
/// The table's TTL attribute must be `ttl`.
pub struct DynamoStore {
    client: Client,
    table: String,
}

impl DynamoStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Constructs a client for AWS, or for DynamoDB Local when
    /// `DYNAMODB_ENDPOINT` is configured.
    pub async fn from_config(config: &Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()));

        if let Some(endpoint) = &config.dynamodb_endpoint {
            info!("Using local DynamoDB endpoint {endpoint}");
            loader = loader
                .endpoint_url(endpoint)
                .credentials_provider(Credentials::new(
                    "local",
                    "local",
                    None,
                    None,
                    "resume-guard-local",
                ));
        }

        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config), config.rate_limits_table.clone())
    }

    fn key_attr(key: &str) -> AttributeValue {
        AttributeValue::S(key.to_string())
    }
}

#[async_trait]
impl RateLimitStore for DynamoStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StorageError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(attr::KEY, Self::key_attr(key))
            .send()
            .await
            .map_err(|e| StorageError::Dynamo(DisplayErrorContext(&e).to_string()))?;

        output.item().map(|item| item_to_record(key, item)).transpose()
    }

    async fn put(&self, record: &RateLimitRecord) -> Result<(), StorageError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .map_err(|e| StorageError::Dynamo(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn update_count(&self, key: &str, count: u32) -> Result<(), StorageError> {
        self.client
            .update_item()
            .table_name(&self.table)
            .key(attr::KEY, Self::key_attr(key))
            .update_expression("SET requestCount = :count")
            .expression_attribute_values(":count", AttributeValue::N(count.to_string()))
            .send()
            .await
            .map_err(|e| StorageError::Dynamo(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn decrement_count(&self, key: &str) -> Result<bool, StorageError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key(attr::KEY, Self::key_attr(key))
            .update_expression("SET requestCount = requestCount - :dec")
            .condition_expression("requestCount > :zero")
            .expression_attribute_values(":dec", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":zero", AttributeValue::N("0".to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            // Missing record or count already at zero.
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(StorageError::Dynamo(DisplayErrorContext(&e).to_string())),
        }
    }
}

fn record_to_item(record: &RateLimitRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (attr::KEY.to_string(), AttributeValue::S(record.key.clone())),
        (
            attr::CALLER_ID.to_string(),
            AttributeValue::S(record.caller_id.clone()),
        ),
        (
            attr::ENDPOINT.to_string(),
            AttributeValue::S(record.endpoint_name.clone()),
        ),
        (
            attr::REQUEST_COUNT.to_string(),
            AttributeValue::N(record.request_count.to_string()),
        ),
        (
            attr::WINDOW_START.to_string(),
            AttributeValue::N(record.window_start.to_string()),
        ),
        (
            attr::EXPIRY.to_string(),
            AttributeValue::N(record.expiry_hint.to_string()),
        ),
    ])
}

fn item_to_record(
    key: &str,
    item: &HashMap<String, AttributeValue>,
) -> Result<RateLimitRecord, StorageError> {
    let string_attr = |name: &str| {
        item.get(name)
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default()
    };

    Ok(RateLimitRecord {
        key: key.to_string(),
        caller_id: string_attr(attr::CALLER_ID),
        endpoint_name: string_attr(attr::ENDPOINT),
        request_count: number_attr(key, item, attr::REQUEST_COUNT)?,
        window_start: number_attr(key, item, attr::WINDOW_START)?,
        expiry_hint: number_attr(key, item, attr::EXPIRY).unwrap_or_default(),
    })
}

fn number_attr<T: FromStr>(
    key: &str,
    item: &HashMap<String, AttributeValue>,
    name: &str,
) -> Result<T, StorageError> {
    let malformed = |reason: String| StorageError::Malformed {
        key: key.to_string(),
        reason,
    };

    let raw = item
        .get(name)
        .and_then(|v| v.as_n().ok())
        .ok_or_else(|| malformed(format!("missing numeric attribute '{name}'")))?;

    raw.parse()
        .map_err(|_| malformed(format!("attribute '{name}' is not a valid number: {raw}")))
}
