use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

use crate::rate_limit::RateLimitPolicy;

const DEFAULT_RATE_LIMITS_TABLE: &str = "getquickresume-api-rate-limits-dev";
const ONE_DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Which persistence backend holds rate-limit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    DynamoDb,
    Redis,
    /// Process-local map. Counters are not shared between instances.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dynamodb" | "dynamo" => Ok(Self::DynamoDb),
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!(
                "Unknown STORE_BACKEND '{other}' (expected dynamodb, redis or memory)"
            )),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub store_backend: StoreBackend,
    pub rate_limits_table: String,
    pub aws_region: String,
    /// Set for DynamoDB Local; static placeholder credentials are used with it.
    pub dynamodb_endpoint: Option<String>,
    pub redis_url: Option<String>,
    pub anthropic_api_key: String,
    /// Per-user policy for the AI-backed endpoints.
    pub ai_policy: RateLimitPolicy,
    /// Per-IP policy for anonymous public endpoints.
    pub public_policy: RateLimitPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_backend = match lookup("STORE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StoreBackend::DynamoDb,
        };

        let redis_url = lookup("REDIS_URL");
        if store_backend == StoreBackend::Redis && redis_url.is_none() {
            bail!("REDIS_URL is required when STORE_BACKEND=redis");
        }

        let anthropic_api_key = lookup("ANTHROPIC_API_KEY")
            .context("Required environment variable 'ANTHROPIC_API_KEY' is not set")?;

        Ok(Config {
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            store_backend,
            rate_limits_table: lookup("RATE_LIMITS_TABLE")
                .unwrap_or_else(|| DEFAULT_RATE_LIMITS_TABLE.to_string()),
            aws_region: lookup("AWS_REGION")
                .or_else(|| lookup("REGION"))
                .unwrap_or_else(|| "us-east-1".to_string()),
            dynamodb_endpoint: lookup("DYNAMODB_ENDPOINT").filter(|v| !v.is_empty()),
            redis_url,
            anthropic_api_key,
            ai_policy: RateLimitPolicy::new(
                parse_or(&lookup, "AI_RATE_LIMIT_MAX", 5)?,
                parse_or(&lookup, "AI_RATE_LIMIT_WINDOW_MS", 60_000)?,
            ),
            public_policy: RateLimitPolicy::new(
                parse_or(&lookup, "PUBLIC_RATE_LIMIT_MAX", 3)?,
                parse_or(&lookup, "PUBLIC_RATE_LIMIT_WINDOW_MS", ONE_DAY_MS)?,
            ),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
