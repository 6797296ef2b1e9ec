mod config;
mod enhancement;
mod errors;
mod llm_client;
mod public;
mod rate_limit;
mod routes;
mod sanitizer;
mod state;
mod telemetry;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StoreBackend};
use crate::llm_client::LlmClient;
use crate::rate_limit::dynamo::DynamoStore;
use crate::rate_limit::memory::InMemoryStore;
use crate::rate_limit::redis_store::RedisStore;
use crate::rate_limit::{RateLimitGuard, RateLimitStore};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume-guard v{}", env!("CARGO_PKG_VERSION"));

    let store = build_store(&config).await?;
    let guard = RateLimitGuard::new(store);

    let llm = LlmClient::new(config.anthropic_api_key.clone())
        .context("Failed to build HTTP client for the LLM API")?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let state = AppState {
        guard,
        completer: Arc::new(llm),
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Opens the configured rate-limit backend.
async fn build_store(config: &Config) -> Result<Arc<dyn RateLimitStore>> {
    let store: Arc<dyn RateLimitStore> = match config.store_backend {
        StoreBackend::DynamoDb => {
            info!(
                table = %config.rate_limits_table,
                region = %config.aws_region,
                "Using DynamoDB rate-limit store"
            );
            Arc::new(DynamoStore::from_config(config).await)
        }
        StoreBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("REDIS_URL is required when STORE_BACKEND=redis")?;
            info!("Using Redis rate-limit store");
            Arc::new(RedisStore::open(url)?)
        }
        StoreBackend::Memory => {
            info!("Using in-memory rate-limit store (limits are per process)");
            Arc::new(InMemoryStore::new())
        }
    };
    Ok(store)
}
