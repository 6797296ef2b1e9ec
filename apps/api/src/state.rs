use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::TextCompleter;
use crate::rate_limit::RateLimitGuard;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub guard: RateLimitGuard,
    /// Completion backend. Default: `LlmClient`.
    pub completer: Arc<dyn TextCompleter>,
    pub config: Config,
}
