//! Fakes shared by handler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use serde_json::Value;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::Config;
use crate::llm_client::{CompletionOptions, LlmError, TextCompleter};
use crate::rate_limit::memory::InMemoryStore;
use crate::rate_limit::RateLimitGuard;
use crate::state::AppState;

/// Completer that returns a fixed reply, or fails when given `None`.
pub struct ScriptedCompleter {
    reply: Option<String>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<(String, String)>>,
}

impl ScriptedCompleter {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(system, prompt)` of the most recent call.
    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextCompleter for ScriptedCompleter {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        _options: CompletionOptions,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some((system.to_string(), prompt.to_string()));
        self.reply.clone().ok_or(LlmError::Api {
            status: 529,
            message: "overloaded".to_string(),
        })
    }
}

/// Formatted log output collected by [`capture_logs`].
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Routes events on the current thread into a buffer until the guard drops.
/// `#[tokio::test]` runs handlers on the test thread, so their events land here.
pub fn capture_logs() -> (DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}

/// Memory-backed config with the given per-endpoint limits.
pub fn test_config(ai_max: u32, public_max: u32) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("ANTHROPIC_API_KEY", "sk-test".to_string()),
        ("STORE_BACKEND", "memory".to_string()),
        ("AI_RATE_LIMIT_MAX", ai_max.to_string()),
        ("PUBLIC_RATE_LIMIT_MAX", public_max.to_string()),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn test_state(completer: Arc<dyn TextCompleter>, config: Config) -> (AppState, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let state = AppState {
        guard: RateLimitGuard::new(store.clone()),
        completer,
        config,
    };
    (state, store)
}

pub fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
