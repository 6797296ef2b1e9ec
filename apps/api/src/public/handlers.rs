use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::rate_limit::client_ip::extract_client_ip;
use crate::rate_limit::guard::now_millis;
use crate::sanitizer::{
    classify, sanitize_user_input, sanitize_user_multiline, validate_input, validate_input_large,
    SanitizationVerdict, MULTILINE_MAX_CHARS,
};
use crate::state::AppState;
use crate::telemetry::log_public_suspicious_activity;

pub const CHECK_TEXT_ENDPOINT: &str = "public-check-text";

#[derive(Debug, Deserialize)]
pub struct CheckTextRequest {
    pub text: String,
    #[serde(default)]
    pub multiline: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckTextResponse {
    #[serde(flatten)]
    pub verdict: SanitizationVerdict,
    pub sanitized_text: String,
    pub remaining: u32,
    pub reset_time: i64,
}

/// POST /api/v1/public/check-text
pub async fn handle_check_text(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<CheckTextRequest>,
) -> Result<Json<CheckTextResponse>, AppError> {
    let ip = extract_client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));

    let decision = state
        .guard
        .check_ip_rate_limit(&ip, CHECK_TEXT_ENDPOINT, state.config.public_policy)
        .await;
    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs(now_millis()),
        });
    }

    let (sanitized_text, verdict) = if req.multiline {
        let text = sanitize_user_multiline(&req.text, MULTILINE_MAX_CHARS);
        let verdict = validate_input_large(&text, MULTILINE_MAX_CHARS);
        (text, verdict)
    } else {
        let text = sanitize_user_input(&req.text);
        let verdict = validate_input(&text);
        (text, verdict)
    };

    if !verdict.is_valid {
        let reason = verdict.reason.as_deref().unwrap_or_default();
        let reason = match classify(&sanitized_text) {
            Some(category) if !req.multiline => format!("{reason} ({category})"),
            _ => reason.to_string(),
        };
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok());
        log_public_suspicious_activity(&ip, CHECK_TEXT_ENDPOINT, &reason, user_agent);
    }

    Ok(Json(CheckTextResponse {
        verdict,
        sanitized_text,
        remaining: decision.remaining,
        reset_time: decision.reset_time,
    }))
}
