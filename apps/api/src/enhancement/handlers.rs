use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::enhancement::prompts::{section_improvement_prompt, section_improvement_system};
use crate::errors::AppError;
use crate::llm_client::CompletionOptions;
use crate::rate_limit::guard::now_millis;
use crate::sanitizer::{
    classify, sanitize_language, sanitize_section_type, sanitize_user_input, validate_improved_text,
    validate_input, validate_input_large, validate_text_length, IMPROVED_TEXT_MAX_CHARS,
    MULTILINE_MAX_CHARS,
};
use crate::state::AppState;
use crate::telemetry::log_suspicious_activity;

/// Rate-limit bucket name for this endpoint.
pub const IMPROVE_SECTION_ENDPOINT: &str = "improve-section";

#[derive(Debug, Deserialize)]
pub struct ImproveSectionRequest {
    pub user_id: String,
    pub section_type: String,
    pub original_text: String,
    pub instructions: String,
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImproveSectionResponse {
    pub improved_text: String,
    /// True when the model output failed validation and the original is returned.
    pub fallback: bool,
    pub remaining: u32,
    pub reset_time: i64,
}

/// POST /api/v1/ai/improve-section
pub async fn handle_improve_section(
    State(state): State<AppState>,
    Json(req): Json<ImproveSectionRequest>,
) -> Result<Json<ImproveSectionResponse>, AppError> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let decision = state
        .guard
        .check_rate_limit(user_id, IMPROVE_SECTION_ENDPOINT, state.config.ai_policy)
        .await;
    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs(now_millis()),
        });
    }

    let Some(section) = sanitize_section_type(&req.section_type) else {
        log_suspicious_activity(
            user_id,
            IMPROVE_SECTION_ENDPOINT,
            "Invalid section type",
            Some(&req.section_type),
        );
        return Err(AppError::Validation("Invalid section type".to_string()));
    };
    let language = sanitize_language(req.language.as_deref().unwrap_or_default());

    let instructions = sanitize_user_input(&req.instructions);
    let verdict = validate_input(&instructions);
    if !verdict.is_valid {
        let reason = verdict.reason.unwrap_or_default();
        return match classify(&instructions) {
            Some(category) => {
                log_suspicious_activity(
                    user_id,
                    IMPROVE_SECTION_ENDPOINT,
                    &format!("{reason} ({category})"),
                    Some(&req.instructions),
                );
                Err(AppError::InvalidInput)
            }
            None => Err(AppError::Validation(reason)),
        };
    }

    if req.original_text.trim().is_empty() {
        return Err(AppError::Validation("Original text is required".to_string()));
    }
    // Bounds the marker-stripping work done while building the prompt.
    let original_check = validate_input_large(&req.original_text, MULTILINE_MAX_CHARS);
    if !original_check.is_valid {
        return Err(AppError::Validation(
            original_check.reason.unwrap_or_default(),
        ));
    }

    let system = section_improvement_system(section, language);
    let prompt = section_improvement_prompt(section, &req.original_text, &instructions);

    let improved = match state
        .completer
        .complete(&system, &prompt, CompletionOptions::REWRITE)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            // The user should not pay for our upstream failure.
            state
                .guard
                .refund_rate_limit(user_id, IMPROVE_SECTION_ENDPOINT)
                .await;
            return Err(e.into());
        }
    };

    let output = validate_improved_text(&improved, &req.original_text, false);
    let (improved_text, fallback) = if !output.is_valid {
        warn!(
            user_id,
            reason = output.reason.as_deref().unwrap_or_default(),
            "AI output validation failed, returning original text"
        );
        (req.original_text, true)
    } else if !validate_text_length(&improved, IMPROVED_TEXT_MAX_CHARS) {
        warn!(user_id, "Improved text exceeds maximum length, returning original text");
        (req.original_text, true)
    } else {
        (improved.trim().to_string(), false)
    };

    info!(
        user_id,
        section = section.as_str(),
        fallback,
        remaining = decision.remaining,
        "Section improvement completed"
    );

    Ok(Json(ImproveSectionResponse {
        improved_text,
        fallback,
        remaining: decision.remaining,
        reset_time: decision.reset_time,
    }))
}
