pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::enhancement::handlers::handle_improve_section;
use crate::public::handlers::handle_check_text;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Authenticated AI features, limited per user
        .route("/api/v1/ai/improve-section", post(handle_improve_section))
        // Anonymous features, limited per IP
        .route("/api/v1/public/check-text", post(handle_check_text))
        .with_state(state)
}
