use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{config, offer};
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router
///
/// CORS, rate limiting and security headers are applied in main.rs
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Prompt sections
        .route(
            "/api/prompt/sections/default",
            get(config::get_default_sections),
        )
        .route("/api/prompt/sections", post(config::set_prompt_sections))
        // Provider selection
        .route(
            "/api/providers/available",
            get(config::get_available_providers),
        )
        .route("/api/providers/current", get(config::get_current_providers))
        .route("/api/providers/stt", post(config::switch_stt_provider))
        .route("/api/providers/llm", post(config::switch_llm_provider))
        // Transcription timing
        .route(
            "/api/config/stt-timeout",
            get(config::get_stt_timeout).post(config::set_stt_timeout),
        )
        // Connection negotiation
        .route("/api/offer", post(offer::handle_offer))
        .layer(TraceLayer::new_for_http())
}
