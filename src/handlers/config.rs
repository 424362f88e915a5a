//! Runtime configuration endpoints
//!
//! Every mutating endpoint answers HTTP 200 with a `success` flag. Expected
//! failures (nothing initialized yet, unknown provider, timeout out of range)
//! are reported in `error` instead of an error status.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::prompt::{DefaultPromptSections, PromptSections};
use crate::core::provider::ProviderRole;
use crate::gateway::{ActiveSelection, AvailableProviders};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct SetPromptRequest {
    pub sections: PromptSections,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPromptResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchProviderRequest {
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchProviderResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SttTimeoutRequest {
    pub timeout_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttTimeoutResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SttTimeoutResponse {
    fn from_result<E: std::fmt::Display>(result: Result<f64, E>) -> Self {
        match result {
            Ok(seconds) => Self {
                success: true,
                timeout_seconds: Some(seconds),
                error: None,
            },
            Err(e) => Self {
                success: false,
                timeout_seconds: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// `GET /api/prompt/sections/default`
pub async fn get_default_sections(
    State(state): State<Arc<AppState>>,
) -> Json<DefaultPromptSections> {
    Json(state.gateway.default_prompt_sections())
}

/// `POST /api/prompt/sections`
pub async fn set_prompt_sections(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetPromptRequest>,
) -> Json<SetPromptResponse> {
    let response = match state.gateway.set_prompt_sections(&request.sections) {
        Ok(()) => SetPromptResponse {
            success: true,
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "Rejected prompt update");
            SetPromptResponse {
                success: false,
                error: Some(e.to_string()),
            }
        }
    };
    Json(response)
}

/// `GET /api/providers/available`
pub async fn get_available_providers(
    State(state): State<Arc<AppState>>,
) -> Json<AvailableProviders> {
    Json(state.gateway.list_available_providers())
}

/// `GET /api/providers/current`
pub async fn get_current_providers(State(state): State<Arc<AppState>>) -> Json<ActiveSelection> {
    Json(state.gateway.current_providers())
}

/// `POST /api/providers/stt`
pub async fn switch_stt_provider(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SwitchProviderRequest>,
) -> Json<SwitchProviderResponse> {
    switch_provider(&state, ProviderRole::Stt, &request.provider).await
}

/// `POST /api/providers/llm`
pub async fn switch_llm_provider(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SwitchProviderRequest>,
) -> Json<SwitchProviderResponse> {
    switch_provider(&state, ProviderRole::Llm, &request.provider).await
}

async fn switch_provider(
    state: &AppState,
    role: ProviderRole,
    provider: &str,
) -> Json<SwitchProviderResponse> {
    info!(role = %role, provider, "Provider switch requested");
    let response = match state.gateway.switch_provider(role, provider).await {
        Ok(id) => SwitchProviderResponse {
            success: true,
            provider: Some(id),
            error: None,
        },
        Err(e) => SwitchProviderResponse {
            success: false,
            provider: None,
            error: Some(e.to_string()),
        },
    };
    Json(response)
}

/// `GET /api/config/stt-timeout`
pub async fn get_stt_timeout(State(state): State<Arc<AppState>>) -> Json<SttTimeoutResponse> {
    Json(SttTimeoutResponse::from_result(state.gateway.stt_timeout()))
}

/// `POST /api/config/stt-timeout`
pub async fn set_stt_timeout(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SttTimeoutRequest>,
) -> Json<SttTimeoutResponse> {
    let result = state.gateway.set_stt_timeout(request.timeout_seconds);
    match &result {
        Ok(seconds) => info!(timeout_seconds = seconds, "STT timeout updated"),
        Err(e) => warn!(error = %e, "Rejected STT timeout update"),
    }
    Json(SttTimeoutResponse::from_result(result))
}
