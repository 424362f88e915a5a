//! Connection offer endpoint
//!
//! `POST /api/offer` creates a new connection (and its session) for an offer
//! without a known `pc_id`, or renegotiates the existing connection otherwise.

use axum::{extract::State, response::Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::core::transport::{SessionDescription, TransportAnswer};
use crate::errors::AppResult;
use crate::state::AppState;

/// Offer from the client
#[derive(Debug, Clone, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
    #[serde(default)]
    pub pc_id: Option<String>,
    #[serde(default)]
    pub restart_pc: bool,
}

pub async fn handle_offer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OfferRequest>,
) -> AppResult<Json<TransportAnswer>> {
    let offer = SessionDescription {
        sdp: request.sdp,
        sdp_type: request.sdp_type,
    };

    let answer = state
        .sessions
        .negotiate(
            state.transports.as_ref(),
            &offer,
            request.pc_id.as_deref(),
            request.restart_pc,
        )
        .await?;

    info!(pc_id = %answer.pc_id, "Answered offer");
    Ok(Json(answer))
}
