//! Readiness probe.
//!
//! Liveness (`/health`) comes from `eventgram_web`; readiness additionally
//! checks that the entity store answers a query.

use super::state::AppState;
use crate::types::Event;
use axum::{Json, extract::State, http::StatusCode};
use eventgram_core::entity_store::{Entity, EntityStore, Query};
use serde::Serialize;

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Entity store connectivity
    pub entity_store: bool,
}

/// Readiness check endpoint.
///
/// Returns 200 when the entity store answers, 503 otherwise.
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"ready":true,"entity_store":true}
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let entity_store = match state.entities.query(Query::new(Event::KIND).limit(1)).await {
        Ok(_) => true,
        Err(error) => {
            tracing::warn!(error = %error, "Entity store not ready");
            false
        },
    };

    let status = if entity_store {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            ready: entity_store,
            entity_store,
        }),
    )
}
