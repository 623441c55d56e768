use crate::web::models::StatusApiModel;
use crate::web::server::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{instrument, warn};

pub fn routes() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

/// Always answers 200, an unreachable registry shows up in `Status`.
#[instrument(skip(state))]
async fn status(State(state): State<AppState>) -> Json<StatusApiModel> {
    let status = match state.registry.ping().await {
        Ok(()) => "OK:Alive and well".to_string(),
        Err(e) => {
            warn!("⚠️ Registry health check failed: {}", e);
            format!("ERROR:{}", e)
        }
    };

    let now = Utc::now();
    Json(StatusApiModel {
        name: env!("CARGO_PKG_NAME").to_string(),
        status,
        current_time: now,
        start_time: state.started_at,
        uptime_seconds: (now - state.started_at).num_seconds(),
        properties: HashMap::from([
            ("Version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            ("Registry".to_string(), state.registry.kind().to_string()),
        ]),
    })
}
