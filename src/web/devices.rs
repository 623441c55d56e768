use crate::query;
use crate::registry::RegistryError;
use crate::web::error::ApiError;
use crate::web::models::{DeviceApiModel, DeviceListApiModel, DeviceRequestApiModel};
use crate::web::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, info, instrument};

pub const CONTINUATION_HEADER: &str = "x-ms-continuation";

/// The id shadowed by the query route. Other verbs on that route address the device itself.
const QUERY_DEVICE_ID: &str = "query";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices).post(create_device))
        .route(
            "/devices/query",
            post(query_devices)
                .get(get_query_device)
                .put(update_query_device)
                .delete(delete_query_device),
        )
        .route("/devices/{id}", get(get_device).put(update_device).delete(delete_device))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    query: Option<String>,
}

fn continuation_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CONTINUATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|token| !token.is_empty())
}

async fn run_query(state: &AppState, raw: &str, headers: &HeaderMap) -> Result<Json<DeviceListApiModel>, ApiError> {
    let query = query::parse(raw)?;
    let list = state.registry.query_devices(&query, continuation_token(headers)).await?;
    debug!(count = list.items.len(), "Query returned {} device(s)", list.items.len());
    Ok(Json(list.into()))
}

#[instrument(skip(state, headers))]
async fn list_devices(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Json<DeviceListApiModel>, ApiError> {
    run_query(&state, params.query.as_deref().unwrap_or_default(), &headers).await
}

#[instrument(skip(state, headers))]
async fn query_devices(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<Json<DeviceListApiModel>, ApiError> {
    run_query(&state, &body, &headers).await
}

#[instrument(skip(state))]
async fn get_device(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<DeviceApiModel>, ApiError> {
    fetch_device(&state, &id).await
}

async fn get_query_device(State(state): State<AppState>) -> Result<Json<DeviceApiModel>, ApiError> {
    fetch_device(&state, QUERY_DEVICE_ID).await
}

async fn fetch_device(state: &AppState, id: &str) -> Result<Json<DeviceApiModel>, ApiError> {
    let device = state.registry.get_device(id).await?;
    Ok(Json(device.into()))
}

#[instrument(skip(state, body))]
async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<DeviceRequestApiModel>, JsonRejection>,
) -> Result<Json<DeviceApiModel>, ApiError> {
    replace_device(&state, id, body).await
}

async fn update_query_device(
    State(state): State<AppState>,
    body: Result<Json<DeviceRequestApiModel>, JsonRejection>,
) -> Result<Json<DeviceApiModel>, ApiError> {
    replace_device(&state, QUERY_DEVICE_ID.to_string(), body).await
}

async fn replace_device(
    state: &AppState,
    id: String,
    body: Result<Json<DeviceRequestApiModel>, JsonRejection>,
) -> Result<Json<DeviceApiModel>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if let Some(body_id) = request.id.as_deref() {
        if body_id != id {
            return Err(ApiError::BadRequest(format!("device id '{}' does not match the path id '{}'", body_id, id)));
        }
    }

    let device = state.registry.upsert_device(request.into_upsert(id)).await?;
    info!(device_id = device.id, "📝 Updated device '{}'", device.id);
    Ok(Json(device.into()))
}

#[instrument(skip(state, body))]
async fn create_device(
    State(state): State<AppState>,
    body: Result<Json<DeviceRequestApiModel>, JsonRejection>,
) -> Result<(StatusCode, Json<DeviceApiModel>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let id = match request.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(ApiError::BadRequest("a device id is required".to_string())),
    };

    let device = state.registry.upsert_device(request.into_upsert(id)).await?;
    info!(device_id = device.id, "🆕 Created device '{}'", device.id);
    Ok((StatusCode::CREATED, Json(device.into())))
}

#[instrument(skip(state))]
async fn delete_device(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    remove_device(&state, &id).await
}

async fn delete_query_device(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    remove_device(&state, QUERY_DEVICE_ID).await
}

/// Deleting a device that does not exist succeeds.
async fn remove_device(state: &AppState, id: &str) -> Result<StatusCode, ApiError> {
    match state.registry.delete_device(id).await {
        Ok(()) => {
            info!(device_id = id, "🗑️ Deleted device '{}'", id);
            Ok(StatusCode::OK)
        }
        Err(RegistryError::NotFound { .. }) => {
            debug!(device_id = id, "Device '{}' was already gone", id);
            Ok(StatusCode::OK)
        }
        Err(e) => Err(e.into()),
    }
}
