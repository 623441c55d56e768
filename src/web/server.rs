use crate::app_config::{AppConfig, CorsWhitelist};
use crate::registry::DeviceRegistry;
use crate::web::{devices, status};
use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<dyn DeviceRegistry>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: Arc<dyn DeviceRegistry>) -> Self {
        AppState {
            registry,
            started_at: Utc::now(),
        }
    }
}

pub fn router(state: AppState, config: &AppConfig) -> Router {
    let router = Router::new()
        .nest("/v1", devices::routes().merge(status::routes()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match config.server().cors_whitelist() {
        Some(whitelist) if !whitelist.origins.is_empty() => router.layer(cors_layer(whitelist)),
        _ => router,
    }
}

fn allows_any(values: &[String]) -> bool {
    values.iter().any(|value| value == "*")
}

fn parse_all<T: std::str::FromStr>(kind: &str, values: &[String]) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| match value.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("⚠️ Ignoring invalid CORS {} '{}'", kind, value);
                None
            }
        })
        .collect()
}

fn cors_layer(whitelist: &CorsWhitelist) -> CorsLayer {
    let origins = if allows_any(&whitelist.origins) {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(parse_all::<HeaderValue>("origin", &whitelist.origins))
    };
    let methods = if allows_any(&whitelist.methods) {
        AllowMethods::from(Any)
    } else {
        AllowMethods::list(parse_all::<Method>("method", &whitelist.methods))
    };
    let headers = if allows_any(&whitelist.headers) {
        AllowHeaders::from(Any)
    } else {
        AllowHeaders::list(parse_all::<HeaderName>("header", &whitelist.headers))
    };

    CorsLayer::new().allow_origin(origins).allow_methods(methods).allow_headers(headers)
}

pub async fn serve(config: &AppConfig, registry: Arc<dyn DeviceRegistry>) -> Result<(), std::io::Error> {
    let app = router(AppState::new(registry), config);
    let listener = TcpListener::bind(config.server().socket_addr()).await?;
    info!("🌐 Listening on http://{}/v1", listener.local_addr()?);

    axum::serve(listener, app).await
}
