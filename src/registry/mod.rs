mod client;
mod iot_hub;
mod memory;
mod twin;

use crate::app_config::{AppConfig, RegistryKind};
use crate::domain::{Device, DeviceList, DeviceUpsert};
use crate::query::DeviceQuery;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub use client::{RegistryClientError, new_client};
pub use iot_hub::IotHubRegistry;
pub use memory::InMemoryRegistry;

/// The device registry being fronted. Implementations own retries; callers never retry.
#[async_trait]
pub trait DeviceRegistry: Debug + Send + Sync {
    fn kind(&self) -> &'static str;

    async fn get_device(&self, id: &str) -> Result<Device, RegistryError>;

    /// Creates the device if needed and replaces its tags and desired properties.
    async fn upsert_device(&self, device: DeviceUpsert) -> Result<Device, RegistryError>;

    async fn delete_device(&self, id: &str) -> Result<(), RegistryError>;

    async fn query_devices(&self, query: &DeviceQuery, continuation_token: Option<&str>) -> Result<DeviceList, RegistryError>;

    /// Checks that the registry can be reached.
    async fn ping(&self) -> Result<(), RegistryError>;
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("device '{id}' not found")]
    NotFound { id: String },
    #[error("conflicting update: {0}")]
    Conflict(String),
    #[error("invalid continuation token '{0}'")]
    InvalidContinuationToken(String),
    #[error("registry unavailable: {0}")]
    Unavailable(String),
    #[error("registry responded with status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("invalid registry response: {0}")]
    InvalidResponse(String),
}

impl RegistryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Unavailable(_))
    }
}

pub fn from_config(config: &AppConfig) -> Result<Arc<dyn DeviceRegistry>, RegistryClientError> {
    let registry: Arc<dyn DeviceRegistry> = match config.registry().kind() {
        RegistryKind::IotHub => Arc::new(IotHubRegistry::new(new_client(config)?, config)?),
        RegistryKind::Memory => Arc::new(InMemoryRegistry::new(config.registry().host_name(), config.registry().max_item_count())),
    };
    info!(registry = registry.kind(), "✅  Configured device registry");
    Ok(registry)
}
