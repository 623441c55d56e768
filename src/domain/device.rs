use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A device as known by the registry, identity and twin combined.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Device {
    pub id: String,
    pub etag: Option<String>,
    pub enabled: bool,
    pub connected: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub iot_hub_host_name: Option<String>,
    pub tags: HashMap<String, String>,
    pub desired: Map<String, Value>,
    pub reported: Map<String, Value>,
}

/// The part of a device a client is allowed to write. Tags and desired
/// properties replace the stored ones as a whole.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct DeviceUpsert {
    pub id: String,
    pub tags: HashMap<String, String>,
    pub desired: Map<String, Value>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct DeviceList {
    pub items: Vec<Device>,
    pub continuation_token: Option<String>,
}
