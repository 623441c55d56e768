use crate::domain::Device;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

// API: https://learn.microsoft.com/en-us/rest/api/iothub/service/devices/get-twin
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwinGet {
    pub device_id: String,
    pub etag: Option<String>,
    pub status: Option<String>,
    pub connection_state: Option<String>,
    pub last_activity_time: Option<DateTime<Utc>>,
    pub tags: Option<Map<String, Value>>,
    #[serde(default)]
    pub properties: TwinProperties,
}

#[derive(Debug, Default, Deserialize)]
pub struct TwinProperties {
    #[serde(default)]
    pub desired: Map<String, Value>,
    #[serde(default)]
    pub reported: Map<String, Value>,
}

impl TwinGet {
    pub fn into_device(self, host_name: &str) -> Device {
        Device {
            id: self.device_id,
            etag: self.etag,
            enabled: self.status.is_none_or(|status| status.eq_ignore_ascii_case("enabled")),
            connected: self.connection_state.is_some_and(|state| state.eq_ignore_ascii_case("connected")),
            last_activity: self.last_activity_time,
            iot_hub_host_name: Some(host_name.to_string()),
            tags: self
                .tags
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(value) => (key, value),
                    value => (key, value.to_string()),
                })
                .collect(),
            desired: without_metadata(self.properties.desired),
            reported: without_metadata(self.properties.reported),
        }
    }
}

/// Drops the `$metadata` and `$version` bookkeeping the registry adds to twin properties.
fn without_metadata(properties: Map<String, Value>) -> Map<String, Value> {
    properties.into_iter().filter(|(key, _)| !key.starts_with('$')).collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentityPut<'a> {
    pub device_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TwinPut<'a> {
    pub tags: &'a HashMap<String, String>,
    pub properties: TwinPutProperties<'a>,
}

#[derive(Debug, Serialize)]
pub struct TwinPutProperties<'a> {
    pub desired: &'a Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct QueryRequest<'a> {
    pub query: &'a str,
}
