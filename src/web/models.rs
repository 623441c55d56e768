use crate::domain::{Device, DeviceList, DeviceUpsert};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceApiModel {
    pub id: String,
    pub etag: Option<String>,
    pub enabled: bool,
    pub connected: bool,
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(rename = "IoTHubHostName")]
    pub iot_hub_host_name: Option<String>,
    pub tags: HashMap<String, String>,
    pub properties: PropertiesApiModel,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PropertiesApiModel {
    #[serde(default)]
    pub desired: Map<String, Value>,
    #[serde(default)]
    pub reported: Map<String, Value>,
}

impl From<Device> for DeviceApiModel {
    fn from(device: Device) -> Self {
        DeviceApiModel {
            id: device.id,
            etag: device.etag,
            enabled: device.enabled,
            connected: device.connected,
            last_activity: device.last_activity,
            iot_hub_host_name: device.iot_hub_host_name,
            tags: device.tags,
            properties: PropertiesApiModel {
                desired: device.desired,
                reported: device.reported,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceListApiModel {
    pub items: Vec<DeviceApiModel>,
    pub continuation_token: Option<String>,
}

impl From<DeviceList> for DeviceListApiModel {
    fn from(list: DeviceList) -> Self {
        DeviceListApiModel {
            items: list.items.into_iter().map(DeviceApiModel::from).collect(),
            continuation_token: list.continuation_token,
        }
    }
}

/// A create or update request. Only tags and desired properties are
/// writable; reported properties and server-assigned fields are ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceRequestApiModel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub properties: Option<DesiredPropertiesApiModel>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DesiredPropertiesApiModel {
    #[serde(default)]
    pub desired: Map<String, Value>,
}

impl DeviceRequestApiModel {
    pub fn into_upsert(self, id: String) -> DeviceUpsert {
        DeviceUpsert {
            id,
            tags: self.tags,
            desired: self.properties.map(|properties| properties.desired).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusApiModel {
    pub name: String,
    pub status: String,
    pub current_time: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub properties: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serializes_a_device_with_pascal_case_fields() {
        let device = Device {
            id: "testDevice1".to_string(),
            tags: HashMap::from([("newTag".to_string(), "value".to_string())]),
            ..Default::default()
        };

        let json = serde_json::to_value(DeviceApiModel::from(device)).unwrap();

        assert_eq!(
            json,
            json!({
                "Id": "testDevice1",
                "Etag": null,
                "Enabled": false,
                "Connected": false,
                "LastActivity": null,
                "IoTHubHostName": null,
                "Tags": { "newTag": "value" },
                "Properties": { "Desired": {}, "Reported": {} }
            })
        );
    }

    #[test]
    fn ignores_reported_properties_in_requests() {
        let request = serde_json::from_value::<DeviceRequestApiModel>(json!({
            "Id": "testDevice1",
            "Tags": { "a": "1" },
            "Properties": {
                "Desired": { "config": { "TelemetryInterval": 10 } },
                "Reported": { "firmware": "hacked" }
            },
            "Etag": "ignored"
        }))
        .unwrap();

        let upsert = request.into_upsert("testDevice1".to_string());

        assert_eq!(upsert.tags, HashMap::from([("a".to_string(), "1".to_string())]));
        assert_eq!(Value::Object(upsert.desired), json!({ "config": { "TelemetryInterval": 10 } }));
    }

    #[test]
    fn accepts_an_id_only_request() {
        let request = serde_json::from_value::<DeviceRequestApiModel>(json!({ "Id": "testDevice123" })).unwrap();
        let upsert = request.into_upsert("testDevice123".to_string());
        assert!(upsert.tags.is_empty());
        assert!(upsert.desired.is_empty());
    }
}
