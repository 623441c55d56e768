use crate::domain::{Device, DeviceList, DeviceUpsert, Number};
use crate::query::{Clause, DeviceQuery, FieldScope, Literal, Operator};
use crate::registry::{DeviceRegistry, RegistryError};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// A device registry kept in process. Executes queries itself, with the
/// comparison semantics of the registry query language.
#[derive(Debug)]
pub struct InMemoryRegistry {
    devices: RwLock<HashMap<String, Device>>,
    host_name: String,
    page_size: usize,
    version: AtomicU64,
}

impl InMemoryRegistry {
    pub fn new(host_name: impl Into<String>, page_size: usize) -> Self {
        InMemoryRegistry {
            devices: RwLock::new(HashMap::new()),
            host_name: host_name.into(),
            page_size: page_size.max(1),
            version: AtomicU64::new(0),
        }
    }

    fn next_etag(&self) -> String {
        format!("{:016x}", self.version.fetch_add(1, AtomicOrdering::Relaxed) + 1)
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryRegistry {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get_device(&self, id: &str) -> Result<Device, RegistryError> {
        let read_guard = self.devices.read().await;
        read_guard.get(id).cloned().ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    #[instrument(skip_all, fields(device_id = %device.id))]
    async fn upsert_device(&self, device: DeviceUpsert) -> Result<Device, RegistryError> {
        let mut write_guard = self.devices.write().await;
        let etag = self.next_etag();

        let stored = write_guard.entry(device.id.clone()).or_insert_with(|| {
            info!(device_id = device.id, "🆕 Registering device '{}'", device.id);
            Device {
                id: device.id.clone(),
                enabled: true,
                last_activity: Some(Utc::now()),
                iot_hub_host_name: Some(self.host_name.clone()),
                ..Default::default()
            }
        });
        stored.etag = Some(etag);
        stored.tags = device.tags;
        stored.desired = device.desired;

        Ok(stored.clone())
    }

    async fn delete_device(&self, id: &str) -> Result<(), RegistryError> {
        let mut write_guard = self.devices.write().await;
        write_guard.remove(id).map(|_| ()).ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    #[instrument(skip(self, query), fields(query = %query.to_native()))]
    async fn query_devices(&self, query: &DeviceQuery, continuation_token: Option<&str>) -> Result<DeviceList, RegistryError> {
        let offset = match continuation_token {
            Some(token) => token.parse::<usize>().map_err(|_| RegistryError::InvalidContinuationToken(token.to_string()))?,
            None => 0,
        };

        let read_guard = self.devices.read().await;
        let mut matches = read_guard.values().filter(|device| matches_query(query, device)).collect::<Vec<_>>();
        matches.sort_by(|a, b| a.id.cmp(&b.id));

        let items = matches.iter().skip(offset).take(self.page_size).map(|device| (*device).clone()).collect::<Vec<_>>();
        let next = offset + items.len();
        let continuation_token = (next < matches.len()).then(|| next.to_string());

        debug!("Query matched {} device(s), returning {} from offset {}", matches.len(), items.len(), offset);
        Ok(DeviceList { items, continuation_token })
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}

fn matches_query(query: &DeviceQuery, device: &Device) -> bool {
    query.clauses().iter().all(|clause| matches_clause(clause, device))
}

/// A clause holds only when the field exists and has the literal's type,
/// so `!=` does not match devices lacking the field.
fn matches_clause(clause: &Clause, device: &Device) -> bool {
    // Booleans have equality but no order
    if matches!(clause.value, Literal::Boolean(_)) && !matches!(clause.operator, Operator::Eq | Operator::Ne) {
        return false;
    }

    let segments = clause.field.segments();
    let field = match clause.field.scope() {
        FieldScope::Tags => match segments {
            [name] => device.tags.get(name).map(|value| Value::String(value.clone())),
            _ => None,
        },
        FieldScope::Desired => lookup(&device.desired, segments),
        FieldScope::Reported => lookup(&device.reported, segments),
    };

    field
        .and_then(|value| compare(&value, &clause.value))
        .is_some_and(|ordering| clause.operator.holds(ordering))
}

fn lookup(properties: &serde_json::Map<String, Value>, segments: &[String]) -> Option<Value> {
    let (first, rest) = segments.split_first()?;
    rest.iter()
        .try_fold(properties.get(first)?, |value, segment| value.get(segment))
        .cloned()
}

fn compare(value: &Value, literal: &Literal) -> Option<Ordering> {
    match (value, literal) {
        (Value::Number(a), Literal::Number(b)) => Number::from(a).partial_cmp(b),
        (Value::String(a), Literal::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Bool(a), Literal::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn desired(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    async fn registry() -> InMemoryRegistry {
        let registry = InMemoryRegistry::new("hub.local", 100);
        registry
            .upsert_device(DeviceUpsert {
                id: "testDevice-getdeviceListWithReportedQuery".to_string(),
                tags: HashMap::from([("newTag".to_string(), "mynewTag42".to_string())]),
                desired: desired(json!({ "config": { "TelemetryInterval": 10 } })),
            })
            .await
            .unwrap();
        registry
            .upsert_device(DeviceUpsert {
                id: "other".to_string(),
                tags: HashMap::from([("Floor".to_string(), "10F".to_string())]),
                desired: desired(json!({ "config": { "TelemetryInterval": "fast", "TelemetryType": "Type1;Type2", "Active": true } })),
            })
            .await
            .unwrap();
        registry
    }

    async fn ids(registry: &InMemoryRegistry, query: &str) -> Vec<String> {
        let query = parse(query).unwrap();
        let list = registry.query_devices(&query, None).await.unwrap();
        list.items.into_iter().map(|device| device.id).collect()
    }

    #[rstest]
    #[case("tags.newTag = 'mynewTag42'")]
    #[case("properties.desired.config.TelemetryInterval = 10")]
    #[case("properties.desired.config.TelemetryInterval > 9")]
    #[case("properties.desired.config.TelemetryInterval >= 10")]
    #[case("properties.desired.config.TelemetryInterval < 11")]
    #[case("properties.desired.config.TelemetryInterval <= 10")]
    #[case("properties.desired.config.TelemetryInterval = 10.0")]
    #[case("tags.newTag = 'mynewTag42' and properties.desired.config.TelemetryInterval = 10")]
    #[case("[{\"Key\":\"properties.desired.config.TelemetryInterval\",\"Operator\":\"EQ\",\"Value\":10}]")]
    #[tokio::test]
    async fn finds_the_matching_device(#[case] query: &str) {
        let registry = registry().await;
        assert_eq!(ids(&registry, query).await, vec!["testDevice-getdeviceListWithReportedQuery"]);
    }

    #[rstest]
    #[case("properties.desired.config.TelemetryInterval != 10")]
    #[case("properties.desired.config.TelemetryInterval < 9")]
    #[case("properties.desired.config.TelemetryInterval > 10 and properties.desired.config.TelemetryInterval = 10")]
    #[tokio::test]
    async fn excludes_the_device(#[case] query: &str) {
        let registry = registry().await;
        assert!(!ids(&registry, query).await.contains(&"testDevice-getdeviceListWithReportedQuery".to_string()));
    }

    #[tokio::test]
    async fn contradictory_conjunction_matches_nothing() {
        let registry = registry().await;
        let result = ids(&registry, "properties.desired.config.TelemetryInterval > 10 and properties.desired.config.TelemetryInterval = 10").await;
        assert!(result.is_empty());
    }

    #[rstest]
    #[case::missing_field("properties.reported.firmware != '1.0'")]
    #[case::type_mismatch("properties.desired.config.TelemetryInterval = '10'")]
    #[case::nested_tag("tags.newTag.inner = 'x'")]
    #[case::scalar_walk("properties.desired.config.TelemetryType.x = 1")]
    #[case::ordered_boolean("properties.desired.config.Active > false")]
    #[tokio::test]
    async fn undefined_comparisons_match_nothing(#[case] query: &str) {
        let registry = registry().await;
        assert!(ids(&registry, query).await.is_empty());
    }

    #[tokio::test]
    async fn compares_booleans_for_equality() {
        let registry = registry().await;
        assert_eq!(ids(&registry, "properties.desired.config.Active = true").await, vec!["other"]);
        assert_eq!(ids(&registry, "properties.desired.config.Active != false").await, vec!["other"]);
    }

    #[tokio::test]
    async fn empty_query_returns_every_device_sorted_by_id() {
        let registry = registry().await;
        assert_eq!(ids(&registry, "[]").await, vec!["other", "testDevice-getdeviceListWithReportedQuery"]);
    }

    #[tokio::test]
    async fn pages_with_continuation_tokens() {
        let registry = InMemoryRegistry::new("hub.local", 2);
        for id in ["a", "b", "c"] {
            registry
                .upsert_device(DeviceUpsert {
                    id: id.to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let first = registry.query_devices(&DeviceQuery::all(), None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.continuation_token.as_deref(), Some("2"));

        let second = registry.query_devices(&DeviceQuery::all(), first.continuation_token.as_deref()).await.unwrap();
        assert_eq!(second.items.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(second.continuation_token, None);

        let invalid = registry.query_devices(&DeviceQuery::all(), Some("next")).await;
        assert!(matches!(invalid, Err(RegistryError::InvalidContinuationToken(_))));
    }

    #[tokio::test]
    async fn upsert_replaces_tags_and_desired_properties() {
        let registry = InMemoryRegistry::new("hub.local", 10);
        let created = registry
            .upsert_device(DeviceUpsert {
                id: "replace".to_string(),
                tags: HashMap::from([("a".to_string(), "1".to_string())]),
                desired: desired(json!({ "x": 1 })),
            })
            .await
            .unwrap();
        let updated = registry
            .upsert_device(DeviceUpsert {
                id: "replace".to_string(),
                tags: HashMap::from([("b".to_string(), "2".to_string())]),
                desired: desired(json!({ "y": 2 })),
            })
            .await
            .unwrap();

        assert_eq!(updated.tags, HashMap::from([("b".to_string(), "2".to_string())]));
        assert_eq!(Value::Object(updated.desired), json!({ "y": 2 }));
        assert_ne!(created.etag, updated.etag);
        assert!(updated.enabled);
        assert_eq!(updated.iot_hub_host_name.as_deref(), Some("hub.local"));
    }

    #[tokio::test]
    async fn delete_reports_missing_devices() {
        let registry = registry().await;
        assert!(registry.delete_device("other").await.is_ok());
        assert!(matches!(registry.delete_device("other").await, Err(RegistryError::NotFound { .. })));
        assert!(matches!(registry.get_device("other").await, Err(RegistryError::NotFound { .. })));
    }
}
