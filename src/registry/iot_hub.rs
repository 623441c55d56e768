use crate::app_config::{AppConfig, Registry as RegistryConfig};
use crate::domain::{Device, DeviceList, DeviceUpsert};
use crate::query::DeviceQuery;
use crate::registry::client::RegistryClientError;
use crate::registry::twin::{DeviceIdentityPut, QueryRequest, TwinGet, TwinPut, TwinPutProperties};
use crate::registry::{DeviceRegistry, RegistryError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use std::future::Future;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, instrument, warn};

const CONTINUATION_HEADER: &str = "x-ms-continuation";
const MAX_ITEM_COUNT_HEADER: &str = "x-ms-max-item-count";

/// Device registry backed by the IoT Hub service REST API.
#[derive(Debug)]
pub struct IotHubRegistry {
    client: Client,
    base_url: Url,
    config: RegistryConfig,
}

impl IotHubRegistry {
    pub fn new(client: Client, config: &AppConfig) -> Result<Self, RegistryClientError> {
        let base_url = Url::parse(config.registry().url()).map_err(|e| RegistryClientError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryClientError::InvalidUrl(config.registry().url().to_string()));
        }

        Ok(IotHubRegistry {
            client,
            base_url,
            config: config.registry().clone(),
        })
    }

    fn endpoint(&self, path: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path);
        }
        url.query_pairs_mut().append_pair("api-version", self.config.api_version());
        url
    }

    async fn retry<T, A, F>(&self, action: A) -> Result<T, RegistryError>
    where
        A: FnMut() -> F,
        F: Future<Output = Result<T, RegistryError>>,
    {
        let strategy = ExponentialBackoff::from_millis(self.config.retry_ms())
            .factor(2)
            .max_delay(self.config.retry_max_delay())
            .map(jitter)
            .take(self.config.retry_attempts());

        RetryIf::start(strategy, action, |error: &RegistryError| {
            if error.is_transient() {
                warn!("⚠️ Registry request failed: {}. Retrying...", error);
            }
            error.is_transient()
        })
        .await
    }

    async fn fetch_twin(&self, id: &str) -> Result<Device, RegistryError> {
        let response = send(self.client.get(self.endpoint(&["twins", id])), id).await?;
        let twin = response.json::<TwinGet>().await.map_err(request_error)?;
        Ok(twin.into_device(self.config.host_name()))
    }

    async fn ensure_identity(&self, id: &str) -> Result<(), RegistryError> {
        match send(self.client.get(self.endpoint(&["devices", id])), id).await {
            Ok(_) => Ok(()),
            Err(RegistryError::NotFound { .. }) => {
                info!(device_id = id, "🆕 Creating device identity '{}'", id);
                let request = self.client.put(self.endpoint(&["devices", id])).json(&DeviceIdentityPut { device_id: id });
                match send(request, id).await {
                    // Created concurrently by someone else, the twin update below still applies
                    Ok(_) | Err(RegistryError::Conflict(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_page(&self, query: &str, continuation_token: Option<&str>) -> Result<DeviceList, RegistryError> {
        let mut request = self
            .client
            .post(self.endpoint(&["devices", "query"]))
            .header(MAX_ITEM_COUNT_HEADER, self.config.max_item_count().to_string())
            .json(&QueryRequest { query });
        if let Some(token) = continuation_token {
            request = request.header(CONTINUATION_HEADER, token);
        }

        let response = send(request, "").await?;
        let continuation_token = response
            .headers()
            .get(CONTINUATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let twins = response.json::<Vec<TwinGet>>().await.map_err(request_error)?;

        Ok(DeviceList {
            items: twins.into_iter().map(|twin| twin.into_device(self.config.host_name())).collect(),
            continuation_token,
        })
    }
}

#[async_trait]
impl DeviceRegistry for IotHubRegistry {
    fn kind(&self) -> &'static str {
        "iothub"
    }

    #[instrument(skip(self))]
    async fn get_device(&self, id: &str) -> Result<Device, RegistryError> {
        self.retry(|| self.fetch_twin(id)).await
    }

    #[instrument(skip_all, fields(device_id = %device.id))]
    async fn upsert_device(&self, device: DeviceUpsert) -> Result<Device, RegistryError> {
        self.ensure_identity(&device.id).await?;

        let twin = TwinPut {
            tags: &device.tags,
            properties: TwinPutProperties { desired: &device.desired },
        };
        let request = self.client.put(self.endpoint(&["twins", &device.id])).header("If-Match", "*").json(&twin);
        let response = send(request, &device.id).await?;
        let twin = response.json::<TwinGet>().await.map_err(request_error)?;

        info!(device_id = device.id, "🟢 Updated twin of device '{}'", device.id);
        Ok(twin.into_device(self.config.host_name()))
    }

    #[instrument(skip(self))]
    async fn delete_device(&self, id: &str) -> Result<(), RegistryError> {
        let request = self.client.delete(self.endpoint(&["devices", id])).header("If-Match", "*");
        send(request, id).await?;
        info!(device_id = id, "🗑️ Deleted device '{}'", id);
        Ok(())
    }

    #[instrument(skip(self, query), fields(query = %query.to_native()))]
    async fn query_devices(&self, query: &DeviceQuery, continuation_token: Option<&str>) -> Result<DeviceList, RegistryError> {
        let native = query.to_native();
        let list = self.retry(|| self.fetch_page(&native, continuation_token)).await?;
        debug!("Query returned {} device(s)", list.items.len());
        Ok(list)
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        send(self.client.get(self.endpoint(&["statistics", "service"])), "").await?;
        Ok(())
    }
}

async fn send(request: RequestBuilder, id: &str) -> Result<Response, RegistryError> {
    let response = request.send().await.map_err(request_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status_code = %status, "⚠️ Request to the registry failed. Response: {:?}", body);
    Err(match status {
        StatusCode::NOT_FOUND => RegistryError::NotFound { id: id.to_string() },
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => RegistryError::Conflict(body),
        StatusCode::TOO_MANY_REQUESTS => RegistryError::Unavailable(format!("throttled: {}", body)),
        status if status.is_server_error() => RegistryError::Unavailable(format!("status {}: {}", status.as_u16(), body)),
        status => RegistryError::Upstream { status: status.as_u16(), body },
    })
}

fn request_error(error: reqwest::Error) -> RegistryError {
    if error.is_decode() {
        RegistryError::InvalidResponse(error.to_string())
    } else {
        RegistryError::Unavailable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::AppConfigBuilder;
    use crate::query::parse;
    use crate::registry::new_client;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use test_log::test;

    fn registry(url: String) -> IotHubRegistry {
        let config = AppConfigBuilder::new().registry_url(url).max_item_count(2).build();
        IotHubRegistry::new(new_client(&config).unwrap(), &config).unwrap()
    }

    fn api_version() -> Matcher {
        Matcher::UrlEncoded("api-version".to_string(), "2021-04-12".to_string())
    }

    fn twin(id: &str) -> serde_json::Value {
        json!({
            "deviceId": id,
            "etag": "AAAAAAAAAAE=",
            "status": "enabled",
            "connectionState": "Connected",
            "tags": { "Floor": "10F" },
            "properties": { "desired": { "config": { "TelemetryInterval": 10 } }, "reported": {} }
        })
    }

    #[test(tokio::test)]
    async fn get_device_returns_the_mapped_twin() -> Result<(), RegistryError> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/twins/testDevice1")
            .match_query(api_version())
            .match_header("authorization", "key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(twin("testDevice1").to_string())
            .create_async()
            .await;

        let device = registry(server.url()).get_device("testDevice1").await?;

        mock.assert_async().await;
        assert_eq!(device.id, "testDevice1");
        assert!(device.connected);
        assert_eq!(device.tags.get("Floor").map(String::as_str), Some("10F"));
        Ok(())
    }

    #[test(tokio::test)]
    async fn get_device_maps_404_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/twins/foobar")
            .match_query(api_version())
            .with_status(404)
            .with_body("{\"Message\":\"DeviceNotFound\"}")
            .create_async()
            .await;

        let result = registry(server.url()).get_device("foobar").await;

        assert!(matches!(result, Err(RegistryError::NotFound { id }) if id == "foobar"));
    }

    #[test(tokio::test)]
    async fn get_device_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/twins/flaky")
            .match_query(api_version())
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let result = registry(server.url()).get_device("flaky").await;

        mock.assert_async().await;
        assert!(matches!(result, Err(RegistryError::Unavailable(_))));
    }

    #[test(tokio::test)]
    async fn upsert_creates_the_identity_and_replaces_the_twin() -> Result<(), RegistryError> {
        let mut server = mockito::Server::new_async().await;
        let get_identity = server
            .mock("GET", "/devices/testDevice123")
            .match_query(api_version())
            .with_status(404)
            .create_async()
            .await;
        let put_identity = server
            .mock("PUT", "/devices/testDevice123")
            .match_query(api_version())
            .match_body(Matcher::Json(json!({ "deviceId": "testDevice123" })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let put_twin = server
            .mock("PUT", "/twins/testDevice123")
            .match_query(api_version())
            .match_header("if-match", "*")
            .match_body(Matcher::Json(json!({
                "tags": { "Floor": "10F" },
                "properties": { "desired": { "config": { "TelemetryInterval": 10 } } }
            })))
            .with_status(200)
            .with_body(twin("testDevice123").to_string())
            .create_async()
            .await;

        let mut desired = serde_json::Map::new();
        desired.insert("config".to_string(), json!({ "TelemetryInterval": 10 }));
        let device = registry(server.url())
            .upsert_device(DeviceUpsert {
                id: "testDevice123".to_string(),
                tags: HashMap::from([("Floor".to_string(), "10F".to_string())]),
                desired,
            })
            .await?;

        get_identity.assert_async().await;
        put_identity.assert_async().await;
        put_twin.assert_async().await;
        assert_eq!(device.id, "testDevice123");
        Ok(())
    }

    #[test(tokio::test)]
    async fn upsert_maps_precondition_failures_to_conflict() {
        let mut server = mockito::Server::new_async().await;
        let _get_identity = server
            .mock("GET", "/devices/busy")
            .match_query(api_version())
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _put_twin = server
            .mock("PUT", "/twins/busy")
            .match_query(api_version())
            .with_status(412)
            .with_body("PreconditionFailed")
            .create_async()
            .await;

        let result = registry(server.url())
            .upsert_device(DeviceUpsert {
                id: "busy".to_string(),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(RegistryError::Conflict(_))));
    }

    #[test(tokio::test)]
    async fn delete_sends_a_wildcard_etag() -> Result<(), RegistryError> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/devices/testDevice123")
            .match_query(api_version())
            .match_header("if-match", "*")
            .with_status(204)
            .create_async()
            .await;

        registry(server.url()).delete_device("testDevice123").await?;

        mock.assert_async().await;
        Ok(())
    }

    #[test(tokio::test)]
    async fn query_posts_the_native_query_and_reads_the_continuation_token() -> Result<(), RegistryError> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/devices/query")
            .match_query(api_version())
            .match_header("x-ms-max-item-count", "2")
            .match_header("x-ms-continuation", "page-1")
            .match_body(Matcher::Json(json!({ "query": "SELECT * FROM devices WHERE tags.Floor = '10F'" })))
            .with_status(200)
            .with_header("x-ms-continuation", "page-2")
            .with_body(json!([twin("a"), twin("b")]).to_string())
            .create_async()
            .await;

        let query = parse("tags.Floor = '10F'").unwrap();
        let list = registry(server.url()).query_devices(&query, Some("page-1")).await?;

        mock.assert_async().await;
        assert_eq!(list.items.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(list.continuation_token.as_deref(), Some("page-2"));
        Ok(())
    }

    #[test(tokio::test)]
    async fn query_maps_bad_requests_to_upstream_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/devices/query")
            .match_query(api_version())
            .with_status(400)
            .with_body("BadRequest")
            .create_async()
            .await;

        let result = registry(server.url()).query_devices(&DeviceQuery::all(), None).await;

        assert!(matches!(result, Err(RegistryError::Upstream { status: 400, .. })));
    }

    #[test(tokio::test)]
    async fn unreachable_registry_is_unavailable() {
        let result = registry("http://127.0.0.1:1".to_string()).ping().await;
        assert!(matches!(result, Err(RegistryError::Unavailable(_))));
    }

    #[test]
    fn endpoint_escapes_device_ids() {
        let registry = registry("https://hub.azure-devices.net".to_string());
        assert_eq!(
            registry.endpoint(&["twins", "a b/c"]).as_str(),
            "https://hub.azure-devices.net/twins/a%20b%2Fc?api-version=2021-04-12"
        );
    }
}
