use config::{Config, ConfigError};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    server: Server,
    registry: Registry,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(config::File::with_name("config_local").required(false))
            .add_source(config::Environment::with_prefix("HUBMANAGER").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    host: String,
    port: u16,
    log_level: String,
    request_timeout_ms: u64,
    cors_whitelist: Option<CorsWhitelist>,
}

impl Server {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.log_level).map_err(|_| ConfigError::Message(format!("invalid log level '{}'", self.log_level)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cors_whitelist(&self) -> Option<&CorsWhitelist> {
        self.cors_whitelist.as_ref()
    }
}

/// Origins, methods and headers allowed for cross-origin requests, `*` allowing any.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsWhitelist {
    #[serde(default)]
    pub origins: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    IotHub,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registry {
    kind: RegistryKind,
    url: String,
    host_name: String,
    api_version: String,
    authorization: String,
    retry_ms: u64,
    retry_max_delay_ms: u64,
    retry_attempts: usize,
    max_item_count: usize,
}

impl Registry {
    pub fn kind(&self) -> RegistryKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn authorization(&self) -> &str {
        &self.authorization
    }

    pub fn retry_ms(&self) -> u64 {
        self.retry_ms
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn retry_attempts(&self) -> usize {
        self.retry_attempts
    }

    pub fn max_item_count(&self) -> usize {
        self.max_item_count
    }
}

/// Builds an [`AppConfig`] without configuration files, for tests and embedding.
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn new() -> Self {
        AppConfigBuilder {
            config: AppConfig {
                server: Server {
                    host: "127.0.0.1".to_string(),
                    port: 9002,
                    log_level: "info".to_string(),
                    request_timeout_ms: 10_000,
                    cors_whitelist: None,
                },
                registry: Registry {
                    kind: RegistryKind::Memory,
                    url: "https://hub.azure-devices.net".to_string(),
                    host_name: "hub.azure-devices.net".to_string(),
                    api_version: "2021-04-12".to_string(),
                    authorization: "key".to_string(),
                    retry_ms: 1,
                    retry_max_delay_ms: 5,
                    retry_attempts: 2,
                    max_item_count: 100,
                },
            },
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn cors_whitelist(mut self, whitelist: CorsWhitelist) -> Self {
        self.config.server.cors_whitelist = Some(whitelist);
        self
    }

    pub fn registry_kind(mut self, kind: RegistryKind) -> Self {
        self.config.registry.kind = kind;
        self
    }

    pub fn registry_url(mut self, url: String) -> Self {
        self.config.registry.url = url;
        self
    }

    pub fn max_item_count(mut self, max_item_count: usize) -> Self {
        self.config.registry.max_item_count = max_item_count;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for AppConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
