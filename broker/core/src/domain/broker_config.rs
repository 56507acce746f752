// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Broker Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing one
// broker deployment:
// - HTTP server binding
// - Storage backend (in-memory or PostgreSQL)
// - Site portal client (TLS material, fixed-delay retry policy)
// - Fan-out concurrency bound
// - Logging and metrics

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "fedlcm.io/v1";
pub const KIND: &str = "BrokerConfig";

/// Top-level broker configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfigManifest {
    /// API version (must be "fedlcm.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "BrokerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: BrokerConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable deployment name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub peer_client: PeerClientConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_backend")]
    pub backend: DatabaseBackend,

    /// Connection string, required for the postgres backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerClientConfig {
    /// Attempts per peer message, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<PeerTlsConfig>,
}

/// PEM files for mutual TLS towards site portals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerTlsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_cert_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Upper bound of background peer notifications in flight
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Prometheus exporter port; exporter disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_api_port() -> u16 {
    8080
}
fn default_database_backend() -> DatabaseBackend {
    DatabaseBackend::Memory
}
fn default_max_connections() -> u32 {
    5
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    2000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_in_flight() -> usize {
    64
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_database_backend(),
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for PeerClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            timeout_secs: default_timeout_secs(),
            tls: None,
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

impl Default for BrokerConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "fedlcm-broker".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: BrokerConfigSpec::default(),
        }
    }
}

impl PeerClientConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DatabaseConfig {
    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.backend {
            DatabaseBackend::Memory => Ok(StorageBackend::InMemory),
            DatabaseBackend::Postgres => {
                let url = self
                    .url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("spec.database.url is required for the postgres backend"))?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: url,
                    max_connections: self.max_connections,
                }))
            }
        }
    }
}

impl BrokerConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. FEDLCM_BROKER_CONFIG environment variable
    /// 2. ./broker-config.yaml (working directory)
    /// 3. /etc/fedlcm/broker-config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("FEDLCM_BROKER_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./broker-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        let system_config = PathBuf::from("/etc/fedlcm/broker-config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment overrides for container deployments
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FEDLCM_DATABASE_URL") {
            tracing::info!("Environment override: FEDLCM_DATABASE_URL");
            self.spec.database.backend = DatabaseBackend::Postgres;
            self.spec.database.url = Some(url);
        }

        if let Ok(val) = std::env::var("FEDLCM_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: FEDLCM_PORT={}", port);
                    self.spec.server.port = port;
                }
                Err(_) => {
                    tracing::warn!("Invalid value for FEDLCM_PORT: '{}'. Ignoring.", val);
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.server.port == 0 {
            anyhow::bail!("spec.server.port cannot be 0");
        }

        if self.spec.database.backend == DatabaseBackend::Postgres
            && self.spec.database.url.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("spec.database.url is required for the postgres backend");
        }

        if self.spec.peer_client.max_attempts == 0 {
            anyhow::bail!("spec.peer_client.max_attempts must be at least 1");
        }

        if self.spec.fanout.max_in_flight == 0 {
            anyhow::bail!("spec.fanout.max_in_flight must be at least 1");
        }

        if let Some(tls) = &self.spec.peer_client.tls {
            if tls.client_cert_path.is_some() != tls.client_key_path.is_some() {
                anyhow::bail!("spec.peer_client.tls requires client_cert_path and client_key_path together");
            }
        }

        match self.spec.observability.log_format.as_str() {
            "compact" | "json" => {}
            other => anyhow::bail!("Invalid log_format: '{}'. Must be 'compact' or 'json'", other),
        }

        Ok(())
    }
}
