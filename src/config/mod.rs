//! Configuration module for infergate.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a gateway process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Identity reported by server metadata.
    pub server: ServerInfo,
    /// REST listener configuration (legacy and v2 dialects).
    pub http: HttpConfig,
    /// RPC listener configuration.
    pub grpc: GrpcConfig,
    /// Model repository configuration.
    pub repository: RepositoryConfig,
    /// Model dispatch configuration.
    pub dispatch: DispatchConfig,
    /// Grace period granted to in-flight requests on stop.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
    /// Observability configuration.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerInfo::default(),
            http: HttpConfig::default(),
            grpc: GrpcConfig::default(),
            repository: RepositoryConfig::default(),
            dispatch: DispatchConfig::default(),
            shutdown_grace: Duration::from_secs(5),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            GatewayError::Config(format!("Failed to parse config: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.server.name.trim().is_empty() {
            return Err(GatewayError::InvalidConfig {
                field: "server.name".to_string(),
                reason: "Server name must not be empty".to_string(),
            });
        }

        if !self.http.enabled && !self.grpc.enabled {
            return Err(GatewayError::InvalidConfig {
                field: "http.enabled".to_string(),
                reason: "At least one listener must be enabled".to_string(),
            });
        }

        // Port 0 asks the OS for an ephemeral port, so two such listeners never collide
        if self.http.enabled
            && self.grpc.enabled
            && self.http.bind_addr == self.grpc.bind_addr
            && self.http.bind_addr.port() != 0
        {
            return Err(GatewayError::InvalidConfig {
                field: "grpc.bind_addr".to_string(),
                reason: format!("Conflicts with http.bind_addr {}", self.http.bind_addr),
            });
        }

        if self.http.max_body_size == 0 {
            return Err(GatewayError::InvalidConfig {
                field: "http.max_body_size".to_string(),
                reason: "Body limit must be non-zero".to_string(),
            });
        }

        if self.grpc.max_message_size == 0 {
            return Err(GatewayError::InvalidConfig {
                field: "grpc.max_message_size".to_string(),
                reason: "Message limit must be non-zero".to_string(),
            });
        }

        if self.dispatch.blocking_workers == Some(0) {
            return Err(GatewayError::InvalidConfig {
                field: "dispatch.blocking_workers".to_string(),
                reason: "Worker pool size must be non-zero when set".to_string(),
            });
        }

        Ok(())
    }

    /// Create a loopback configuration on ephemeral ports.
    pub fn development() -> Self {
        let loopback = SocketAddr::from(([127, 0, 0, 1], 0));
        Self {
            server: ServerInfo::default(),
            http: HttpConfig {
                bind_addr: loopback,
                ..HttpConfig::default()
            },
            grpc: GrpcConfig {
                bind_addr: loopback,
                ..GrpcConfig::default()
            },
            repository: RepositoryConfig {
                model_dir: PathBuf::from("/tmp/infergate/models"),
            },
            dispatch: DispatchConfig::default(),
            shutdown_grace: Duration::from_secs(1),
            observability: ObservabilityConfig {
                metrics_enabled: false,
                log_level: "debug".to_string(),
                json_logs: false,
            },
        }
    }
}

/// Server identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// REST listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Enable the REST listener.
    pub enabled: bool,
    /// Address to bind the REST listener.
    pub bind_addr: SocketAddr,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_body_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// RPC listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcConfig {
    /// Enable the RPC listener.
    pub enabled: bool,
    /// Address to bind the RPC listener.
    pub bind_addr: SocketAddr,
    /// Maximum encoded or decoded message size in bytes.
    pub max_message_size: usize,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            max_message_size: 100 * 1024 * 1024,
        }
    }
}

/// Model repository configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root directory holding one subdirectory per model.
    pub model_dir: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("/mnt/models"),
        }
    }
}

/// How synchronous model code is dispatched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Bounded blocking pool size; synchronous models run inline when unset.
    #[serde(default)]
    pub blocking_workers: Option<usize>,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics at `GET /metrics`.
    pub metrics_enabled: bool,
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<u64>()
                .map(|v| Duration::from_secs(v * 60))
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }
}
