//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration for the analysis gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Version used when neither the request nor the user picks one.
    pub default_version: String,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend version definitions, keyed by version name.
    pub backends: BTreeMap<String, BackendVersionConfig>,

    /// Timeout configuration for outbound calls.
    pub timeouts: TimeoutConfig,

    /// Upload intake settings.
    pub uploads: UploadConfig,

    /// Authorization store location.
    pub users: UserStoreConfig,

    /// Audit snapshot store settings.
    pub audit: AuditConfig,

    /// Tabular logging sink settings.
    pub tabular: TabularConfig,

    /// Conditional option injection policies.
    pub policy: PolicyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_version: "v1".to_string(),
            listener: ListenerConfig::default(),
            backends: BTreeMap::new(),
            timeouts: TimeoutConfig::default(),
            uploads: UploadConfig::default(),
            users: UserStoreConfig::default(),
            audit: AuditConfig::default(),
            tabular: TabularConfig::default(),
            policy: PolicyConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One deployed instance of the analysis service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendVersionConfig {
    /// Invocation endpoint (e.g., "http://analysis-v1.internal/analyze").
    pub endpoint: String,

    /// HTTP method used for the call.
    #[serde(default = "default_method")]
    pub method: String,

    /// Header carrying the credential.
    #[serde(default = "default_credential_header")]
    pub credential_header: String,

    /// Credential value, sent verbatim in `credential_header`.
    #[serde(default)]
    pub credential: Option<String>,

    /// Per-version override of `timeouts.backend_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Response field name → column index within the dynamic row block.
    #[serde(default)]
    pub fields: BTreeMap<String, usize>,

    /// Ordered labels of the path outputs, one column each.
    #[serde(default)]
    pub path_labels: Vec<String>,

    /// Tabular logging destination for rows of this version.
    #[serde(default)]
    pub tabular_destination: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_credential_header() -> String {
    "Authorization".to_string()
}

/// Timeout configuration for outbound operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total backend call timeout in seconds (0 disables it).
    pub backend_secs: u64,

    /// Timeout for audit and tabular sink calls in seconds.
    pub sink_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            backend_secs: 600,
            sink_secs: 30,
        }
    }
}

/// Upload intake configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory where uploaded files are staged until release.
    pub staging_dir: PathBuf,

    /// Accepted MIME types for file parts.
    pub allowed_content_types: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            staging_dir: std::env::temp_dir().join("analysis-gateway"),
            allowed_content_types: vec!["application/pdf".to_string()],
            max_body_bytes: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// Authorization store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UserStoreConfig {
    /// Path to the user directory TOML file.
    pub path: PathBuf,

    /// Reload the directory when the file changes.
    pub watch: bool,
}

impl Default for UserStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("users.toml"),
            watch: true,
        }
    }
}

/// Audit snapshot store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Root directory for snapshots (`<root>/<user>/<request>.json`).
    pub root: PathBuf,

    /// Base URL under which snapshots are browsable, used for row links.
    pub link_base: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("audit"),
            link_base: None,
        }
    }
}

/// Kind of tabular sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TabularSinkKind {
    /// Append JSON lines to `<dir>/<destination>.jsonl`.
    File,
    /// POST each row to `endpoint`.
    Http,
}

/// Tabular logging sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TabularConfig {
    pub kind: TabularSinkKind,

    /// Output directory for the file sink.
    pub dir: PathBuf,

    /// Webhook for the HTTP sink.
    pub endpoint: Option<String>,

    /// Destination used when the version declares none (or none was resolved).
    pub default_destination: String,
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            kind: TabularSinkKind::File,
            dir: PathBuf::from("rows"),
            endpoint: None,
            default_destination: "gateway".to_string(),
        }
    }
}

/// Option injection policies, evaluated in declaration order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub injections: Vec<InjectionPolicy>,
}

/// Derive `target_field` from `source_field` for whitelisted users.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InjectionPolicy {
    /// Policy identifier for logging.
    pub name: String,

    /// Users this policy applies to.
    pub users: Vec<String>,

    /// Identifying field read from the options.
    pub source_field: String,

    /// Derived field written to the options.
    pub target_field: String,

    /// Prefix table; the first matching prefix wins.
    pub prefixes: Vec<PrefixRule>,
}

/// One row of a prefix lookup table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrefixRule {
    pub prefix: String,
    pub value: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
