//! Backend version resolution.
//!
//! # Responsibilities
//! - Pick the backend version for a request from the caller's authorization
//! - Report which rule produced the choice
//! - Look the choice up in the backend table
//!
//! # Design Decisions
//! - Rules are an explicit ordered list; the first rule that yields a version wins
//! - Resolution is total: the global default always answers
//! - Existence of the resolved version is checked separately (configuration error)

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::User;
use crate::config::BackendVersionConfig;
use crate::error::{GatewayError, GatewayResult};

/// One step of the resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionRule {
    /// Requested version is non-empty and authorized for the user.
    AuthorizedRequest,
    /// The user's configured default.
    UserDefault,
    /// First entry of the user's authorized versions.
    FirstAuthorized,
    /// The gateway-wide default.
    GlobalDefault,
}

impl ResolutionRule {
    /// Evaluation order.
    pub const ORDER: [ResolutionRule; 4] = [
        ResolutionRule::AuthorizedRequest,
        ResolutionRule::UserDefault,
        ResolutionRule::FirstAuthorized,
        ResolutionRule::GlobalDefault,
    ];

    fn apply(&self, requested: Option<&str>, user: &User, global_default: &str) -> Option<String> {
        match self {
            ResolutionRule::AuthorizedRequest => requested
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .filter(|v| user.authorized_versions.iter().any(|a| a == v))
                .map(str::to_string),
            ResolutionRule::UserDefault => user
                .default_version
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            ResolutionRule::FirstAuthorized => user.authorized_versions.first().cloned(),
            ResolutionRule::GlobalDefault => Some(global_default.to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionRule::AuthorizedRequest => "authorized_request",
            ResolutionRule::UserDefault => "user_default",
            ResolutionRule::FirstAuthorized => "first_authorized",
            ResolutionRule::GlobalDefault => "global_default",
        }
    }
}

/// Outcome of resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub version: String,
    pub rule: ResolutionRule,
}

/// Resolves backend versions against an immutable backend table.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    default_version: String,
    backends: Arc<BTreeMap<String, BackendVersionConfig>>,
}

impl VersionResolver {
    pub fn new(
        default_version: impl Into<String>,
        backends: Arc<BTreeMap<String, BackendVersionConfig>>,
    ) -> Self {
        Self {
            default_version: default_version.into(),
            backends,
        }
    }

    /// Pick a version. Never fails.
    pub fn resolve(&self, requested: Option<&str>, user: &User) -> Resolution {
        resolve_version(requested, user, &self.default_version)
    }

    /// Look up the configuration for a resolved version.
    pub fn backend(&self, version: &str) -> GatewayResult<&BackendVersionConfig> {
        self.backends.get(version).ok_or_else(|| {
            GatewayError::configuration(format!("Unknown backend version '{}'", version))
        })
    }

    pub fn backends(&self) -> &BTreeMap<String, BackendVersionConfig> {
        &self.backends
    }
}

/// Apply the resolution rules in order.
pub fn resolve_version(requested: Option<&str>, user: &User, global_default: &str) -> Resolution {
    for rule in ResolutionRule::ORDER {
        if let Some(version) = rule.apply(requested, user, global_default) {
            return Resolution { version, rule };
        }
    }
    // GlobalDefault always yields.
    Resolution {
        version: global_default.to_string(),
        rule: ResolutionRule::GlobalDefault,
    }
}
