//! User directory (authorization store).
//!
//! # Responsibilities
//! - Parse the `[[users]]` TOML file
//! - Index users by id and by bearer token
//! - Publish snapshots that stay immutable for a whole request
//!
//! # Design Decisions
//! - Reloads swap the whole directory atomically (`arc-swap`)
//! - Handlers take one snapshot up front and never observe a reload mid-request

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;

/// Rate-limit data carried on the user record. Enforcement lives elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    pub requests_per_minute: Option<u32>,
    pub burst: Option<u32>,
}

/// An authorized caller.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct User {
    pub id: String,

    /// Bearer token presented by the caller.
    #[serde(skip_serializing)]
    pub token: String,

    pub rate_limit: RateLimitPolicy,

    /// Backend versions the user may request, in preference order.
    pub authorized_versions: Vec<String>,

    pub default_version: Option<String>,

    /// Allow-list of response fields.
    pub available_fields: Vec<String>,

    /// Deny-list of response fields.
    pub restricted_fields: Vec<String>,
}

impl User {
    /// Create a user with no versions or field restrictions.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct UserFile {
    #[serde(default)]
    users: Vec<User>,
}

/// Read-only map from user id (and token) to user record.
#[derive(Debug, Default)]
pub struct UserDirectory {
    by_id: HashMap<String, Arc<User>>,
    by_token: HashMap<String, Arc<User>>,
}

impl UserDirectory {
    /// Build a directory from user records. Later duplicates replace earlier ones.
    pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        let mut directory = Self::default();
        for user in users {
            let user = Arc::new(user);
            if !user.token.is_empty() {
                directory.by_token.insert(user.token.clone(), user.clone());
            }
            directory.by_id.insert(user.id.clone(), user);
        }
        directory
    }

    /// Parse a directory from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: UserFile = toml::from_str(content)?;
        Ok(Self::from_users(file.users))
    }

    /// Load a directory from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<User>> {
        self.by_id.get(user_id).cloned()
    }

    pub fn authenticate(&self, token: &str) -> Option<Arc<User>> {
        self.by_token.get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Shared, hot-swappable handle to the current directory.
#[derive(Debug, Clone)]
pub struct SharedDirectory {
    inner: Arc<ArcSwap<UserDirectory>>,
}

impl SharedDirectory {
    pub fn new(directory: UserDirectory) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(directory)),
        }
    }

    /// Snapshot for the duration of one request.
    pub fn snapshot(&self) -> Arc<UserDirectory> {
        self.inner.load_full()
    }

    /// Atomically publish a new directory.
    pub fn replace(&self, directory: UserDirectory) {
        tracing::info!(users = directory.len(), "User directory replaced");
        self.inner.store(Arc::new(directory));
    }
}
