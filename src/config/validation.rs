//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (default version references an existing backend)
//! - Validate endpoints, methods and column layouts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashMap;

use reqwest::Method;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, TabularSinkKind};
use crate::pipeline::options::RESERVED_FIELDS;
use crate::pipeline::summary::MAX_FIELD_COLUMNS;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("default version '{0}' has no backend definition")]
    UnknownDefaultVersion(String),

    #[error("backend '{version}' has invalid endpoint '{endpoint}'")]
    InvalidEndpoint { version: String, endpoint: String },

    #[error("backend '{version}' has invalid method '{method}'")]
    InvalidMethod { version: String, method: String },

    #[error("backend '{version}' maps fields '{first}' and '{second}' to column {column}")]
    DuplicateColumn {
        version: String,
        first: String,
        second: String,
        column: usize,
    },

    #[error("backend '{version}' maps field '{field}' to column {column}, limit is {limit}")]
    ColumnOutOfRange {
        version: String,
        field: String,
        column: usize,
        limit: usize,
    },

    #[error("injection policy '{0}' has empty source or target field")]
    EmptyInjectionField(String),

    #[error("injection policy '{policy}' uses reserved field '{field}'")]
    ReservedInjectionField { policy: String, field: String },

    #[error("tabular sink kind 'http' requires an endpoint")]
    MissingTabularEndpoint,
}

/// Check the configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.backends.contains_key(&config.default_version) {
        errors.push(ValidationError::UnknownDefaultVersion(
            config.default_version.clone(),
        ));
    }

    for (version, backend) in &config.backends {
        if url::Url::parse(&backend.endpoint).is_err() {
            errors.push(ValidationError::InvalidEndpoint {
                version: version.clone(),
                endpoint: backend.endpoint.clone(),
            });
        }

        if Method::from_bytes(backend.method.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidMethod {
                version: version.clone(),
                method: backend.method.clone(),
            });
        }

        let mut seen: HashMap<usize, &str> = HashMap::new();
        for (field, column) in &backend.fields {
            if *column >= MAX_FIELD_COLUMNS {
                errors.push(ValidationError::ColumnOutOfRange {
                    version: version.clone(),
                    field: field.clone(),
                    column: *column,
                    limit: MAX_FIELD_COLUMNS,
                });
                continue;
            }
            if let Some(first) = seen.insert(*column, field) {
                errors.push(ValidationError::DuplicateColumn {
                    version: version.clone(),
                    first: first.to_string(),
                    second: field.clone(),
                    column: *column,
                });
            }
        }
    }

    for policy in &config.policy.injections {
        if policy.source_field.is_empty() || policy.target_field.is_empty() {
            errors.push(ValidationError::EmptyInjectionField(policy.name.clone()));
        }
        for field in [&policy.source_field, &policy.target_field] {
            if RESERVED_FIELDS.contains(&field.as_str()) {
                errors.push(ValidationError::ReservedInjectionField {
                    policy: policy.name.clone(),
                    field: field.clone(),
                });
            }
        }
    }

    if config.tabular.kind == TabularSinkKind::Http && config.tabular.endpoint.is_none() {
        errors.push(ValidationError::MissingTabularEndpoint);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendVersionConfig, InjectionPolicy};

    fn backend(endpoint: &str) -> BackendVersionConfig {
        BackendVersionConfig {
            endpoint: endpoint.to_string(),
            method: "POST".to_string(),
            credential_header: "Authorization".to_string(),
            credential: None,
            timeout_secs: None,
            fields: Default::default(),
            path_labels: Vec::new(),
            tabular_destination: None,
        }
    }

    #[test]
    fn test_default_config_requires_backend() {
        let errors = validate_config(&GatewayConfig::default()).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UnknownDefaultVersion("v1".into())]
        );
    }

    #[test]
    fn test_duplicate_column_detected() {
        let mut config = GatewayConfig::default();
        let mut b = backend("http://localhost:9000/analyze");
        b.fields.insert("a".into(), 0);
        b.fields.insert("b".into(), 0);
        config.backends.insert("v1".into(), b);

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::DuplicateColumn { column: 0, .. }));
    }

    #[test]
    fn test_column_out_of_range_detected() {
        let mut config = GatewayConfig::default();
        let mut b = backend("http://localhost:9000/analyze");
        b.fields.insert("ok".into(), MAX_FIELD_COLUMNS - 1);
        b.fields.insert("huge".into(), usize::MAX);
        config.backends.insert("v1".into(), b);

        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::ColumnOutOfRange {
                version: "v1".into(),
                field: "huge".into(),
                column: usize::MAX,
                limit: MAX_FIELD_COLUMNS,
            }]
        );
    }

    #[test]
    fn test_bad_method_and_policy() {
        let mut config = GatewayConfig::default();
        let mut b = backend("http://localhost:9000/analyze");
        b.method = "NOT A METHOD".into();
        config.backends.insert("v1".into(), b);
        config.policy.injections.push(InjectionPolicy {
            name: "empty".into(),
            users: vec![],
            source_field: String::new(),
            target_field: "x".into(),
            prefixes: vec![],
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_reserved_injection_field_rejected() {
        let mut config = GatewayConfig::default();
        config
            .backends
            .insert("v1".into(), backend("http://localhost:9000/analyze"));
        config.policy.injections.push(InjectionPolicy {
            name: "meta".into(),
            users: vec!["acme".into()],
            source_field: "account_id".into(),
            target_field: "metadata".into(),
            prefixes: vec![],
        });

        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::ReservedInjectionField {
                policy: "meta".into(),
                field: "metadata".into(),
            }]
        );
    }

    #[test]
    fn test_http_sink_requires_endpoint() {
        let mut config = GatewayConfig::default();
        config
            .backends
            .insert("v1".into(), backend("http://localhost:9000/analyze"));
        config.tabular.kind = TabularSinkKind::Http;

        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::MissingTabularEndpoint]
        );
    }
}
