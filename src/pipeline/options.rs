//! Typed request options and conditional policy injection.
//!
//! # Responsibilities
//! - Parse submitted options into a typed structure, keeping unknown fields
//! - Derive missing fields for whitelisted users from prefix tables
//!
//! # Design Decisions
//! - The "target already set" check precedes every derivation, so applying
//!   the transformer twice is the same as applying it once
//! - Policies and prefix rows are evaluated in declaration order
//! - Unknown users or missing source fields leave options untouched

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::InjectionPolicy;
use crate::error::{GatewayError, GatewayResult};

/// Options submitted alongside the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Requested backend version override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Free-form report metadata echoed into the summary row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    /// Every other field, forwarded to the backend unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Field names with a typed home in [`AnalysisOptions`].
pub const RESERVED_FIELDS: [&str; 2] = ["version", "metadata"];

impl AnalysisOptions {
    /// Parse the `options` part. Absent or blank input yields empty options.
    pub fn parse(raw: Option<&str>) -> GatewayResult<Self> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(Self::default()),
            Some(raw) => raw,
        };

        let value: Value = serde_json::from_str(raw)
            .map_err(|e| GatewayError::input_validation(format!("Malformed options JSON: {}", e)))?;
        if !value.is_object() {
            return Err(GatewayError::input_validation(
                "Options must be a JSON object",
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| GatewayError::input_validation(format!("Invalid options: {}", e)))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.extra.get(field)
    }

    /// A field counts as set when present and not null.
    pub fn is_set(&self, field: &str) -> bool {
        self.get(field).map(|v| !v.is_null()).unwrap_or(false)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.extra.insert(field.into(), value);
    }

    pub fn to_json(&self) -> GatewayResult<String> {
        serde_json::to_string(self)
            .map_err(|e| GatewayError::internal(format!("Failed to encode options: {}", e)))
    }
}

/// A value injected by a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    pub policy: String,
    pub source_field: String,
    pub target_field: String,
    pub value: String,
}

impl Derivation {
    /// Session log line for this derivation.
    pub fn describe(&self) -> String {
        format!(
            "Policy '{}' set {} = '{}' from {}",
            self.policy, self.target_field, self.value, self.source_field
        )
    }
}

/// Applies injection policies to options.
#[derive(Debug, Clone, Default)]
pub struct OptionsTransformer {
    policies: Vec<InjectionPolicy>,
}

impl OptionsTransformer {
    pub fn new(policies: Vec<InjectionPolicy>) -> Self {
        Self { policies }
    }

    /// Apply every policy matching `user_id`, returning what was derived.
    pub fn apply(&self, user_id: &str, options: &mut AnalysisOptions) -> Vec<Derivation> {
        let mut derived = Vec::new();

        for policy in &self.policies {
            if !policy.users.iter().any(|u| u == user_id) {
                continue;
            }
            if options.is_set(&policy.target_field) {
                continue;
            }
            let source = match options.get(&policy.source_field).and_then(Value::as_str) {
                Some(s) => s,
                None => continue,
            };
            let rule = match policy.prefixes.iter().find(|r| source.starts_with(&r.prefix)) {
                Some(r) => r,
                None => continue,
            };

            let derivation = Derivation {
                policy: policy.name.clone(),
                source_field: policy.source_field.clone(),
                target_field: policy.target_field.clone(),
                value: rule.value.clone(),
            };
            options.set(
                policy.target_field.clone(),
                Value::String(rule.value.clone()),
            );
            derived.push(derivation);
        }

        derived
    }

    /// By-value form of [`OptionsTransformer::apply`].
    pub fn transform(&self, user_id: &str, mut options: AnalysisOptions) -> AnalysisOptions {
        self.apply(user_id, &mut options);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrefixRule;
    use serde_json::json;

    fn transformer() -> OptionsTransformer {
        OptionsTransformer::new(vec![InjectionPolicy {
            name: "client-code".into(),
            users: vec!["acme".into()],
            source_field: "account_id".into(),
            target_field: "client_code".into(),
            prefixes: vec![
                PrefixRule {
                    prefix: "AC-".into(),
                    value: "acme-main".into(),
                },
                PrefixRule {
                    prefix: "A".into(),
                    value: "acme-other".into(),
                },
            ],
        }])
    }

    fn options(value: Value) -> AnalysisOptions {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_keeps_unknown_fields() {
        let opts = AnalysisOptions::parse(Some(r#"{"version":"v2","language":"de"}"#)).unwrap();
        assert_eq!(opts.version.as_deref(), Some("v2"));
        assert_eq!(opts.get("language"), Some(&json!("de")));

        let round: Value = serde_json::from_str(&opts.to_json().unwrap()).unwrap();
        assert_eq!(round, json!({"version": "v2", "language": "de"}));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let err = AnalysisOptions::parse(Some("{not json")).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InputValidation);
        assert!(AnalysisOptions::parse(Some("[1,2]")).is_err());
        assert_eq!(AnalysisOptions::parse(Some("  ")).unwrap(), AnalysisOptions::default());
    }

    #[test]
    fn test_derives_for_whitelisted_user() {
        let mut opts = options(json!({"account_id": "AC-1234"}));
        let derived = transformer().apply("acme", &mut opts);

        assert_eq!(derived.len(), 1);
        assert_eq!(opts.get("client_code"), Some(&json!("acme-main")));
        assert!(derived[0].describe().contains("client_code"));
    }

    #[test]
    fn test_first_prefix_in_declaration_order_wins() {
        let mut opts = options(json!({"account_id": "AX-9"}));
        transformer().apply("acme", &mut opts);
        assert_eq!(opts.get("client_code"), Some(&json!("acme-other")));
    }

    #[test]
    fn test_leaves_options_unchanged() {
        let t = transformer();

        let original = options(json!({"account_id": "AC-1"}));
        assert_eq!(t.transform("someone-else", original.clone()), original);

        let original = options(json!({"other": 1}));
        assert_eq!(t.transform("acme", original.clone()), original);

        let original = options(json!({"account_id": "AC-1", "client_code": "explicit"}));
        assert_eq!(t.transform("acme", original.clone()), original);

        let original = options(json!({"account_id": "ZZ-1"}));
        assert_eq!(t.transform("acme", original.clone()), original);
    }

    #[test]
    fn test_idempotent() {
        let t = transformer();
        let inputs = [
            json!({"account_id": "AC-1"}),
            json!({"account_id": "AQ"}),
            json!({"account_id": 42}),
            json!({"client_code": null, "account_id": "AC-2"}),
            json!({}),
        ];
        for input in inputs {
            let once = t.transform("acme", options(input.clone()));
            let twice = t.transform("acme", once.clone());
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }
}
