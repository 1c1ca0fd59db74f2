//! Per-user response field redaction.
//!
//! The allow-list wins whenever it is non-empty, even if a deny-list is also
//! configured.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::User;

/// One `{name, value}` entry of a backend response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedField {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// Field policy derived from a user's capability sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFilter {
    AllowList(HashSet<String>),
    DenyList(HashSet<String>),
    PassThrough,
}

impl ResponseFilter {
    pub fn new(available_fields: &[String], restricted_fields: &[String]) -> Self {
        if !available_fields.is_empty() {
            ResponseFilter::AllowList(available_fields.iter().cloned().collect())
        } else if !restricted_fields.is_empty() {
            ResponseFilter::DenyList(restricted_fields.iter().cloned().collect())
        } else {
            ResponseFilter::PassThrough
        }
    }

    pub fn for_user(user: &User) -> Self {
        Self::new(&user.available_fields, &user.restricted_fields)
    }

    pub fn permits(&self, name: &str) -> bool {
        match self {
            ResponseFilter::AllowList(allowed) => allowed.contains(name),
            ResponseFilter::DenyList(denied) => !denied.contains(name),
            ResponseFilter::PassThrough => true,
        }
    }

    pub fn filter_fields(&self, fields: &[NamedField]) -> Vec<NamedField> {
        fields
            .iter()
            .filter(|f| self.permits(&f.name))
            .cloned()
            .collect()
    }

    /// Copy of `body` with `data.response` entries filtered. The input is untouched.
    pub fn filter_payload(&self, body: &Value) -> Value {
        let mut copy = body.clone();
        if *self == ResponseFilter::PassThrough {
            return copy;
        }

        if let Some(entries) = copy
            .get_mut("data")
            .and_then(|d| d.get_mut("response"))
            .and_then(Value::as_array_mut)
        {
            entries.retain(|entry| {
                entry
                    .get("name")
                    .and_then(Value::as_str)
                    .map(|name| self.permits(name))
                    // Unnamed entries survive only when nothing is allow-listed.
                    .unwrap_or(!matches!(self, ResponseFilter::AllowList(_)))
            });
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<NamedField> {
        vec![
            NamedField {
                name: "A".into(),
                value: json!(1),
            },
            NamedField {
                name: "B".into(),
                value: json!(2),
            },
        ]
    }

    fn names(fields: &[NamedField]) -> Vec<&str> {
        fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_allow_list() {
        let filter = ResponseFilter::new(&["A".into()], &[]);
        assert_eq!(names(&filter.filter_fields(&fields())), vec!["A"]);
    }

    #[test]
    fn test_deny_list() {
        let filter = ResponseFilter::new(&[], &["B".into()]);
        assert_eq!(names(&filter.filter_fields(&fields())), vec!["A"]);
    }

    #[test]
    fn test_allow_list_wins_over_deny_list() {
        let filter = ResponseFilter::new(&["B".into()], &["B".into()]);
        assert_eq!(names(&filter.filter_fields(&fields())), vec!["B"]);
    }

    #[test]
    fn test_pass_through() {
        let filter = ResponseFilter::new(&[], &[]);
        assert_eq!(filter.filter_fields(&fields()), fields());
    }

    #[test]
    fn test_payload_copy_is_filtered_and_original_untouched() {
        let body = json!({
            "data": {
                "response": [
                    {"name": "A", "value": 1},
                    {"name": "B", "value": 2},
                    {"value": 3}
                ],
                "path": [["pages", "1,2"]],
                "version": "2.1"
            }
        });
        let original = body.clone();

        let filtered = ResponseFilter::new(&[], &["B".into()]).filter_payload(&body);
        assert_eq!(filtered["data"]["response"].as_array().unwrap().len(), 2);
        assert_eq!(filtered["data"]["path"], original["data"]["path"]);
        assert_eq!(body, original);

        let allowed = ResponseFilter::new(&["A".into()], &[]).filter_payload(&body);
        assert_eq!(allowed["data"]["response"], json!([{"name": "A", "value": 1}]));
    }

    #[test]
    fn test_payload_without_response_list() {
        let body = json!("upstream exploded");
        let filter = ResponseFilter::new(&["A".into()], &[]);
        assert_eq!(filter.filter_payload(&body), body);
    }
}
