//! Summary row construction for tabular logging.
//!
//! # Layout
//! ```text
//! | request | gateway ver | backend ver | error | date | time | duration | user | file | metadata |
//! | field columns (by configured index) ... | path label columns (declared order) ... |
//! ```
//!
//! # Design Decisions
//! - Building never fails: it runs on success and failure paths alike
//! - Every cell is a sanitized, trimmed string; missing lookups are empty

use serde_json::Value;

use crate::audit::user_dir_name;
use crate::config::BackendVersionConfig;
use crate::session::ProcessingSession;

/// Number of leading audit columns shared by every version.
pub const FIXED_COLUMNS: usize = 10;

/// Exclusive upper bound on a configured field column index.
pub const MAX_FIELD_COLUMNS: usize = 1024;

/// Cell text used when an object cannot be serialized.
pub const UNSERIALIZABLE: &str = "[unserializable]";

/// One flattened record of a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SummaryRow(Vec<String>);

impl SummaryRow {
    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_values(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for SummaryRow {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

/// Render a JSON value as a single trimmed cell.
pub fn sanitize(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(sanitize).collect::<Vec<_>>().join("\n"),
        Value::Object(_) => {
            serde_json::to_string(value).unwrap_or_else(|_| UNSERIALIZABLE.to_string())
        }
    };
    text.trim().to_string()
}

/// [`sanitize`] for an optional lookup; missing is empty.
pub fn sanitize_opt(value: Option<&Value>) -> String {
    value.map(sanitize).unwrap_or_default()
}

/// Projects a session onto a summary row.
#[derive(Debug, Clone, Default)]
pub struct SummaryRowBuilder {
    link_base: Option<String>,
}

impl SummaryRowBuilder {
    /// `link_base` is the URL prefix under which audit snapshots are browsable.
    pub fn new(link_base: Option<String>) -> Self {
        Self {
            link_base: link_base.map(|b| b.trim_end_matches('/').to_string()),
        }
    }

    /// Width of the dynamic block for a version.
    pub fn dynamic_width(backend: &BackendVersionConfig) -> usize {
        field_width(backend) + backend.path_labels.len()
    }

    pub fn build(
        &self,
        session: &ProcessingSession,
        backend: Option<&BackendVersionConfig>,
    ) -> SummaryRow {
        let mut cells = Vec::with_capacity(FIXED_COLUMNS + backend.map(Self::dynamic_width).unwrap_or(0));

        cells.push(self.request_cell(session));
        cells.push(env!("CARGO_PKG_VERSION").to_string());
        cells.push(session.version().unwrap_or_default().to_string());
        cells.push(error_status(session));
        cells.push(session.started_at().format("%Y-%m-%d").to_string());
        cells.push(session.started_at().format("%H:%M:%S").to_string());
        cells.push(format!("{:.3}", session.duration().as_secs_f64()));
        cells.push(session.user_id().to_string());
        cells.push(file_names(session));
        cells.push(sanitize_opt(
            session.api_request().and_then(|r| r.options.get("metadata")),
        ));

        if let Some(backend) = backend {
            let data = session
                .response()
                .and_then(|r| r.body.get("data"));
            cells.extend(field_cells(backend, data));
            cells.extend(path_cells(backend, data));
        }

        SummaryRow(cells.into_iter().map(|c| c.trim().to_string()).collect())
    }

    fn request_cell(&self, session: &ProcessingSession) -> String {
        let id = session.request_id();
        match &self.link_base {
            Some(base) => format!(
                "=HYPERLINK(\"{}/{}/{}.json\",\"{}\")",
                base,
                user_dir_name(session.user_id()).replace('%', "%25"),
                id,
                id
            ),
            None => id.to_string(),
        }
    }
}

fn field_width(backend: &BackendVersionConfig) -> usize {
    backend
        .fields
        .values()
        .filter(|&&column| column < MAX_FIELD_COLUMNS)
        .max()
        .and_then(|m| m.checked_add(1))
        .unwrap_or(0)
}

fn error_status(session: &ProcessingSession) -> String {
    if let Some(err) = session.error() {
        return match err.status {
            Some(status) => format!("{} ({}): {}", err.kind, status, err.message),
            None => format!("{}: {}", err.kind, err.message),
        };
    }
    match session.response() {
        Some(r) if r.is_backend_error() => format!("backend error: HTTP {}", r.status),
        _ => String::new(),
    }
}

fn file_names(session: &ProcessingSession) -> String {
    if !session.files().is_empty() {
        return session
            .files()
            .iter()
            .map(|f| f.original_name.as_str())
            .collect::<Vec<_>>()
            .join("\n");
    }
    session
        .api_request()
        .map(|r| r.file_names.join("\n"))
        .unwrap_or_default()
}

fn field_cells(backend: &BackendVersionConfig, data: Option<&Value>) -> Vec<String> {
    let mut cells = vec![String::new(); field_width(backend)];
    let entries = data
        .and_then(|d| d.get("response"))
        .and_then(Value::as_array);

    for (name, &column) in &backend.fields {
        let value = entries.and_then(|entries| {
            entries
                .iter()
                .find(|e| e.get("name").and_then(Value::as_str) == Some(name.as_str()))
                .and_then(|e| e.get("value"))
        });
        // Out-of-range columns are rejected at config load; skip them here.
        if let Some(cell) = cells.get_mut(column) {
            *cell = sanitize_opt(value);
        }
    }
    cells
}

fn path_cells(backend: &BackendVersionConfig, data: Option<&Value>) -> Vec<String> {
    let entries = path_entries(data.and_then(|d| d.get("path")));
    backend
        .path_labels
        .iter()
        .map(|label| {
            entries
                .iter()
                .find(|(l, _)| l == label)
                .map(|(_, v)| sanitize(v))
                .unwrap_or_default()
        })
        .collect()
}

/// Accepts `[label, values]`, `[[label, values], ...]` and `[{label, values}, ...]`.
fn path_entries(path: Option<&Value>) -> Vec<(String, Value)> {
    let items = match path.and_then(Value::as_array) {
        Some(items) => items,
        None => return Vec::new(),
    };

    if let (Some(Value::String(label)), Some(values)) = (items.first(), items.get(1)) {
        if items.len() == 2 && !values.is_array() {
            return vec![(label.clone(), values.clone())];
        }
    }

    items
        .iter()
        .filter_map(|item| match item {
            Value::Array(pair) => {
                let label = pair.first()?.as_str()?;
                Some((label.to_string(), pair.get(1).cloned().unwrap_or(Value::Null)))
            }
            Value::Object(map) => {
                let label = map.get("label")?.as_str()?;
                let values = map
                    .get("values")
                    .or_else(|| map.get("value"))
                    .cloned()
                    .unwrap_or(Value::Null);
                Some((label.to_string(), values))
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::session::{ApiRequestSnapshot, CapturedResponse};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn backend() -> BackendVersionConfig {
        BackendVersionConfig {
            endpoint: "http://localhost/analyze".into(),
            method: "POST".into(),
            credential_header: "Authorization".into(),
            credential: None,
            timeout_secs: None,
            fields: BTreeMap::from([("score".to_string(), 0), ("label".to_string(), 2)]),
            path_labels: vec!["pages".into(), "sections".into()],
            tabular_destination: None,
        }
    }

    fn session_with(body: Value) -> ProcessingSession {
        let mut session = ProcessingSession::new(Uuid::new_v4(), "acme");
        session
            .set_api_request(ApiRequestSnapshot {
                requested_version: None,
                options: json!({"metadata": {"ref": "R-1"}}),
                file_names: vec!["scan.pdf".into()],
                received_at: Utc::now(),
            })
            .unwrap();
        session.set_version("v1").unwrap();
        session
            .set_response(CapturedResponse {
                status: 200,
                headers: BTreeMap::new(),
                body,
            })
            .unwrap();
        session
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(&Value::Null), "");
        assert_eq!(sanitize(&json!(["a", "b"])), "a\nb");
        assert_eq!(sanitize(&json!({"x": 1})), r#"{"x":1}"#);
        assert_eq!(sanitize(&json!("  padded ")), "padded");
        assert_eq!(sanitize(&json!(3.5)), "3.5");
        assert_eq!(sanitize(&json!([null, " x "])), "x");
        assert_eq!(sanitize_opt(None), "");
    }

    #[test]
    fn test_row_layout_with_dynamic_columns() {
        let session = session_with(json!({
            "data": {
                "response": [
                    {"name": "score", "value": 0.93},
                    {"name": "label", "value": ["invoice", "signed"]},
                    {"name": "unmapped", "value": "x"}
                ],
                "path": [["pages", "1,2,3"]],
                "version": "2.0"
            }
        }));

        let row = SummaryRowBuilder::new(None).build(&session, Some(&backend()));
        let values = row.values();

        assert_eq!(row.len(), FIXED_COLUMNS + 3 + 2);
        assert_eq!(values[0], session.request_id().to_string());
        assert_eq!(values[2], "v1");
        assert_eq!(values[3], "");
        assert_eq!(values[7], "acme");
        assert_eq!(values[8], "scan.pdf");
        assert_eq!(values[9], r#"{"ref":"R-1"}"#);
        assert_eq!(values[FIXED_COLUMNS], "0.93");
        assert_eq!(values[FIXED_COLUMNS + 1], "");
        assert_eq!(values[FIXED_COLUMNS + 2], "invoice\nsigned");
        assert_eq!(values[FIXED_COLUMNS + 3], "1,2,3");
        assert_eq!(values[FIXED_COLUMNS + 4], "");
    }

    #[test]
    fn test_single_pair_path_and_link() {
        let session = session_with(json!({"data": {"path": ["sections", "a,b"]}}));
        let row = SummaryRowBuilder::new(Some("https://audit.example/".into()))
            .build(&session, Some(&backend()));
        let values = row.values();

        let id = session.request_id();
        assert_eq!(
            values[0],
            format!("=HYPERLINK(\"https://audit.example/acme/{id}.json\",\"{id}\")")
        );
        assert_eq!(values[FIXED_COLUMNS + 4], "a,b");
        assert_eq!(values[FIXED_COLUMNS], "");

        let session = ProcessingSession::new(Uuid::new_v4(), "team/a");
        let row = SummaryRowBuilder::new(Some("https://audit.example".into())).build(&session, None);
        let id = session.request_id();
        assert_eq!(
            row.values()[0],
            format!("=HYPERLINK(\"https://audit.example/team%252Fa/{id}.json\",\"{id}\")")
        );
    }

    #[test]
    fn test_error_row_without_backend() {
        let mut session = ProcessingSession::new(Uuid::new_v4(), "acme");
        session
            .set_error(GatewayError::backend("connection refused"))
            .unwrap();

        let row = SummaryRowBuilder::new(None).build(&session, None);
        assert_eq!(row.len(), FIXED_COLUMNS);
        assert_eq!(row.values()[3], "backend: connection refused");
        assert_eq!(row.values()[8], "");
    }

    #[test]
    fn test_backend_error_status_text() {
        let mut session = ProcessingSession::new(Uuid::new_v4(), "acme");
        session
            .set_api_request(ApiRequestSnapshot {
                requested_version: None,
                options: json!("not json"),
                file_names: vec![],
                received_at: Utc::now(),
            })
            .unwrap();
        session
            .set_response(CapturedResponse {
                status: 503,
                headers: BTreeMap::new(),
                body: json!("busy"),
            })
            .unwrap();

        let row = SummaryRowBuilder::new(None).build(&session, Some(&backend()));
        assert_eq!(row.values()[3], "backend error: HTTP 503");
        assert_eq!(row.values()[9], "");
        assert_eq!(row.len(), FIXED_COLUMNS + 5);
    }

    #[test]
    fn test_oversized_column_is_skipped() {
        let session = session_with(json!({
            "data": {"response": [{"name": "score", "value": 1}, {"name": "huge", "value": 2}]}
        }));
        let mut backend = backend();
        backend.fields.insert("huge".into(), usize::MAX);
        backend.fields.insert("big".into(), MAX_FIELD_COLUMNS);

        let row = SummaryRowBuilder::new(None).build(&session, Some(&backend));
        assert_eq!(row.len(), FIXED_COLUMNS + 3 + 2);
        assert_eq!(row.values()[FIXED_COLUMNS], "1");
        assert!(!row.values().iter().any(|v| v == "2"));
    }
}
