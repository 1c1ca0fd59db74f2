//! Tabular logging sinks for summary rows.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{GatewayError, GatewayResult};
use crate::pipeline::summary::SummaryRow;
use crate::session::sanitize_filename;

/// Append-only sink accepting one row per (destination, version).
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn append(&self, destination: &str, version: &str, row: &SummaryRow) -> GatewayResult<()>;
}

#[derive(Serialize)]
struct RowRecord<'a> {
    destination: &'a str,
    version: &'a str,
    values: &'a [String],
}

/// Appends JSON lines to `<dir>/<destination>.jsonl`.
#[derive(Debug, Clone)]
pub struct FileRowSink {
    dir: PathBuf,
}

impl FileRowSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, destination: &str) -> PathBuf {
        self.dir
            .join(format!("{}.jsonl", sanitize_filename(destination)))
    }
}

#[async_trait]
impl RowSink for FileRowSink {
    async fn append(&self, destination: &str, version: &str, row: &SummaryRow) -> GatewayResult<()> {
        let record = RowRecord {
            destination,
            version,
            values: row.values(),
        };
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| GatewayError::internal(format!("Failed to encode row: {}", e)))?;
        line.push(b'\n');

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GatewayError::internal(format!("Failed to create row dir: {}", e)))?;

        let path = self.path_for(destination);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| GatewayError::internal(format!("Failed to open {}: {}", path.display(), e)))?;
        file.write_all(&line)
            .await
            .map_err(|e| GatewayError::internal(format!("Failed to append row: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| GatewayError::internal(format!("Failed to flush row: {}", e)))?;
        Ok(())
    }
}

/// POSTs each row as JSON to a webhook fronting the spreadsheet service.
#[derive(Debug, Clone)]
pub struct HttpRowSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRowSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::configuration(format!("Failed to create row client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl RowSink for HttpRowSink {
    async fn append(&self, destination: &str, version: &str, row: &SummaryRow) -> GatewayResult<()> {
        let record = RowRecord {
            destination,
            version,
            values: row.values(),
        };
        let res = self
            .client
            .post(&self.endpoint)
            .json(&record)
            .send()
            .await
            .map_err(|e| GatewayError::internal(format!("Row sink unreachable: {}", e)))?;

        if !res.status().is_success() {
            return Err(GatewayError::internal(format!(
                "Row sink returned status {}",
                res.status()
            )));
        }
        Ok(())
    }
}

/// A row as recorded by [`MemoryRowSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRow {
    pub destination: String,
    pub version: String,
    pub values: Vec<String>,
}

/// In-memory sink, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryRowSink {
    rows: Mutex<Vec<RecordedRow>>,
}

impl MemoryRowSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<RecordedRow> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RowSink for MemoryRowSink {
    async fn append(&self, destination: &str, version: &str, row: &SummaryRow) -> GatewayResult<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| GatewayError::internal("row sink mutex poisoned"))?;
        rows.push(RecordedRow {
            destination: destination.to_string(),
            version: version.to_string(),
            values: row.values().to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileRowSink::new(dir.path());
        let row = SummaryRow::from(vec!["a".to_string(), "b\nc".to_string()]);

        sink.append("sheet-1", "v1", &row).await.unwrap();
        sink.append("sheet-1", "v2", &row).await.unwrap();

        let content = tokio::fs::read_to_string(sink.path_for("sheet-1")).await.unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["version"], "v2");
        assert_eq!(lines[0]["values"][1], "b\nc");
    }

    #[tokio::test]
    async fn test_memory_sink_records_rows() {
        let sink = MemoryRowSink::new();
        sink.append("d", "v", &SummaryRow::from(vec!["x".to_string()]))
            .await
            .unwrap();
        assert_eq!(
            sink.rows(),
            vec![RecordedRow {
                destination: "d".into(),
                version: "v".into(),
                values: vec!["x".into()],
            }]
        );
    }
}
