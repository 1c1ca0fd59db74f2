//! Outbound call to an analysis backend.
//!
//! # Responsibilities
//! - Build the multipart request (file parts + JSON options part)
//! - Perform exactly one call to the resolved version's endpoint
//! - Capture status, headers and the full body verbatim
//!
//! # Design Decisions
//! - Any HTTP status is a result; only transport failures are errors
//! - No response size limit; the whole body is read before anything is forwarded
//! - No retries

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::config::{BackendVersionConfig, TimeoutConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::pipeline::options::AnalysisOptions;
use crate::session::{CapturedResponse, StagedFile};

/// Performs backend calls over a pooled HTTP client.
#[derive(Debug, Clone)]
pub struct BackendInvoker {
    client: Client,
    default_timeout: Option<Duration>,
}

impl BackendInvoker {
    pub fn new(timeouts: &TimeoutConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                GatewayError::configuration(format!("Failed to create backend client: {}", e))
            })?;

        let default_timeout = match timeouts.backend_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            client,
            default_timeout,
        })
    }

    /// Call the backend once and capture whatever it answers.
    pub async fn invoke(
        &self,
        version: &str,
        backend: &BackendVersionConfig,
        options: &AnalysisOptions,
        files: &[StagedFile],
    ) -> GatewayResult<CapturedResponse> {
        let method = Method::from_bytes(backend.method.as_bytes()).map_err(|_| {
            GatewayError::configuration(format!(
                "Backend '{}' has invalid method '{}'",
                version, backend.method
            ))
        })?;

        let form = build_form(options, files).await?;

        let mut request = self.client.request(method, &backend.endpoint).multipart(form);
        if let Some(credential) = &backend.credential {
            request = request.header(backend.credential_header.as_str(), credential.as_str());
        }
        let timeout = backend
            .timeout_secs
            .map(Duration::from_secs)
            .or(self.default_timeout);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!(version = %version, endpoint = %backend.endpoint, files = files.len(), "Invoking backend");
        let start = Instant::now();

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                metrics::record_backend_call(version, "transport_error", start);
                tracing::error!(version = %version, error = %e, "Backend transport failure");
                return Err(GatewayError::backend(describe_transport_error(&e)));
            }
        };

        let status = response.status().as_u16();
        let headers = capture_headers(response.headers());
        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                metrics::record_backend_call(version, "transport_error", start);
                tracing::error!(version = %version, status, error = %e, "Failed to read backend body");
                return Err(GatewayError::backend(format!(
                    "Failed to read backend response: {}",
                    e
                )));
            }
        };

        metrics::record_backend_call(version, &status.to_string(), start);
        if status >= 400 {
            metrics::record_backend_error(version, status);
            tracing::warn!(version = %version, status, "Backend returned error status");
        }

        let body = serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        Ok(CapturedResponse {
            status,
            headers,
            body,
        })
    }
}

async fn build_form(options: &AnalysisOptions, files: &[StagedFile]) -> GatewayResult<Form> {
    let options_part = Part::text(options.to_json()?)
        .mime_str("application/json")
        .map_err(|e| GatewayError::internal(format!("Invalid options MIME type: {}", e)))?;
    let mut form = Form::new().part("options", options_part);

    for file in files {
        let data = tokio::fs::read(&file.path).await.map_err(|e| {
            GatewayError::input_validation(format!(
                "Uploaded file '{}' could not be read: {}",
                file.original_name, e
            ))
        })?;
        let part = Part::bytes(data)
            .file_name(file.original_name.clone())
            .mime_str(&file.content_type)
            .map_err(|_| {
                GatewayError::input_validation(format!(
                    "Invalid content type '{}' for '{}'",
                    file.content_type, file.original_name
                ))
            })?;
        form = form.part("file", part);
    }

    Ok(form)
}

fn capture_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut captured: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        captured
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    captured
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("Backend call timed out: {}", err)
    } else if err.is_connect() {
        format!("Backend connection failed: {}", err)
    } else {
        format!("Backend request failed: {}", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_joined() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.append("x-trace", "a".parse().unwrap());
        headers.append("x-trace", "b".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());

        let captured = capture_headers(&headers);
        assert_eq!(captured["x-trace"], "a, b");
        assert_eq!(captured["content-type"], "application/json");
    }

    #[test]
    fn test_zero_timeout_disables_default() {
        let invoker = BackendInvoker::new(&TimeoutConfig {
            connect_secs: 1,
            backend_secs: 0,
            sink_secs: 1,
        })
        .unwrap();
        assert!(invoker.default_timeout.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_input_error() {
        let files = vec![StagedFile {
            original_name: "gone.pdf".into(),
            content_type: "application/pdf".into(),
            size: 0,
            path: "/nonexistent/gone.pdf".into(),
        }];
        let err = build_form(&AnalysisOptions::default(), &files)
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InputValidation);
    }
}
