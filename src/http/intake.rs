//! Multipart intake.
//!
//! Streams `file` parts into the staging directory and collects the `options`
//! and `version` text parts. Never fails outright: read errors are carried on
//! the [`Submission`] together with whatever was already staged, so the
//! pipeline can still audit and release it.

use std::path::Path;

use axum::extract::multipart::{Field, Multipart};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::pipeline::Submission;
use crate::session::{sanitize_filename, StagedFile};

pub const FILE_FIELD: &str = "file";
pub const OPTIONS_FIELD: &str = "options";
pub const VERSION_FIELD: &str = "version";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Read every part of the request.
pub async fn stage_multipart(
    staging_dir: &Path,
    request_id: Uuid,
    mut multipart: Multipart,
) -> Submission {
    let mut submission = Submission::default();

    if let Err(e) = tokio::fs::create_dir_all(staging_dir).await {
        tracing::error!(path = ?staging_dir, error = %e, "Staging directory unavailable");
        submission.intake_error = Some(GatewayError::internal(format!(
            "Staging directory unavailable: {}",
            e
        )));
        return submission;
    }

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Malformed multipart body");
                submission.intake_error = Some(GatewayError::input_validation(format!(
                    "Malformed upload: {}",
                    e.body_text()
                )));
                break;
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let outcome = match name.as_str() {
            FILE_FIELD => {
                let index = submission.files.len();
                stage_file(staging_dir, request_id, index, field, &mut submission.files).await
            }
            OPTIONS_FIELD => read_text(field).await.map(|t| submission.options = Some(t)),
            VERSION_FIELD => read_text(field)
                .await
                .map(|t| submission.requested_version = Some(t.trim().to_string())),
            other => {
                tracing::debug!(request_id = %request_id, field = other, "Ignoring unknown part");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            submission.intake_error = Some(e);
            break;
        }
    }

    submission
}

async fn read_text(field: Field<'_>) -> GatewayResult<String> {
    let name = field.name().unwrap_or_default().to_string();
    field.text().await.map_err(|e| {
        GatewayError::input_validation(format!("Failed to read '{}': {}", name, e.body_text()))
    })
}

/// Stream one file part to disk. The descriptor is recorded before any byte is
/// written so a partial file is still released.
async fn stage_file(
    staging_dir: &Path,
    request_id: Uuid,
    index: usize,
    mut field: Field<'_>,
    files: &mut Vec<StagedFile>,
) -> GatewayResult<()> {
    let original_name = field.file_name().unwrap_or("document").to_string();
    let content_type = field
        .content_type()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();
    let path = staging_dir.join(format!(
        "{}_{}_{}",
        request_id,
        index,
        sanitize_filename(&original_name)
    ));

    let mut out = tokio::fs::File::create(&path).await.map_err(|e| {
        GatewayError::internal(format!("Failed to stage '{}': {}", original_name, e))
    })?;
    files.push(StagedFile {
        original_name: original_name.clone(),
        content_type,
        size: 0,
        path,
    });
    let staged = files.len() - 1;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                return Err(GatewayError::input_validation(format!(
                    "Failed to read '{}': {}",
                    original_name,
                    e.body_text()
                )));
            }
        };
        out.write_all(&chunk).await.map_err(|e| {
            GatewayError::internal(format!("Failed to stage '{}': {}", original_name, e))
        })?;
        files[staged].size += chunk.len() as u64;
    }

    out.flush().await.map_err(|e| {
        GatewayError::internal(format!("Failed to stage '{}': {}", original_name, e))
    })?;
    tracing::debug!(
        request_id = %request_id,
        file = %original_name,
        size = files[staged].size,
        "File staged"
    );
    Ok(())
}
