//! Error types for singxd-cs
//!
//! [`PipelineError`] classifies stage failures; [`ApiError`] maps them onto
//! HTTP responses shaped `{error, code, details?}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Where an unparseable JSON document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseSource {
    /// Client-supplied payload (400)
    Request,
    /// External tool output (500)
    ToolOutput,
}

/// Stage failure taxonomy
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or malformed required field
    #[error("{0}")]
    Validation(String),

    /// Workspace or file I/O failure
    #[error("{context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// External tool exited nonzero
    #[error("{tool} failed (exit code {exit_code:?})")]
    ToolExecution {
        tool: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// External tool exceeded its time budget and was killed
    #[error("{tool} timed out after {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    /// No tool slot became free within the admission window
    #[error("{tool} is at capacity, try again later")]
    Busy { tool: String },

    /// Tool reported success but an expected file is absent
    #[error("{file} was not generated")]
    OutputMissing { file: String },

    /// Store miss for a required artifact
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Malformed JSON
    #[error("Failed to parse {what}: {message}")]
    Parse {
        origin: ParseSource,
        what: String,
        message: String,
    },

    /// Alignment output does not line up with the submitted words
    #[error("Alignment mismatch: {0}")]
    AlignmentMismatch(String),

    /// Artifact store failure other than a miss
    #[error("Artifact store error: {0}")]
    Store(StoreError),
}

impl PipelineError {
    pub fn resource(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Resource {
            context: context.into(),
            source,
        }
    }

    pub fn request_parse(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            origin: ParseSource::Request,
            what: what.into(),
            message: err.to_string(),
        }
    }

    pub fn tool_parse(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            origin: ParseSource::ToolOutput,
            what: what.into(),
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Parse {
                origin: ParseSource::Request,
                ..
            } => StatusCode::BAD_REQUEST,
            PipelineError::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::ToolTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Resource { .. }
            | PipelineError::ToolExecution { .. }
            | PipelineError::OutputMissing { .. }
            | PipelineError::Parse { .. }
            | PipelineError::AlignmentMismatch(_)
            | PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "VALIDATION_ERROR",
            PipelineError::Resource { .. } => "RESOURCE_ERROR",
            PipelineError::ToolExecution { .. } => "TOOL_EXECUTION_ERROR",
            PipelineError::ToolTimeout { .. } => "TOOL_TIMEOUT",
            PipelineError::Busy { .. } => "BUSY",
            PipelineError::OutputMissing { .. } => "OUTPUT_MISSING",
            PipelineError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            PipelineError::Parse { .. } => "PARSE_ERROR",
            PipelineError::AlignmentMismatch(_) => "ALIGNMENT_MISMATCH",
            PipelineError::Store(_) => "STORE_ERROR",
        }
    }

    /// Raw tool diagnostics, if any
    pub fn details(&self) -> Option<&str> {
        match self {
            PipelineError::ToolExecution { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }
}

impl From<singxd_common::Error> for PipelineError {
    fn from(err: singxd_common::Error) -> Self {
        match err {
            singxd_common::Error::Parse(e) => PipelineError::request_parse("request JSON", e),
            singxd_common::Error::Io(e) => PipelineError::resource("I/O failure", e),
            other => PipelineError::Validation(other.to_string()),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => PipelineError::ArtifactNotFound(key),
            other => PipelineError::Store(other),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Stage failure
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Invalid request outside any stage (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Signed URL rejected (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(e) => e.status(),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Response with tool diagnostics included or withheld
    pub fn into_response_with(self, expose_details: bool) -> Response {
        let status = self.status();
        let (code, message, details) = match &self {
            ApiError::Pipeline(e) => (
                e.code(),
                e.to_string(),
                e.details().filter(|_| expose_details).map(str::to_string),
            ),
            ApiError::BadRequest(msg) => ("BAD_REQUEST", msg.clone(), None),
            ApiError::NotFound(msg) => ("NOT_FOUND", msg.clone(), None),
            ApiError::Forbidden(msg) => ("FORBIDDEN", msg.clone(), None),
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = json!(details);
        }

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_response_with(true)
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            PipelineError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PipelineError::ArtifactNotFound("k".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PipelineError::request_parse("lyrics", "eof").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PipelineError::tool_parse("timings", "eof").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            PipelineError::OutputMissing {
                file: "vocals.wav".into()
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_miss_becomes_artifact_not_found() {
        let err: PipelineError = StoreError::NotFound("creates/x/vocals.wav".into()).into();
        assert!(matches!(err, PipelineError::ArtifactNotFound(_)));
    }

    #[tokio::test]
    async fn test_tool_failure_body_has_details() {
        let err = ApiError::from(PipelineError::ToolExecution {
            tool: "separation".into(),
            exit_code: Some(1),
            output: "Traceback: boom".into(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("separation"));
        assert_eq!(body["details"], "Traceback: boom");
        assert_eq!(body["code"], "TOOL_EXECUTION_ERROR");
    }

    #[tokio::test]
    async fn test_details_withheld_when_not_exposed() {
        let err = ApiError::from(PipelineError::ToolExecution {
            tool: "alignment".into(),
            exit_code: Some(2),
            output: "/srv/secret/path".into(),
        });
        let body = body_json(err.into_response_with(false)).await;
        assert!(body.get("details").is_none());
    }
}
