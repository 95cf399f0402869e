//! HTTP API handlers for singxd-cs
//!
//! Handlers only decode requests and encode responses; every decision about
//! workspaces, tools and artifacts lives in [`crate::pipeline`].

pub mod alignment;
pub mod artifacts;
pub mod health;
pub mod rendering;
pub mod separation;
pub mod sessions;

pub use alignment::alignment_routes;
pub use artifacts::artifact_routes;
pub use health::health_routes;
pub use rendering::rendering_routes;
pub use separation::separation_routes;
pub use sessions::session_routes;

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    Form,
};
use bytes::Bytes;
use tracing::{error, warn};

use crate::error::{ApiError, ApiResult, PipelineError};
use crate::AppState;

/// Error response already shaped for this deployment
#[derive(Debug)]
pub struct Rejection(Response);

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        self.0
    }
}

impl AppState {
    /// Turn a handler result into a response, recording server-side failures
    pub async fn respond<T>(&self, result: ApiResult<T>) -> Result<T, Rejection> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                let status = err.status();
                if status.is_server_error() {
                    error!(status = status.as_u16(), error = %err, "Request failed");
                    *self.last_error.write().await = Some(err.to_string());
                } else {
                    warn!(status = status.as_u16(), error = %err, "Request rejected");
                }
                Err(Rejection(err.into_response_with(self.expose_tool_output)))
            }
        }
    }
}

/// Named fields of a multipart or url-encoded form body
///
/// File parts and text parts are both kept as raw bytes; callers decide
/// which fields are text.
#[derive(Debug, Default)]
pub struct FormFields {
    fields: HashMap<String, Bytes>,
}

impl FormFields {
    /// Raw bytes of a field, if present
    pub fn bytes(&self, name: &str) -> Option<Bytes> {
        self.fields.get(name).cloned()
    }

    /// UTF-8 text of a field, if present
    pub fn text(&self, name: &str) -> ApiResult<Option<String>> {
        self.fields
            .get(name)
            .map(|raw| {
                String::from_utf8(raw.to_vec())
                    .map_err(|_| ApiError::BadRequest(format!("Field {} is not valid UTF-8", name)))
            })
            .transpose()
    }

    /// Non-blank text field, or a validation error naming it
    pub fn required_text(&self, name: &str) -> ApiResult<String> {
        match self.text(name)? {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(PipelineError::Validation(format!("Missing {}", name)).into()),
        }
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("multipart/form-data"));

        let mut fields = HashMap::new();
        if is_multipart {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?
            {
                let Some(name) = field.name().map(str::to_string) else {
                    continue;
                };
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                fields.insert(name, data);
            }
        } else {
            let Form(form) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            fields.extend(form.into_iter().map(|(k, v)| (k, Bytes::from(v))));
        }

        Ok(Self { fields })
    }
}
