//! GET /artifacts/*key: downloads behind locally signed URLs
//!
//! Only active for backends without native presigning. Signature and
//! deadline are checked before the store is touched.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

use super::Rejection;
use crate::error::{ApiError, ApiResult, PipelineError};
use crate::store::ArtifactKey;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// GET /artifacts/*key?expires=..&signature=..
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let result = download(&state, &key, &query).await;
    state.respond(result).await
}

async fn download(
    state: &AppState,
    key: &str,
    query: &SignedQuery,
) -> ApiResult<impl IntoResponse> {
    let signer = state
        .url_signer
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Artifact downloads are served by the store".into()))?;

    signer
        .verify(key, query.expires, &query.signature)
        .map_err(|e| ApiError::Forbidden(e.to_string()))?;

    let artifact: ArtifactKey = key
        .parse()
        .map_err(|_| ApiError::NotFound(format!("No artifact at {}", key)))?;
    let bytes = state
        .pipeline
        .store()
        .get(&artifact)
        .await
        .map_err(PipelineError::from)?;

    Ok(([(header::CONTENT_TYPE, artifact.kind.content_type())], bytes))
}

pub fn artifact_routes() -> Router<AppState> {
    Router::new().route("/artifacts/*key", get(download_artifact))
}
