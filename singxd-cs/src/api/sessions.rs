//! Session artifact management
//!
//! Listing, re-presigning and deleting the artifacts of one session.

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use singxd_common::SessionId;

use super::Rejection;
use crate::error::{ApiError, ApiResult, PipelineError};
use crate::store::ArtifactKind;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ArtifactEntry {
    pub kind: ArtifactKind,
    pub key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionArtifactsResponse {
    pub session_id: SessionId,
    pub artifacts: Vec<ArtifactEntry>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactUrlResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSessionResponse {
    pub session_id: SessionId,
    pub deleted: usize,
}

fn parse_session(raw: &str) -> ApiResult<SessionId> {
    raw.parse::<SessionId>()
        .map_err(|e| ApiError::from(PipelineError::from(e)))
}

/// GET /api/sessions/:session_id/artifacts
pub async fn list_artifacts(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionArtifactsResponse>, Rejection> {
    let result = list(&state, &session_id).await;
    state.respond(result).await.map(Json)
}

async fn list(state: &AppState, session_id: &str) -> ApiResult<SessionArtifactsResponse> {
    let session = parse_session(session_id)?;
    let keys = state.pipeline.session_artifacts(session).await?;
    Ok(SessionArtifactsResponse {
        session_id: session,
        artifacts: keys
            .into_iter()
            .map(|key| ArtifactEntry {
                kind: key.kind,
                key: key.to_string(),
            })
            .collect(),
    })
}

/// GET /api/sessions/:session_id/artifacts/:kind
///
/// Fresh presigned URL for one artifact.
pub async fn artifact_url(
    State(state): State<AppState>,
    Path((session_id, kind)): Path<(String, String)>,
) -> Result<Json<ArtifactUrlResponse>, Rejection> {
    let result = presign(&state, &session_id, &kind).await;
    state.respond(result).await.map(Json)
}

async fn presign(state: &AppState, session_id: &str, kind: &str) -> ApiResult<ArtifactUrlResponse> {
    let session = parse_session(session_id)?;
    let kind: ArtifactKind = kind
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown artifact kind: {}", kind)))?;
    let url = state.pipeline.presign(&state.pipeline.key(session, kind)).await?;
    Ok(ArtifactUrlResponse { url })
}

/// DELETE /api/sessions/:session_id
///
/// Idempotent: deleting an unknown or already emptied session succeeds.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, Rejection> {
    let result = delete_all(&state, &session_id).await;
    state.respond(result).await.map(Json)
}

async fn delete_all(state: &AppState, session_id: &str) -> ApiResult<DeleteSessionResponse> {
    let session = parse_session(session_id)?;
    let deleted = state.pipeline.delete_session(session).await?;
    Ok(DeleteSessionResponse {
        session_id: session,
        deleted,
    })
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/:session_id", delete(delete_session))
        .route("/sessions/:session_id/artifacts", get(list_artifacts))
        .route("/sessions/:session_id/artifacts/:kind", get(artifact_url))
}
