//! Alignment endpoints
//!
//! - POST /api/generate-timings: structured lyrics, word timings out
//! - POST /api/generate-alignment: free-text lyrics, sync points and lines out

use axum::{extract::State, routing::post, Json, Router};
use singxd_common::sync_map::AlignmentResult;

use super::{FormFields, Rejection};
use crate::error::ApiResult;
use crate::pipeline::LyricsInput;
use crate::AppState;

/// POST /api/generate-timings
///
/// Fields `sessionID` and `lyrics` (JSON array of lines). The response
/// carries `timings`, one entry per submitted word in submission order.
pub async fn generate_timings(
    State(state): State<AppState>,
    form: FormFields,
) -> Result<Json<AlignmentResult>, Rejection> {
    let result = align(&state, form, LyricsInput::Structured).await;
    state.respond(result).await.map(Json)
}

/// POST /api/generate-alignment
///
/// Fields `sessionID` and `lyrics` (plain text). The response carries
/// `syncPoints` and the line-resolved `alignment`.
pub async fn generate_alignment(
    State(state): State<AppState>,
    form: FormFields,
) -> Result<Json<AlignmentResult>, Rejection> {
    let result = align(&state, form, LyricsInput::FreeText).await;
    state.respond(result).await.map(Json)
}

async fn align(
    state: &AppState,
    form: FormFields,
    variant: fn(String) -> LyricsInput,
) -> ApiResult<AlignmentResult> {
    let session_id = form.required_text("sessionID")?;
    let lyrics = form.required_text("lyrics")?;
    Ok(state.pipeline.align(&session_id, variant(lyrics)).await?)
}

pub fn alignment_routes() -> Router<AppState> {
    Router::new()
        .route("/generate-timings", post(generate_timings))
        .route("/generate-alignment", post(generate_alignment))
}
