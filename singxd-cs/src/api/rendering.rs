//! POST /api/generate-video

use axum::{extract::State, routing::post, Json, Router};

use super::{FormFields, Rejection};
use crate::error::ApiResult;
use crate::pipeline::{RenderOutput, RenderRequest};
use crate::AppState;

/// POST /api/generate-video
///
/// Multipart fields `alignment`, `syncPoints` (JSON text) and `instrumental`,
/// `vocals`, `backgroundImage` (files). Returns `{videoUrl, sessionId}`.
pub async fn generate_video(
    State(state): State<AppState>,
    form: FormFields,
) -> Result<Json<RenderOutput>, Rejection> {
    let result = render(&state, form).await;
    state.respond(result).await.map(Json)
}

async fn render(state: &AppState, form: FormFields) -> ApiResult<RenderOutput> {
    let request = RenderRequest {
        alignment: form.required_text("alignment")?,
        sync_points: form.required_text("syncPoints")?,
        instrumental: form.bytes("instrumental").unwrap_or_default(),
        vocals: form.bytes("vocals").unwrap_or_default(),
        background_image: form.bytes("backgroundImage").unwrap_or_default(),
    };
    Ok(state.pipeline.render(request).await?)
}

pub fn rendering_routes() -> Router<AppState> {
    Router::new().route("/generate-video", post(generate_video))
}
