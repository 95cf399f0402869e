//! POST /api/separate-audio

use axum::{extract::State, routing::post, Json, Router};

use super::{FormFields, Rejection};
use crate::error::ApiResult;
use crate::pipeline::SeparationOutput;
use crate::AppState;

/// POST /api/separate-audio
///
/// Multipart field `audio`. Returns `{vocalsUrl, instrumentalUrl, sessionId}`.
pub async fn separate_audio(
    State(state): State<AppState>,
    form: FormFields,
) -> Result<Json<SeparationOutput>, Rejection> {
    let result = separate(&state, form).await;
    state.respond(result).await.map(Json)
}

async fn separate(state: &AppState, form: FormFields) -> ApiResult<SeparationOutput> {
    // An absent field is treated like an empty upload
    let audio = form.bytes("audio").unwrap_or_default();
    Ok(state.pipeline.separate(audio).await?)
}

pub fn separation_routes() -> Router<AppState> {
    Router::new().route("/separate-audio", post(separate_audio))
}
