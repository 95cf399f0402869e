//! Rendering: alignment, sync points and three uploads in, a video URL out
//!
//! Rendering is stateless with respect to earlier stages. The video is stored
//! under a session ID minted here, unrelated to any separation session.

use bytes::Bytes;
use serde::Serialize;
use singxd_common::sync_map::{validate_sync_points, ResolvedAlignment, SyncPoint};
use singxd_common::SessionId;
use tracing::info;

use super::Pipeline;
use crate::error::PipelineError;
use crate::store::ArtifactKind;

const ALIGNMENT_FILE: &str = "alignment.json";
const SYNC_POINTS_FILE: &str = "sync_points.json";
const BACKGROUND_FILE: &str = "background.png";
const INSTRUMENTAL_FILE: &str = "instrumental.wav";
const VOCALS_FILE: &str = "vocals.wav";
const OUTPUT_FILE: &str = "output.mp4";

/// Raw render inputs as received from the client
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub alignment: String,
    pub sync_points: String,
    pub instrumental: Bytes,
    pub vocals: Bytes,
    pub background_image: Bytes,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    pub video_url: String,
    pub session_id: SessionId,
}

/// Parsed and cross-checked render inputs
#[derive(Debug)]
struct ValidatedRender {
    alignment: ResolvedAlignment,
    sync_points: Vec<SyncPoint>,
}

impl RenderRequest {
    fn validate(&self) -> Result<ValidatedRender, PipelineError> {
        for (field, bytes) in [
            ("instrumental", &self.instrumental),
            ("vocals", &self.vocals),
            ("backgroundImage", &self.background_image),
        ] {
            if bytes.is_empty() {
                return Err(PipelineError::Validation(format!(
                    "No {} file provided",
                    field
                )));
            }
        }

        let alignment: ResolvedAlignment = serde_json::from_str(&self.alignment)
            .map_err(|e| PipelineError::request_parse("alignment", e))?;
        let sync_points: Vec<SyncPoint> = serde_json::from_str(&self.sync_points)
            .map_err(|e| PipelineError::request_parse("syncPoints", e))?;

        validate_sync_points(&sync_points)?;
        alignment.validate_against(&sync_points)?;

        Ok(ValidatedRender {
            alignment,
            sync_points,
        })
    }
}

impl Pipeline {
    /// Render a lyric video and store it under a fresh session
    pub async fn render(&self, request: RenderRequest) -> Result<RenderOutput, PipelineError> {
        // Nothing touches disk or the store until the request is known good
        let validated = request.validate()?;

        let workspace = self.workspaces.acquire("render")?;

        // Re-serialized from the parsed form: the tool sees canonical JSON
        let alignment_json = serde_json::to_vec(&validated.alignment)
            .map_err(|e| PipelineError::Validation(format!("alignment: {}", e)))?;
        let sync_points_json = serde_json::to_vec(&validated.sync_points)
            .map_err(|e| PipelineError::Validation(format!("syncPoints: {}", e)))?;

        let alignment_path = workspace.write(ALIGNMENT_FILE, &alignment_json).await?;
        let sync_points_path = workspace.write(SYNC_POINTS_FILE, &sync_points_json).await?;
        let background_path = workspace
            .write(BACKGROUND_FILE, &request.background_image)
            .await?;
        let instrumental_path = workspace
            .write(INSTRUMENTAL_FILE, &request.instrumental)
            .await?;
        let vocals_path = workspace.write(VOCALS_FILE, &request.vocals).await?;
        let output_path = workspace.file(OUTPUT_FILE)?;

        self.invoker
            .invoke(
                &self.tools.rendering,
                [
                    alignment_path.as_os_str(),
                    sync_points_path.as_os_str(),
                    background_path.as_os_str(),
                    instrumental_path.as_os_str(),
                    vocals_path.as_os_str(),
                    output_path.as_os_str(),
                ],
            )
            .await?;

        let video = workspace.read(OUTPUT_FILE).await?;
        workspace.release();

        let session = SessionId::generate();
        let key = self.key(session, ArtifactKind::Video);
        self.store
            .put(&key, Bytes::from(video), Some(self.retention.video_ttl()))
            .await?;
        let video_url = self.presign(&key).await?;

        info!(
            session_id = %session,
            lines = validated.alignment.lines.len(),
            "Render complete"
        );
        Ok(RenderOutput {
            video_url,
            session_id: session,
        })
    }
}
