//! Separation: one mixed track in, vocal and instrumental stems out

use bytes::Bytes;
use serde::Serialize;
use singxd_common::SessionId;
use tracing::info;

use super::Pipeline;
use crate::error::PipelineError;
use crate::store::ArtifactKind;

const INPUT_FILE: &str = "input.mp3";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparationOutput {
    pub vocals_url: String,
    pub instrumental_url: String,
    pub session_id: SessionId,
}

impl Pipeline {
    /// Split `audio` into stems and store both under a new session
    pub async fn separate(&self, audio: Bytes) -> Result<SeparationOutput, PipelineError> {
        if audio.is_empty() {
            return Err(PipelineError::Validation(
                "No audio file provided".to_string(),
            ));
        }

        let workspace = self.workspaces.acquire("separation")?;
        let input_path = workspace.write(INPUT_FILE, &audio).await?;

        self.invoker
            .invoke(&self.tools.separation, [input_path.as_os_str(), workspace.path().as_os_str()])
            .await?;

        // Exit status alone is not trusted
        let stems = [ArtifactKind::Vocals, ArtifactKind::Instrumental];
        let mut blobs = Vec::with_capacity(stems.len());
        for kind in stems {
            let bytes = workspace.read(kind.file_name()).await?;
            blobs.push((kind, Bytes::from(bytes)));
        }
        workspace.release();

        let session = SessionId::generate();
        let ttl = self.retention.stem_ttl();
        for (kind, bytes) in blobs {
            self.store.put(&self.key(session, kind), bytes, Some(ttl)).await?;
        }

        let vocals_url = self.presign(&self.key(session, ArtifactKind::Vocals)).await?;
        let instrumental_url = self
            .presign(&self.key(session, ArtifactKind::Instrumental))
            .await?;

        info!(session_id = %session, "Separation complete");
        Ok(SeparationOutput {
            vocals_url,
            instrumental_url,
            session_id: session,
        })
    }
}
