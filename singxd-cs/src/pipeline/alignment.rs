//! Alignment: stored vocals plus lyrics in, one timing per word out
//!
//! The alignment tool reads a lyrics file and writes a JSON array with one
//! entry per word. Its output is checked against the submitted words before
//! anything is returned: same count, valid windows, and where the tool echoes
//! the word text, the same word at the same position.

use serde::Deserialize;
use singxd_common::sync_map::{validate_window, AlignmentResult, SyncPoint, Timing, WordStream};
use singxd_common::SessionId;
use tracing::info;

use super::Pipeline;
use crate::error::PipelineError;
use crate::store::ArtifactKind;

const VOCALS_FILE: &str = "vocals.wav";
const LYRICS_FILE: &str = "lyrics.txt";
const OUTPUT_FILE: &str = "alignment.json";

/// Lyrics as submitted by a client
#[derive(Debug, Clone)]
pub enum LyricsInput {
    /// JSON array of lines of words; yields word timings
    Structured(String),
    /// Plain text, one lyric line per text line; yields sync points plus lines
    FreeText(String),
}

impl LyricsInput {
    fn word_stream(&self) -> Result<WordStream, PipelineError> {
        let stream = match self {
            LyricsInput::Structured(json) => WordStream::from_lines_json(json)?,
            LyricsInput::FreeText(text) => WordStream::from_text(text)?,
        };
        Ok(stream)
    }

    /// Text handed to the tool
    fn transcript(&self, stream: &WordStream) -> String {
        match self {
            LyricsInput::Structured(_) => stream.to_word_transcript(),
            LyricsInput::FreeText(_) => stream.to_line_transcript(),
        }
    }
}

/// One entry of the alignment tool's output
#[derive(Debug, Clone, Deserialize)]
pub struct ToolTiming {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Pipeline {
    /// Align lyrics against the vocals stored for `session_id`
    pub async fn align(
        &self,
        session_id: &str,
        lyrics: LyricsInput,
    ) -> Result<AlignmentResult, PipelineError> {
        let session: SessionId = session_id.parse()?;
        let stream = lyrics.word_stream()?;

        let workspace = self.workspaces.acquire("alignment")?;

        // A miss must surface before any tool runs
        let vocals = self.store.get(&self.key(session, ArtifactKind::Vocals)).await?;

        let vocals_path = workspace.write(VOCALS_FILE, &vocals).await?;
        let lyrics_path = workspace
            .write(LYRICS_FILE, lyrics.transcript(&stream).as_bytes())
            .await?;
        let output_path = workspace.file(OUTPUT_FILE)?;

        self.invoker
            .invoke(
                &self.tools.alignment,
                [
                    vocals_path.as_os_str(),
                    lyrics_path.as_os_str(),
                    output_path.as_os_str(),
                ],
            )
            .await?;

        let raw = workspace.read(OUTPUT_FILE).await?;
        workspace.release();

        let entries: Vec<ToolTiming> = serde_json::from_slice(&raw)
            .map_err(|e| PipelineError::tool_parse("alignment output", e))?;
        let timings = check_alignment(&stream, &entries)?;

        info!(
            session_id = %session,
            words = timings.len(),
            lines = stream.line_lengths().len(),
            "Alignment complete"
        );

        match lyrics {
            LyricsInput::Structured(_) => Ok(AlignmentResult::WordTimings { timings }),
            LyricsInput::FreeText(_) => {
                let sync_points: Vec<SyncPoint> =
                    timings.into_iter().map(SyncPoint::from).collect();
                let alignment = stream
                    .resolve(&sync_points)
                    .map_err(|e| PipelineError::AlignmentMismatch(e.to_string()))?;
                Ok(AlignmentResult::Resolved {
                    sync_points,
                    alignment,
                })
            }
        }
    }
}

/// Validate tool output against the submitted words
pub(crate) fn check_alignment(
    stream: &WordStream,
    entries: &[ToolTiming],
) -> Result<Vec<Timing>, PipelineError> {
    if entries.len() != stream.len() {
        return Err(PipelineError::AlignmentMismatch(format!(
            "{} words submitted, tool returned {} timings",
            stream.len(),
            entries.len()
        )));
    }

    let mut timings = Vec::with_capacity(entries.len());
    for (position, (entry, word)) in entries.iter().zip(stream.words()).enumerate() {
        validate_window(entry.start, entry.end, position)
            .map_err(|e| PipelineError::AlignmentMismatch(e.to_string()))?;

        if let Some(echoed) = &entry.text {
            if echoed.trim().to_lowercase() != word.to_lowercase() {
                return Err(PipelineError::AlignmentMismatch(format!(
                    "entry {}: tool aligned '{}' where '{}' was submitted",
                    position,
                    echoed.trim(),
                    word
                )));
            }
        }
        timings.push(Timing {
            start: entry.start,
            end: entry.end,
            confidence: entry.confidence,
        });
    }
    Ok(timings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(start: f64, end: f64, text: Option<&str>) -> ToolTiming {
        ToolTiming {
            start,
            end,
            text: text.map(str::to_string),
            confidence: None,
        }
    }

    #[test]
    fn test_check_accepts_matching_output() {
        let stream = WordStream::from_text("Hello world").unwrap();
        let timings = check_alignment(
            &stream,
            &[entry(0.0, 0.4, Some("hello")), entry(0.5, 0.9, Some(" WORLD "))],
        )
        .unwrap();
        assert_eq!(timings.len(), 2);
        assert_eq!(timings[1].start, 0.5);
    }

    #[test]
    fn test_check_rejects_short_output() {
        let stream = WordStream::from_text("a b c").unwrap();
        let err = check_alignment(&stream, &[entry(0.0, 1.0, None), entry(1.0, 2.0, None)])
            .unwrap_err();
        assert!(matches!(err, PipelineError::AlignmentMismatch(_)));
    }

    #[test]
    fn test_check_rejects_reordered_output() {
        let stream = WordStream::from_text("a b").unwrap();
        let err = check_alignment(
            &stream,
            &[entry(0.0, 1.0, Some("b")), entry(1.0, 2.0, Some("a"))],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::AlignmentMismatch(_)));
    }

    #[test]
    fn test_check_rejects_inverted_window() {
        let stream = WordStream::from_text("a").unwrap();
        assert!(check_alignment(&stream, &[entry(2.0, 1.0, None)]).is_err());
    }

    #[test]
    fn test_tool_output_without_text_is_accepted() {
        let raw = r#"[{"start":0.0,"end":0.5},{"start":0.5,"end":1.0,"confidence":0.93}]"#;
        let entries: Vec<ToolTiming> = serde_json::from_str(raw).unwrap();
        let stream = WordStream::from_text("x y").unwrap();
        assert!(check_alignment(&stream, &entries).is_ok());
    }

    #[test]
    fn test_confidence_is_carried_into_timings() {
        let raw = r#"[{"start":0.0,"end":0.5,"text":"x"},{"start":0.5,"end":1.0,"text":"y","confidence":0.93}]"#;
        let entries: Vec<ToolTiming> = serde_json::from_str(raw).unwrap();
        let stream = WordStream::from_text("x y").unwrap();

        let timings = check_alignment(&stream, &entries).unwrap();

        assert_eq!(timings[0].confidence, None);
        assert_eq!(timings[1].confidence, Some(0.93));
    }
}
