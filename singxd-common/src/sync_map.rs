//! Sync map data model
//!
//! Lyrics arrive either as structured lines of words or as free text. Both are
//! flattened into a [`WordStream`]: one entry per word, in submission order.
//! The flattened position is the join key between words and the timing
//! entries produced by alignment.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// A single lyric word as submitted by the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    /// Position in the flattened stream (informational, submission order wins)
    #[serde(default)]
    pub index: usize,
}

/// An ordered line of words
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub words: Vec<Word>,
}

/// Start/end of one aligned word, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub start: f64,
    pub end: f64,
    /// Aligner's score for this word, when it reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Caller-supplied timing window for one word, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncPoint {
    pub start: f64,
    pub end: f64,
}

impl From<Timing> for SyncPoint {
    fn from(t: Timing) -> Self {
        Self {
            start: t.start,
            end: t.end,
        }
    }
}

/// One rendered line: its words plus the span they cover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLine {
    pub words: Vec<String>,
    pub start: f64,
    pub end: f64,
    pub first_word_index: usize,
}

/// Line-granular alignment consumed by the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAlignment {
    pub lines: Vec<ResolvedLine>,
}

/// Alignment stage result
///
/// Word-level timings and line-resolved alignment used to travel as two
/// unrelated shapes; they now share one tagged type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AlignmentResult {
    /// One timing per submitted word, in submission order
    #[serde(rename_all = "camelCase")]
    WordTimings { timings: Vec<Timing> },
    /// Per-word sync points plus the line segmentation built from them
    #[serde(rename_all = "camelCase")]
    Resolved {
        sync_points: Vec<SyncPoint>,
        alignment: ResolvedAlignment,
    },
}

impl AlignmentResult {
    /// Number of per-word entries carried by the result
    pub fn word_count(&self) -> usize {
        match self {
            AlignmentResult::WordTimings { timings } => timings.len(),
            AlignmentResult::Resolved { sync_points, .. } => sync_points.len(),
        }
    }
}

/// Check a single `[start, end]` window
pub fn validate_window(start: f64, end: f64, position: usize) -> Result<()> {
    if !start.is_finite() || !end.is_finite() {
        return Err(Error::InvalidInput(format!(
            "entry {}: start/end must be finite numbers",
            position
        )));
    }
    if start < 0.0 {
        return Err(Error::InvalidInput(format!(
            "entry {}: start {} is negative",
            position, start
        )));
    }
    if end < start {
        return Err(Error::InvalidInput(format!(
            "entry {}: end {} precedes start {}",
            position, end, start
        )));
    }
    Ok(())
}

/// Validate every sync point in order
pub fn validate_sync_points(points: &[SyncPoint]) -> Result<()> {
    points
        .iter()
        .enumerate()
        .try_for_each(|(i, p)| validate_window(p.start, p.end, i))
}

/// Lyrics flattened to one entry per word
#[derive(Debug, Clone, PartialEq)]
pub struct WordStream {
    words: Vec<String>,
    line_lengths: Vec<usize>,
}

impl WordStream {
    /// Flatten structured lines (line order, then word order)
    pub fn from_lines(lines: &[Line]) -> Result<Self> {
        let mut words = Vec::new();
        let mut line_lengths = Vec::with_capacity(lines.len());

        for line in lines {
            for word in &line.words {
                let position = words.len();
                let text = checked_word(&word.text, position)?;
                if word.index != position {
                    warn!(
                        submitted_index = word.index,
                        position, "Word index disagrees with flattened position; using submission order"
                    );
                }
                words.push(text);
            }
            if !line.words.is_empty() {
                line_lengths.push(line.words.len());
            }
        }

        Self::non_empty(words, line_lengths)
    }

    /// Parse structured lines from their JSON form, then flatten
    pub fn from_lines_json(json: &str) -> Result<Self> {
        let lines: Vec<Line> = serde_json::from_str(json)?;
        Self::from_lines(&lines)
    }

    /// Split free text into lines on `\n` and words on whitespace
    ///
    /// Blank lines are dropped.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut words = Vec::new();
        let mut line_lengths = Vec::new();

        for line in text.lines() {
            let before = words.len();
            words.extend(line.split_whitespace().map(str::to_string));
            let count = words.len() - before;
            if count > 0 {
                line_lengths.push(count);
            }
        }

        Self::non_empty(words, line_lengths)
    }

    fn non_empty(words: Vec<String>, line_lengths: Vec<usize>) -> Result<Self> {
        if words.is_empty() {
            return Err(Error::InvalidInput("lyrics contain no words".to_string()));
        }
        Ok(Self {
            words,
            line_lengths,
        })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn line_lengths(&self) -> &[usize] {
        &self.line_lengths
    }

    /// Newline-per-word transcript
    pub fn to_word_transcript(&self) -> String {
        self.words.join("\n")
    }

    /// Newline-per-line transcript, words joined by a single space
    pub fn to_line_transcript(&self) -> String {
        let mut out = Vec::with_capacity(self.line_lengths.len());
        let mut cursor = 0;
        for &len in &self.line_lengths {
            out.push(self.words[cursor..cursor + len].join(" "));
            cursor += len;
        }
        out.join("\n")
    }

    /// Build the line segmentation from one sync point per word
    pub fn resolve(&self, sync_points: &[SyncPoint]) -> Result<ResolvedAlignment> {
        if sync_points.len() != self.words.len() {
            return Err(Error::InvalidInput(format!(
                "expected {} sync points, got {}",
                self.words.len(),
                sync_points.len()
            )));
        }

        let mut lines = Vec::with_capacity(self.line_lengths.len());
        let mut first = 0;
        for &len in &self.line_lengths {
            let last = first + len - 1;
            lines.push(ResolvedLine {
                words: self.words[first..=last].to_vec(),
                start: sync_points[first].start,
                end: sync_points[last].end,
                first_word_index: first,
            });
            first += len;
        }

        Ok(ResolvedAlignment { lines })
    }
}

fn checked_word(text: &str, position: usize) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("word {} is empty", position)));
    }
    // The aligner splits on any whitespace, so one word must stay one token
    if trimmed.contains(char::is_whitespace) {
        return Err(Error::InvalidInput(format!(
            "word {} contains whitespace",
            position
        )));
    }
    Ok(trimmed.to_string())
}

impl ResolvedAlignment {
    /// Check that every line's word range is covered by `sync_points`
    pub fn validate_against(&self, sync_points: &[SyncPoint]) -> Result<()> {
        if self.lines.is_empty() {
            return Err(Error::InvalidInput("alignment has no lines".to_string()));
        }
        for (i, line) in self.lines.iter().enumerate() {
            let needed = line.first_word_index + line.words.len();
            if needed > sync_points.len() {
                return Err(Error::InvalidInput(format!(
                    "line {} needs sync points up to {}, only {} supplied",
                    i,
                    needed,
                    sync_points.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(words: &[&str], first_index: usize) -> Line {
        Line {
            words: words
                .iter()
                .enumerate()
                .map(|(i, w)| Word {
                    text: w.to_string(),
                    index: first_index + i,
                })
                .collect(),
        }
    }

    fn sp(start: f64, end: f64) -> SyncPoint {
        SyncPoint { start, end }
    }

    #[test]
    fn test_flatten_preserves_submission_order() {
        let lines = vec![line(&["a", "b"], 0), line(&["c"], 2)];
        let stream = WordStream::from_lines(&lines).unwrap();

        assert_eq!(stream.words(), &["a", "b", "c"]);
        assert_eq!(stream.line_lengths(), &[2, 1]);
        assert_eq!(stream.to_word_transcript(), "a\nb\nc");
    }

    #[test]
    fn test_flatten_from_json() {
        let json = r#"[{"words":[{"text":"hello","index":0},{"text":"world","index":1}]}]"#;
        let stream = WordStream::from_lines_json(json).unwrap();
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn test_flatten_rejects_blank_and_multiline_words() {
        assert!(WordStream::from_lines(&[line(&["ok", "  "], 0)]).is_err());
        assert!(WordStream::from_lines(&[line(&["two\nlines"], 0)]).is_err());
    }

    #[test]
    fn test_flatten_rejects_words_with_inner_whitespace() {
        let err = WordStream::from_lines(&[line(&["hello world"], 0)]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(WordStream::from_lines(&[line(&["tab\tbed"], 0)]).is_err());
        // Surrounding whitespace is trimmed, not rejected
        let stream = WordStream::from_lines(&[line(&["  padded "], 0)]).unwrap();
        assert_eq!(stream.words(), &["padded".to_string()]);
    }

    #[test]
    fn test_flatten_rejects_empty_lyrics() {
        assert!(WordStream::from_lines(&[]).is_err());
        assert!(WordStream::from_lines(&[Line { words: vec![] }]).is_err());
        assert!(WordStream::from_text("\n  \n").is_err());
    }

    #[test]
    fn test_free_text_split() {
        let stream = WordStream::from_text("hey jude\n\n  don't make it  bad\n").unwrap();
        assert_eq!(stream.len(), 6);
        assert_eq!(stream.line_lengths(), &[2, 4]);
        assert_eq!(stream.to_line_transcript(), "hey jude\ndon't make it bad");
    }

    #[test]
    fn test_resolve_lines() {
        let stream = WordStream::from_text("a b\nc").unwrap();
        let resolved = stream
            .resolve(&[sp(0.0, 0.5), sp(0.6, 1.0), sp(1.2, 2.0)])
            .unwrap();

        assert_eq!(resolved.lines.len(), 2);
        assert_eq!(resolved.lines[0].words, vec!["a", "b"]);
        assert_eq!(resolved.lines[0].start, 0.0);
        assert_eq!(resolved.lines[0].end, 1.0);
        assert_eq!(resolved.lines[1].first_word_index, 2);
        assert_eq!(resolved.lines[1].start, 1.2);
    }

    #[test]
    fn test_resolve_requires_matching_count() {
        let stream = WordStream::from_text("a b c").unwrap();
        assert!(stream.resolve(&[sp(0.0, 1.0)]).is_err());
    }

    #[test]
    fn test_validate_window() {
        assert!(validate_window(0.0, 0.0, 0).is_ok());
        assert!(validate_window(1.0, 0.5, 0).is_err());
        assert!(validate_window(-0.1, 0.5, 0).is_err());
        assert!(validate_window(f64::NAN, 0.5, 0).is_err());
    }

    #[test]
    fn test_alignment_must_fit_sync_points() {
        let alignment = ResolvedAlignment {
            lines: vec![ResolvedLine {
                words: vec!["a".into(), "b".into()],
                start: 0.0,
                end: 1.0,
                first_word_index: 1,
            }],
        };
        assert!(alignment.validate_against(&[sp(0.0, 0.1), sp(0.1, 0.2)]).is_err());
        assert!(alignment
            .validate_against(&[sp(0.0, 0.1), sp(0.1, 0.2), sp(0.2, 0.3)])
            .is_ok());
    }

    #[test]
    fn test_resolved_alignment_wire_format() {
        let json = r#"{"lines":[{"words":["a"],"start":0.0,"end":1.0,"firstWordIndex":0}]}"#;
        let parsed: ResolvedAlignment = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.lines[0].first_word_index, 0);
    }

    #[test]
    fn test_alignment_result_is_tagged() {
        let result = AlignmentResult::WordTimings {
            timings: vec![Timing {
                start: 0.0,
                end: 1.0,
                confidence: None,
            }],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["kind"], "wordTimings");
        // No score reported, no field emitted
        assert!(value["timings"][0].get("confidence").is_none());
        assert_eq!(result.word_count(), 1);
    }
}
