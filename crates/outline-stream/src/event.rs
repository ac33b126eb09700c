//! Fragment extraction from server-sent-event data lines
//!
//! A qualifying line looks like `data: {"choices":[{"delta":{"content":"…"}}]}`.
//! Everything else (blank lines, comments, `event:` lines, the `[DONE]`
//! sentinel, malformed JSON) yields no fragment.

use crate::frame::FrameDecoder;
use serde::Deserialize;

/// Marker prefix of data-bearing lines
pub const DATA_PREFIX: &str = "data:";

/// Payload of the stream-termination line
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the incremental text fragment carried by one decoded line
///
/// Returns `None` when the line carries nothing usable. Parse failures are
/// absorbed: a provider may emit keep-alives or drift in formatting, and
/// none of that should interrupt the stream.
///
/// # Examples
/// ```
/// use outline_stream::extract_fragment;
///
/// let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
/// assert_eq!(extract_fragment(line).as_deref(), Some("Hel"));
/// assert_eq!(extract_fragment("data: [DONE]"), None);
/// assert_eq!(extract_fragment(": keep-alive"), None);
/// ```
#[must_use]
pub fn extract_fragment(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload == DONE_SENTINEL {
        return None;
    }

    let parsed: ChunkPayload = match serde_json::from_str(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::trace!(error = %e, "skipping unparseable data line");
            return None;
        }
    };

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty())
}

/// Byte chunks in, text fragments out
///
/// Composes [`FrameDecoder`] with [`extract_fragment`]; one instance per
/// open stream.
#[derive(Debug, Clone, Default)]
pub struct FragmentDecoder {
    frames: FrameDecoder,
}

impl FragmentDecoder {
    /// Create decoder for a fresh stream
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning the fragments of every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.frames
            .push(chunk)
            .filter_map(|line| extract_fragment(&line))
            .collect()
    }

    /// End the stream; an undelimited trailing line is dropped
    pub fn finish(self) -> usize {
        self.frames.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(content: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    #[test]
    fn extracts_content() {
        assert_eq!(extract_fragment(&data("abc")).as_deref(), Some("abc"));
    }

    #[test]
    fn tolerates_missing_space_after_marker() {
        let line = r#"data:{"choices":[{"delta":{"content":"x"}}]}"#;
        assert_eq!(extract_fragment(line).as_deref(), Some("x"));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let line = format!("   {}\r", data("y"));
        assert_eq!(extract_fragment(&line).as_deref(), Some("y"));
    }

    #[test]
    fn ignores_sentinel_and_non_data_lines() {
        assert_eq!(extract_fragment("data: [DONE]"), None);
        assert_eq!(extract_fragment("data:[DONE]"), None);
        assert_eq!(extract_fragment("event: message"), None);
        assert_eq!(extract_fragment(""), None);
        assert_eq!(extract_fragment("   "), None);
    }

    #[test]
    fn malformed_json_is_absorbed() {
        assert_eq!(extract_fragment(r#"data: {"choices":[{"delta":"#), None);
        assert_eq!(extract_fragment("data: not json"), None);
        assert_eq!(extract_fragment(r#"data: {"choices":"nope"}"#), None);
    }

    #[test]
    fn absent_or_empty_content_yields_nothing() {
        assert_eq!(extract_fragment(r#"data: {"choices":[]}"#), None);
        assert_eq!(extract_fragment(r#"data: {"choices":[{"delta":{}}]}"#), None);
        assert_eq!(
            extract_fragment(r#"data: {"choices":[{"delta":{"content":null}}]}"#),
            None
        );
        assert_eq!(extract_fragment(&data("")), None);
        assert_eq!(extract_fragment(r#"data: {"usage":{"total_tokens":3}}"#), None);
    }

    #[test]
    fn whitespace_fragment_is_kept() {
        assert_eq!(extract_fragment(&data("\n")).as_deref(), Some("\n"));
        assert_eq!(extract_fragment(&data(" ")).as_deref(), Some(" "));
    }

    #[test]
    fn fragment_decoder_spans_chunks() {
        let stream = format!("{}\n\n{}\ndata: [DONE]\n", data("A: B"), data(" | C\n"));
        let bytes = stream.as_bytes();
        let mut decoder = FragmentDecoder::new();
        let mut fragments = decoder.push(&bytes[..10]);
        fragments.extend(decoder.push(&bytes[10..]));
        assert_eq!(fragments, vec!["A: B".to_string(), " | C\n".to_string()]);
        assert_eq!(decoder.finish(), 0);
    }
}
