use serde::Deserialize;

use crate::error::GeminiApiError;
use crate::events::{FinishReason, GeminiStreamEvent, UsageMetadata};

/// Incremental parser for SSE text streams.
///
/// Bytes are buffered raw and only complete frames are decoded, so a
/// multi-byte character split across network reads survives intact.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    ///
    /// A frame that is not UTF-8, or whose data is not a JSON chunk, fails
    /// the whole feed with [`GeminiApiError::MalformedChunk`].
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<GeminiStreamEvent>, GeminiApiError> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some((split, separator_len)) = next_frame_boundary(&self.buffer) {
            let raw: Vec<u8> = self
                .buffer
                .drain(..split + separator_len)
                .take(split)
                .collect();
            let frame = String::from_utf8(raw).map_err(|error| {
                GeminiApiError::MalformedChunk(format!("frame is not valid UTF-8: {error}"))
            })?;

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };
            if payload == "[DONE]" {
                continue;
            }

            let chunk = serde_json::from_str::<StreamChunk>(&payload)
                .map_err(|error| GeminiApiError::MalformedChunk(format!("{error}: {payload}")))?;
            map_chunk(chunk, &mut events);
        }

        Ok(events)
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Result<Vec<GeminiStreamEvent>, GeminiApiError> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn next_frame_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find(buffer, b"\n\n").map(|index| (index, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|index| (index, 4));
    match (lf, crlf) {
        (Some(lf), Some(crlf)) => Some(if crlf.0 < lf.0 { crlf } else { lf }),
        (found, None) | (None, found) => found,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<RawUsage>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<RawError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawError {
    code: Option<i64>,
    status: Option<String>,
    message: Option<String>,
}

fn map_chunk(chunk: StreamChunk, events: &mut Vec<GeminiStreamEvent>) {
    if let Some(error) = chunk.error {
        events.push(GeminiStreamEvent::Error {
            code: error.code,
            status: error.status,
            message: error.message,
        });
        return;
    }

    if let Some(reason) = chunk
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
        .filter(|reason| !reason.trim().is_empty())
    {
        events.push(GeminiStreamEvent::PromptBlocked { reason });
        return;
    }

    // Only the first candidate is requested.
    let mut finish = None;
    if let Some(candidate) = chunk.candidates.into_iter().next() {
        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();
        if !text.is_empty() {
            events.push(GeminiStreamEvent::TextDelta { text });
        }
        finish = candidate
            .finish_reason
            .filter(|reason| !reason.trim().is_empty())
            .map(|reason| FinishReason::parse(&reason));
    }

    if let Some(usage) = chunk.usage_metadata {
        events.push(GeminiStreamEvent::Usage(UsageMetadata {
            prompt_token_count: usage.prompt_token_count,
            candidates_token_count: usage.candidates_token_count,
            total_token_count: usage.total_token_count,
        }));
    }

    if let Some(reason) = finish {
        events.push(GeminiStreamEvent::Finished { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::SseStreamParser;
    use crate::events::GeminiStreamEvent;

    #[test]
    fn parse_sse_frames_incrementally() {
        let mut parser = SseStreamParser::default();
        let mut events = Vec::new();

        events.extend(
            parser
                .feed(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel")
                .expect("partial frame should buffer"),
        );
        assert!(events.is_empty());

        events.extend(
            parser
                .feed(b"lo\"}]}}]}\n\n")
                .expect("completed frame should parse"),
        );
        assert_eq!(
            events,
            vec![GeminiStreamEvent::TextDelta {
                text: "Hello".to_string()
            }]
        );
        assert!(parser.is_empty_buffer());
    }
}
