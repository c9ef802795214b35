//! `ChunkEvent`: the unit of streamed provider output (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::ToolCall;

/// The kind of a streamed chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Delta,
    Final,
    Error,
}

/// A fragment of tool-call arguments, keyed by tool-call id, to be
/// concatenated by the stream accumulator (spec §4.5, testable property 5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub id: String,
    pub name: Option<String>,
    pub arguments_fragment: String,
}

/// One event in a provider's output stream.
///
/// `(request_id, chunk_index, kind, payload, monotonic timestamp)` as
/// specified. The final chunk for a request carries `stream_end = true`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkEvent {
    pub request_id: String,
    pub chunk_index: u32,
    pub kind: ChunkKind,
    /// Text delta, present on `Delta` and sometimes `Final`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_fragments: Vec<ToolCallFragment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<crate::response::TokenUsage>,
    pub stream_end: bool,
    /// Monotonic timestamp in milliseconds since the accumulator was
    /// created for this request, for TTFT/ordering diagnostics.
    pub monotonic_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl ChunkEvent {
    pub fn delta(request_id: impl Into<String>, chunk_index: u32, text: impl Into<String>, monotonic_ms: u64) -> Self {
        Self {
            request_id: request_id.into(),
            chunk_index,
            kind: ChunkKind::Delta,
            delta: Some(text.into()),
            tool_call_fragments: Vec::new(),
            tool_calls: Vec::new(),
            error_message: None,
            usage: None,
            stream_end: false,
            monotonic_ms,
            raw: None,
        }
    }

    pub fn final_chunk(request_id: impl Into<String>, chunk_index: u32, monotonic_ms: u64) -> Self {
        Self {
            request_id: request_id.into(),
            chunk_index,
            kind: ChunkKind::Final,
            delta: None,
            tool_call_fragments: Vec::new(),
            tool_calls: Vec::new(),
            error_message: None,
            usage: None,
            stream_end: true,
            monotonic_ms,
            raw: None,
        }
    }

    pub fn error_chunk(request_id: impl Into<String>, chunk_index: u32, message: impl Into<String>, monotonic_ms: u64) -> Self {
        Self {
            request_id: request_id.into(),
            chunk_index,
            kind: ChunkKind::Error,
            delta: None,
            tool_call_fragments: Vec::new(),
            tool_calls: Vec::new(),
            error_message: Some(message.into()),
            usage: None,
            stream_end: true,
            monotonic_ms,
            raw: None,
        }
    }
}
