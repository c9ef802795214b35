//! Unified response model (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// Token usage statistics, mirrored across every provider adapter.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Latency fields. For streaming responses, `time_to_first_token_ms` and
/// `chunk_index` are populated; for non-streaming, only `total_ms`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct LatencyInfo {
    pub total_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_token_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
}

/// Cache lookup debug info, surfaced when `x-bf-cache-key` was supplied.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CacheDebug {
    pub hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Type-specific response payload, mirroring [`crate::request::RequestPayload`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Chat { message: Message },
    TextCompletion { text: String },
    Embedding { vectors: Vec<Vec<f32>> },
    Speech { audio_base64: String },
    Transcription { text: String },
    Responses { message: Message },
}

impl ResponsePayload {
    pub fn message(&self) -> Option<&Message> {
        match self {
            ResponsePayload::Chat { message } | ResponsePayload::Responses { message } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// Attributes common to every response variant (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseCommon {
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
    pub latency: LatencyInfo,
    #[serde(default)]
    pub cache: CacheDebug,
    /// Raw upstream bytes, present only when the provider config enables
    /// raw-response retention (spec §9: off by default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(default)]
    pub fallback_index: u32,
    #[serde(default)]
    pub number_of_retries: u32,
}

/// A fully-formed gateway response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    pub common: ResponseCommon,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn chat(provider: impl Into<String>, model: impl Into<String>, message: Message) -> Self {
        Self {
            common: ResponseCommon {
                provider: provider.into(),
                model: model.into(),
                usage: TokenUsage::default(),
                latency: LatencyInfo::default(),
                cache: CacheDebug::default(),
                raw: None,
                fallback_index: 0,
                number_of_retries: 0,
            },
            payload: ResponsePayload::Chat { message },
        }
    }
}
