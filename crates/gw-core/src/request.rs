//! Unified request model (spec §3).
//!
//! A `Request` is immutable once accepted by the orchestrator; pre-hooks
//! return a *replacement* request rather than mutating one in place.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// One (provider, model) pair, used both for the primary target and for
/// entries in a fallback list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderModel {
    pub provider: String,
    pub model: String,
}

impl ProviderModel {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parse the unified `"provider/model"` convention (spec §6).
    pub fn parse(spec: &str) -> Option<Self> {
        let (provider, model) = spec.split_once('/')?;
        Some(Self::new(provider, model))
    }
}

impl std::fmt::Display for ProviderModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Tool-choice directive, mirrored across chat/responses variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Named(String),
}

/// A tool schema attached to a request, either supplied by the caller or
/// injected by the MCP mediator (spec C7).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Generation parameters common to chat/text-completion/responses requests.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// The type-specific payload of a request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestPayload {
    Chat { messages: Vec<Message> },
    TextCompletion { prompt: String },
    Embedding { input: Vec<String> },
    Speech { input: String, voice: Option<String> },
    Transcription { audio_base64: String, format: Option<String> },
    Responses { messages: Vec<Message> },
}

impl RequestPayload {
    pub fn is_chat_like(&self) -> bool {
        matches!(self, RequestPayload::Chat { .. } | RequestPayload::Responses { .. })
    }

    pub fn messages(&self) -> Option<&[Message]> {
        match self {
            RequestPayload::Chat { messages } | RequestPayload::Responses { messages } => {
                Some(messages)
            }
            _ => None,
        }
    }

    pub fn messages_mut(&mut self) -> Option<&mut Vec<Message>> {
        match self {
            RequestPayload::Chat { messages } | RequestPayload::Responses { messages } => {
                Some(messages)
            }
            _ => None,
        }
    }
}

/// Attributes common to every request variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestCommon {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub params: GenerationParams,
    #[serde(default)]
    pub fallbacks: Vec<ProviderModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_key: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

/// A fully-formed gateway request: common attributes plus a type-specific
/// payload. Immutable once accepted by the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub common: RequestCommon,
    pub payload: RequestPayload,
}

impl Request {
    pub fn chat(provider: impl Into<String>, model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            common: RequestCommon {
                provider: provider.into(),
                model: model.into(),
                params: GenerationParams::default(),
                fallbacks: Vec::new(),
                tool_choice: None,
                tools: Vec::new(),
                user_id: None,
                virtual_key: None,
                stream: false,
            },
            payload: RequestPayload::Chat { messages },
        }
    }

    pub fn primary(&self) -> ProviderModel {
        ProviderModel::new(self.common.provider.clone(), self.common.model.clone())
    }

    /// Return a replacement request with the given payload, leaving
    /// `common` intact. Used by pre-hooks that rewrite message content.
    pub fn with_payload(&self, payload: RequestPayload) -> Self {
        Self {
            common: self.common.clone(),
            payload,
        }
    }

    /// Return a replacement request targeting the next (provider, model) in
    /// the fallback chain, used by the fallback controller (spec §4.6).
    pub fn retarget(&self, target: &ProviderModel) -> Self {
        let mut common = self.common.clone();
        common.provider = target.provider.clone();
        common.model = target.model.clone();
        Self {
            common,
            payload: self.payload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_model_parses_unified_convention() {
        let pm = ProviderModel::parse("openai/gpt-4o-mini").unwrap();
        assert_eq!(pm.provider, "openai");
        assert_eq!(pm.model, "gpt-4o-mini");
    }

    #[test]
    fn provider_model_parse_rejects_bare_model() {
        assert!(ProviderModel::parse("gpt-4o-mini").is_none());
    }

    #[test]
    fn retarget_preserves_payload() {
        let req = Request::chat("openai", "gpt-4o-mini", vec![Message::user("hi")]);
        let alt = ProviderModel::new("anthropic", "claude-3-5-sonnet-20240620");
        let retargeted = req.retarget(&alt);
        assert_eq!(retargeted.common.provider, "anthropic");
        assert_eq!(retargeted.payload.messages().unwrap().len(), 1);
    }
}
