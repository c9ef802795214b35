//! OpenAI-shaped JSON at the HTTP boundary (spec §6): parses incoming
//! request bodies into the unified [`Request`]/[`Response`] model and
//! serializes outgoing responses and stream chunks back into it.
//!
//! This is distinct from [`gw_providers::adapter::ProviderAdapter`], which
//! translates the unified model to each *upstream* vendor's shape; this
//! module only ever talks to the gateway's own clients, mirroring the
//! conventions `gw_providers::openai`'s `encode_messages`/`decode_message`
//! establish for the upstream side.

use gw_core::chunk::ChunkKind;
use gw_core::message::{Role, ToolCall};
use gw_core::request::{GenerationParams, ProviderModel, ToolChoice, ToolSchema};
use gw_core::{ChunkEvent, GatewayError, Message, Request, RequestPayload, Response, ResponsePayload};
use serde::Deserialize;
use serde_json::{json, Value};

/// Body of `POST /v1/chat/completions` (and the `/openai`, `/anthropic`,
/// `/genai` drop-in prefixes, which accept the same unified shape).
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    /// `"provider/model"`, per the unified convention (spec §6).
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub tools: Vec<WireTool>,
    #[serde(default)]
    pub tool_choice: Option<WireToolChoice>,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    pub function: WireToolCallFunction,
}

#[derive(Debug, Deserialize)]
pub struct WireToolCallFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct WireTool {
    pub function: WireToolFunction,
}

#[derive(Debug, Deserialize)]
pub struct WireToolFunction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_parameters")]
    pub parameters: Value,
}

fn default_parameters() -> Value {
    json!({"type": "object", "properties": {}})
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireToolChoice {
    Mode(String),
    Named { function: WireNamedChoice },
}

#[derive(Debug, Deserialize)]
pub struct WireNamedChoice {
    pub name: String,
}

fn role_from_wire(role: &str) -> Role {
    match role {
        "system" => Role::System,
        "user" => Role::User,
        "tool" => Role::Tool,
        _ => Role::Assistant,
    }
}

fn message_from_wire(m: WireMessage) -> Message {
    Message {
        role: role_from_wire(&m.role),
        content: m.content,
        name: m.name,
        tool_call_id: m.tool_call_id,
        tool_calls: m
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect(),
    }
}

/// Parse a `POST /v1/chat/completions` body into a unified chat [`Request`].
pub fn chat_request_from_wire(body: ChatCompletionRequest, virtual_key: Option<String>) -> Result<Request, GatewayError> {
    let target = ProviderModel::parse(&body.model)
        .ok_or_else(|| GatewayError::validation(format!("model must be \"provider/model\", got {:?}", body.model)))?;

    let fallbacks = body
        .fallbacks
        .iter()
        .map(|f| ProviderModel::parse(f).ok_or_else(|| GatewayError::validation(format!("invalid fallback target: {f}"))))
        .collect::<Result<Vec<_>, _>>()?;

    let tools = body
        .tools
        .into_iter()
        .map(|t| ToolSchema {
            name: t.function.name,
            description: t.function.description,
            parameters: t.function.parameters,
        })
        .collect();

    let tool_choice = body.tool_choice.map(|c| match c {
        WireToolChoice::Mode(s) if s == "none" => ToolChoice::None,
        WireToolChoice::Mode(s) if s == "required" => ToolChoice::Required,
        WireToolChoice::Mode(_) => ToolChoice::Auto,
        WireToolChoice::Named { function } => ToolChoice::Named(function.name),
    });

    let messages = body.messages.into_iter().map(message_from_wire).collect();

    Ok(Request {
        common: gw_core::request::RequestCommon {
            provider: target.provider,
            model: target.model,
            params: GenerationParams {
                temperature: body.temperature,
                max_tokens: body.max_tokens,
                top_p: body.top_p,
                stop: body.stop,
            },
            fallbacks,
            tool_choice,
            tools,
            user_id: body.user,
            virtual_key,
            stream: body.stream,
        },
        payload: RequestPayload::Chat { messages },
    })
}

fn message_to_wire(m: &Message) -> Value {
    let mut obj = json!({
        "role": m.role.to_string(),
        "content": m.content,
    });
    if !m.tool_calls.is_empty() {
        obj["tool_calls"] = json!(m
            .tool_calls
            .iter()
            .map(|tc| json!({
                "id": tc.id,
                "type": "function",
                "function": {"name": tc.name, "arguments": tc.arguments},
            }))
            .collect::<Vec<_>>());
    }
    obj
}

fn finish_reason(message: &Message) -> &'static str {
    if message.tool_calls.is_empty() {
        "stop"
    } else {
        "tool_calls"
    }
}

/// Serialize a completed chat [`Response`] into an OpenAI-shaped
/// `chat.completion` object.
pub fn chat_response_to_wire(request_id: &str, response: &Response) -> Value {
    let message = response.payload.message();
    json!({
        "id": request_id,
        "object": "chat.completion",
        "created": 0,
        "model": format!("{}/{}", response.common.provider, response.common.model),
        "choices": [{
            "index": 0,
            "message": message.map(message_to_wire).unwrap_or_else(|| json!({"role": "assistant", "content": ""})),
            "finish_reason": message.map(finish_reason).unwrap_or("stop"),
        }],
        "usage": {
            "prompt_tokens": response.common.usage.prompt_tokens,
            "completion_tokens": response.common.usage.completion_tokens,
            "total_tokens": response.common.usage.total_tokens,
        },
        "gateway": {
            "fallback_index": response.common.fallback_index,
            "number_of_retries": response.common.number_of_retries,
            "cache_hit": response.common.cache.hit,
        },
    })
}

/// Serialize one [`ChunkEvent`] into an OpenAI-shaped
/// `chat.completion.chunk` object, the unit framed by [`crate::sse`] as
/// `data: <json>\n\n`.
pub fn chunk_to_wire(request_id: &str, model: &str, chunk: &ChunkEvent) -> Value {
    match chunk.kind {
        ChunkKind::Delta => {
            let mut delta = json!({});
            if let Some(text) = &chunk.delta {
                delta["content"] = json!(text);
            }
            if !chunk.tool_call_fragments.is_empty() {
                delta["tool_calls"] = json!(chunk
                    .tool_call_fragments
                    .iter()
                    .map(|f| json!({
                        "id": f.id,
                        "type": "function",
                        "function": {"name": f.name, "arguments": f.arguments_fragment},
                    }))
                    .collect::<Vec<_>>());
            }
            json!({
                "id": request_id,
                "object": "chat.completion.chunk",
                "created": 0,
                "model": model,
                "choices": [{"index": 0, "delta": delta, "finish_reason": Value::Null}],
            })
        }
        ChunkKind::Final => json!({
            "id": request_id,
            "object": "chat.completion.chunk",
            "created": 0,
            "model": model,
            "choices": [{"index": 0, "delta": {}, "finish_reason": if chunk.tool_calls.is_empty() { "stop" } else { "tool_calls" }}],
            "usage": chunk.usage.map(|u| json!({
                "prompt_tokens": u.prompt_tokens,
                "completion_tokens": u.completion_tokens,
                "total_tokens": u.total_tokens,
            })),
        }),
        ChunkKind::Error => json!({
            "id": request_id,
            "object": "chat.completion.chunk",
            "created": 0,
            "model": model,
            "error": chunk.error_message,
        }),
    }
}

/// Body of `POST /v1/text/completions`.
#[derive(Debug, Deserialize)]
pub struct TextCompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

pub fn text_request_from_wire(body: TextCompletionRequest, virtual_key: Option<String>) -> Result<Request, GatewayError> {
    let target = ProviderModel::parse(&body.model)
        .ok_or_else(|| GatewayError::validation(format!("model must be \"provider/model\", got {:?}", body.model)))?;
    Ok(Request {
        common: gw_core::request::RequestCommon {
            provider: target.provider,
            model: target.model,
            params: GenerationParams {
                temperature: body.temperature,
                max_tokens: body.max_tokens,
                top_p: None,
                stop: Vec::new(),
            },
            fallbacks: Vec::new(),
            tool_choice: None,
            tools: Vec::new(),
            user_id: None,
            virtual_key,
            stream: false,
        },
        payload: RequestPayload::TextCompletion { prompt: body.prompt },
    })
}

pub fn text_response_to_wire(request_id: &str, response: &Response) -> Value {
    let text = match &response.payload {
        ResponsePayload::TextCompletion { text } => text.as_str(),
        _ => "",
    };
    json!({
        "id": request_id,
        "object": "text_completion",
        "created": 0,
        "model": format!("{}/{}", response.common.provider, response.common.model),
        "choices": [{"index": 0, "text": text, "finish_reason": "stop"}],
        "usage": {
            "prompt_tokens": response.common.usage.prompt_tokens,
            "completion_tokens": response.common.usage.completion_tokens,
            "total_tokens": response.common.usage.total_tokens,
        },
    })
}

/// Body of `POST /v1/audio/speech`.
#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    pub model: String,
    pub input: String,
    #[serde(default)]
    pub voice: Option<String>,
}

pub fn speech_request_from_wire(body: SpeechRequest, virtual_key: Option<String>) -> Result<Request, GatewayError> {
    let target = ProviderModel::parse(&body.model)
        .ok_or_else(|| GatewayError::validation(format!("model must be \"provider/model\", got {:?}", body.model)))?;
    Ok(Request {
        common: gw_core::request::RequestCommon {
            provider: target.provider,
            model: target.model,
            params: GenerationParams::default(),
            fallbacks: Vec::new(),
            tool_choice: None,
            tools: Vec::new(),
            user_id: None,
            virtual_key,
            stream: false,
        },
        payload: RequestPayload::Speech { input: body.input, voice: body.voice },
    })
}

/// Multipart-assembled fields for `POST /v1/audio/transcriptions`.
pub struct TranscriptionFields {
    pub model: String,
    pub audio_base64: String,
    pub format: Option<String>,
}

pub fn transcription_request_from_wire(body: TranscriptionFields, virtual_key: Option<String>) -> Result<Request, GatewayError> {
    let target = ProviderModel::parse(&body.model)
        .ok_or_else(|| GatewayError::validation(format!("model must be \"provider/model\", got {:?}", body.model)))?;
    Ok(Request {
        common: gw_core::request::RequestCommon {
            provider: target.provider,
            model: target.model,
            params: GenerationParams::default(),
            fallbacks: Vec::new(),
            tool_choice: None,
            tools: Vec::new(),
            user_id: None,
            virtual_key,
            stream: false,
        },
        payload: RequestPayload::Transcription {
            audio_base64: body.audio_base64,
            format: body.format,
        },
    })
}

pub fn transcription_response_to_wire(response: &Response) -> Value {
    let text = match &response.payload {
        ResponsePayload::Transcription { text } => text.as_str(),
        _ => "",
    };
    json!({"text": text})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_parses_unified_model_field() {
        let body = ChatCompletionRequest {
            model: "openai/gpt-4o-mini".into(),
            messages: vec![WireMessage { role: "user".into(), content: "hi".into(), name: None, tool_call_id: None, tool_calls: vec![] }],
            stream: false,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: vec![],
            tools: vec![],
            tool_choice: None,
            fallbacks: vec![],
            user: None,
        };
        let request = chat_request_from_wire(body, None).unwrap();
        assert_eq!(request.common.provider, "openai");
        assert_eq!(request.common.model, "gpt-4o-mini");
        assert_eq!(request.payload.messages().unwrap().len(), 1);
    }

    #[test]
    fn chat_request_rejects_bare_model_name() {
        let body = ChatCompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![],
            stream: false,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: vec![],
            tools: vec![],
            tool_choice: None,
            fallbacks: vec![],
            user: None,
        };
        assert!(chat_request_from_wire(body, None).is_err());
    }

    #[test]
    fn chunk_to_wire_carries_delta_text() {
        let chunk = ChunkEvent::delta("req1", 0, "hello", 10);
        let value = chunk_to_wire("req1", "openai/gpt-4o-mini", &chunk);
        assert_eq!(value["choices"][0]["delta"]["content"], "hello");
    }
}
