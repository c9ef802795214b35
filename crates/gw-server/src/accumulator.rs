//! Stream Accumulator (C5, spec §4.5): reassembles a provider's chunked
//! output into a single coherent [`Response`] for PostHooks and logging,
//! while the caller keeps consuming deltas in real time.
//!
//! Exactly one task — the orchestrator task handling a given request — owns
//! an accumulator instance and calls [`StreamAccumulator::apply`]. Other
//! components (e.g. a plugin that wants to expose mid-stream content) only
//! ever see a read-only snapshot via [`AccumulatorRegistry::snapshot`].

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use gw_core::chunk::{ChunkEvent, ChunkKind};
use gw_core::message::{Message, ToolCall};
use gw_core::response::{CacheDebug, LatencyInfo, ResponseCommon, TokenUsage};
use gw_core::{Response, ResponsePayload};

/// Incrementally-assembled tool call, keyed by tool-call id (spec §4.5,
/// testable property 5).
#[derive(Clone, Debug, Default)]
struct ToolCallBuilder {
    name: Option<String>,
    arguments: String,
}

/// Terminal status of an accumulator, set exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumStatus {
    Pending,
    Success,
    Error,
}

/// Per-request accumulator state (spec §3 "StreamAccumulator").
pub struct StreamAccumulator {
    request_id: String,
    provider: String,
    model: String,
    start: Instant,
    ttft: Option<Instant>,
    content: String,
    /// Insertion order preserved so tool calls surface in the order their
    /// first fragment arrived.
    tool_call_order: Vec<String>,
    tool_calls: HashMap<String, ToolCallBuilder>,
    usage: TokenUsage,
    status: AccumStatus,
    error_message: Option<String>,
    last_chunk_index: u32,
    finalized: bool,
}

impl StreamAccumulator {
    /// Create an accumulator. Must happen before the first delta is
    /// processed (spec §3 invariant).
    pub fn new(request_id: impl Into<String>, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            provider: provider.into(),
            model: model.into(),
            start: Instant::now(),
            ttft: None,
            content: String::new(),
            tool_call_order: Vec::new(),
            tool_calls: HashMap::new(),
            usage: TokenUsage::default(),
            status: AccumStatus::Pending,
            error_message: None,
            last_chunk_index: 0,
            finalized: false,
        }
    }

    pub fn status(&self) -> AccumStatus {
        self.status
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Apply one incoming chunk. Out-of-order finalization is handled
    /// defensively: a terminal event after an error is a no-op, and
    /// duplicate finals are ignored (spec §4.5).
    pub fn apply(&mut self, chunk: &ChunkEvent) {
        if self.finalized {
            return;
        }
        self.last_chunk_index = self.last_chunk_index.max(chunk.chunk_index);

        match chunk.kind {
            ChunkKind::Delta => {
                if let Some(text) = &chunk.delta {
                    if !text.is_empty() && self.ttft.is_none() {
                        self.ttft = Some(Instant::now());
                    }
                    self.content.push_str(text);
                }
                for frag in &chunk.tool_call_fragments {
                    let entry = self.tool_calls.entry(frag.id.clone()).or_insert_with(|| {
                        self.tool_call_order.push(frag.id.clone());
                        ToolCallBuilder::default()
                    });
                    if entry.name.is_none() {
                        entry.name = frag.name.clone();
                    }
                    entry.arguments.push_str(&frag.arguments_fragment);
                }
                if let Some(usage) = chunk.usage {
                    self.usage = usage;
                }
            }
            ChunkKind::Final => {
                if let Some(text) = &chunk.delta {
                    if !text.is_empty() && self.ttft.is_none() {
                        self.ttft = Some(Instant::now());
                    }
                    self.content.push_str(text);
                }
                for call in &chunk.tool_calls {
                    self.tool_calls
                        .entry(call.id.clone())
                        .and_modify(|e| {
                            e.name = Some(call.name.clone());
                            e.arguments = call.arguments.clone();
                        })
                        .or_insert_with(|| {
                            self.tool_call_order.push(call.id.clone());
                            ToolCallBuilder {
                                name: Some(call.name.clone()),
                                arguments: call.arguments.clone(),
                            }
                        });
                }
                if let Some(usage) = chunk.usage {
                    self.usage = usage;
                }
                self.status = AccumStatus::Success;
                self.finalized = true;
            }
            ChunkKind::Error => {
                self.status = AccumStatus::Error;
                self.error_message = chunk.error_message.clone();
                self.finalized = true;
            }
        }
    }

    pub fn time_to_first_token_ms(&self) -> Option<u64> {
        self.ttft.map(|t| t.duration_since(self.start).as_millis() as u64)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// The assembled tool calls, in first-fragment arrival order.
    fn tool_calls_in_order(&self) -> Vec<ToolCall> {
        self.tool_call_order
            .iter()
            .filter_map(|id| {
                self.tool_calls.get(id).map(|b| ToolCall {
                    id: id.clone(),
                    name: b.name.clone().unwrap_or_default(),
                    arguments: b.arguments.clone(),
                })
            })
            .collect()
    }

    /// Build a unified [`Response`] reflecting "what actually happened" so
    /// far — the single source of truth passed to telemetry/logging
    /// plugins (spec §4.5). Safe to call before finalization for a
    /// mid-stream snapshot.
    pub fn snapshot(&self) -> Response {
        let message = Message::assistant(self.content.clone()).with_tool_calls(self.tool_calls_in_order());
        Response {
            common: ResponseCommon {
                provider: self.provider.clone(),
                model: self.model.clone(),
                usage: self.usage,
                latency: LatencyInfo {
                    total_ms: self.start.elapsed().as_millis() as u64,
                    time_to_first_token_ms: self.time_to_first_token_ms(),
                    chunk_index: Some(self.last_chunk_index),
                },
                cache: CacheDebug::default(),
                raw: None,
                fallback_index: 0,
                number_of_retries: 0,
            },
            payload: ResponsePayload::Chat { message },
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// A lookup of in-flight accumulator snapshots by request id, for
/// components that don't own the accumulator (spec §9: "other components
/// obtain snapshots via a lookup indexed by request id; they must not
/// mutate"). The orchestrator publishes a snapshot after every applied
/// chunk; readers only ever see an immutable `Response` clone.
#[derive(Default)]
pub struct AccumulatorRegistry {
    snapshots: RwLock<HashMap<String, Response>>,
}

impl AccumulatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, request_id: &str, response: Response) {
        self.snapshots.write().unwrap().insert(request_id.to_string(), response);
    }

    pub fn snapshot(&self, request_id: &str) -> Option<Response> {
        self.snapshots.read().unwrap().get(request_id).cloned()
    }

    /// Torn down exactly once after the final chunk or terminal error
    /// (spec §3 invariant).
    pub fn remove(&self, request_id: &str) {
        self.snapshots.write().unwrap().remove(request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_core::chunk::ToolCallFragment;

    #[test]
    fn delta_concatenation_matches_final_content() {
        let mut acc = StreamAccumulator::new("req1", "openai", "gpt-4o-mini");
        for (i, piece) in ["Hel", "lo ", "wor", "ld"].iter().enumerate() {
            acc.apply(&ChunkEvent::delta("req1", i as u32, *piece, i as u64 * 10));
        }
        acc.apply(&ChunkEvent::final_chunk("req1", 4, 50));
        let response = acc.snapshot();
        assert_eq!(response.payload.message().unwrap().content, "Hello world");
        assert_eq!(acc.status(), AccumStatus::Success);
    }

    #[test]
    fn tool_call_fragments_concatenate_in_arrival_order() {
        let mut acc = StreamAccumulator::new("req1", "openai", "gpt-4o-mini");
        let mut c0 = ChunkEvent::delta("req1", 0, "", 0);
        c0.tool_call_fragments.push(ToolCallFragment {
            id: "call_1".into(),
            name: Some("get_weather".into()),
            arguments_fragment: "{\"city\":".into(),
        });
        acc.apply(&c0);

        let mut c1 = ChunkEvent::delta("req1", 1, "", 10);
        c1.tool_call_fragments.push(ToolCallFragment {
            id: "call_1".into(),
            name: None,
            arguments_fragment: "\"nyc\"}".into(),
        });
        acc.apply(&c1);
        acc.apply(&ChunkEvent::final_chunk("req1", 2, 20));

        let response = acc.snapshot();
        let message = response.payload.message().unwrap();
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].arguments, "{\"city\":\"nyc\"}");
        assert_eq!(message.tool_calls[0].name, "get_weather");
    }

    #[test]
    fn duplicate_final_after_error_is_a_no_op() {
        let mut acc = StreamAccumulator::new("req1", "openai", "gpt-4o-mini");
        acc.apply(&ChunkEvent::error_chunk("req1", 0, "boom", 0));
        assert_eq!(acc.status(), AccumStatus::Error);
        acc.apply(&ChunkEvent::final_chunk("req1", 1, 10));
        assert_eq!(acc.status(), AccumStatus::Error, "terminal event after error must be a no-op");
    }

    #[test]
    fn duplicate_finals_are_ignored() {
        let mut acc = StreamAccumulator::new("req1", "openai", "gpt-4o-mini");
        acc.apply(&ChunkEvent::delta("req1", 0, "hi", 0));
        acc.apply(&ChunkEvent::final_chunk("req1", 1, 10));
        acc.apply(&ChunkEvent::final_chunk("req1", 2, 20));
        assert_eq!(acc.snapshot().payload.message().unwrap().content, "hi");
    }

    #[test]
    fn registry_publish_and_remove_round_trip() {
        let registry = AccumulatorRegistry::new();
        let acc = StreamAccumulator::new("req1", "openai", "gpt-4o-mini");
        registry.publish("req1", acc.snapshot());
        assert!(registry.snapshot("req1").is_some());
        registry.remove("req1");
        assert!(registry.snapshot("req1").is_none());
    }
}
