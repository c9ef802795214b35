//! Request Orchestrator (C9, spec §4.9): the top-level state machine gluing
//! the Plugin Pipeline (C4) to Governance (C8), the MCP Mediator (C7), the
//! Fallback Controller (C6) and, for streams, the Stream Accumulator (C5).
//!
//! ```text
//! received
//!   -> pre_hooks         (may short_circuit -> post_hooks_unwind -> done)
//!   -> governance_check  (may reject -> post_hooks_unwind -> done)
//!   -> mcp_inject        (may auto-execute tools and loop)
//!   -> worker_submit     (may queue_full -> fallback_select)
//!   -> upstream_call     (may stream)
//!   non_stream -> decode -> post_hooks_unwind -> done
//!   stream -> accumulate_loop -> final_chunk -> post_hooks_unwind -> done
//! on_error at any step -> classify -> fallback_select | post_hooks_unwind -> done
//! ```
//!
//! `worker_submit`'s `queue_full`/`no_suitable_key` fallback-select is
//! already embedded in [`crate::fallback`]'s per-target loop, so this
//! module only needs to drive one fallback run per MCP "turn".

use std::sync::Arc;

use gw_core::message::{Message, ToolCall};
use gw_core::request::RequestPayload;
use gw_core::{GatewayError, Request, RequestContext, Response, VirtualKey};
use gw_governance::{GovernanceGate, InMemoryGovernanceStore, UsageCommit};
use gw_mcp::mediator::ToolFilterOverrides;
use gw_mcp::McpMediator;
use gw_plugins::plugin::PreOutcome;
use gw_plugins::Pipeline;
use tokio::sync::{mpsc, RwLock as AsyncRwLock};

use crate::accumulator::{AccumulatorRegistry, StreamAccumulator};
use crate::cancellation::CancellationToken;
use crate::dispatch::Dispatcher;
use crate::fallback;

/// A guard against a pathological tool-call loop (no bound is given in the
/// spec; this keeps a plugin bug or a model that never stops calling tools
/// from running forever).
const MAX_TOOL_TURNS: u32 = 8;

pub struct Orchestrator {
    pub pipeline: Arc<Pipeline>,
    pub governance: Arc<GovernanceGate<InMemoryGovernanceStore>>,
    pub governance_store: Arc<InMemoryGovernanceStore>,
    /// MCP client state uses a reader/writer discipline (spec §5): request
    /// dispatch only ever takes a reader lease here, management-API
    /// mutation (registering/removing/reconnecting a client) takes the
    /// writer lease in [`crate::handlers::mcp`].
    pub mcp: Arc<AsyncRwLock<McpMediator>>,
    pub dispatcher: Arc<Dispatcher>,
    pub accumulators: Arc<AccumulatorRegistry>,
}

/// Outcome of a fully-run streaming request: the orchestrator has already
/// handed the caller a live receiver; this carries what's needed to drive
/// PostHooks once the stream concludes.
pub struct StreamHandle {
    pub chunks: mpsc::Receiver<gw_core::ChunkEvent>,
    pub cancellation: CancellationToken,
}

impl Orchestrator {
    fn estimate_tokens(request: &Request) -> u64 {
        let messages_estimate = request
            .payload
            .messages()
            .map(|m| m.iter().map(Message::estimate_tokens).sum::<u32>())
            .unwrap_or(0);
        let completion_estimate = request.common.params.max_tokens.unwrap_or(256);
        u64::from(messages_estimate) + u64::from(completion_estimate)
    }

    fn virtual_key(&self, request: &Request) -> Option<VirtualKey> {
        let id = request.common.virtual_key.as_deref()?;
        self.governance_store.with_key(id, Clone::clone)
    }

    fn virtual_key_scope(vk: &VirtualKey) -> Vec<String> {
        vk.allowed_targets.iter().map(|t| t.provider.clone()).collect()
    }

    /// Run PreHooks; on short-circuit or failure, also run the matching
    /// PostHook unwind and return the terminal result directly (spec §4.4
    /// rules 2-3).
    async fn run_pre(&self, ctx: &RequestContext, request: Request) -> Result<PreAccepted, OrchestratorDone> {
        let pre = self.pipeline.run_pre(ctx, request).await;
        match pre.outcome {
            PreOutcome::Continue(request) => Ok(PreAccepted { request, ran_count: pre.ran_count }),
            PreOutcome::ShortCircuit(response) => {
                let post = self.pipeline.run_post(ctx, pre.ran_count, Some(response), None).await;
                Err(OrchestratorDone(match post.error {
                    Some(e) => Err(e),
                    None => Ok(post.response.expect("short-circuit response survives post unwind")),
                }))
            }
            PreOutcome::Fail(error) => {
                let post = self.pipeline.run_post(ctx, pre.ran_count, None, Some(error)).await;
                Err(OrchestratorDone(Err(post.error.unwrap_or_else(|| GatewayError::internal("pre-hook failure lost in post unwind")))))
            }
        }
    }

    async fn run_post(&self, ctx: &RequestContext, ran_count: usize, response: Option<Response>, error: Option<GatewayError>) -> Result<Response, GatewayError> {
        let post = self.pipeline.run_post(ctx, ran_count, response, error).await;
        match (post.response, post.error) {
            (_, Some(e)) => Err(e),
            (Some(r), None) => Ok(r),
            (None, None) => Err(GatewayError::internal("post-hook unwind produced neither response nor error")),
        }
    }

    /// Full non-streaming request lifecycle (spec §4.9 `non_stream` path).
    /// `overrides` carries the request-scoped `mcp-include-tools` /
    /// `mcp-exclude-tools` / `mcp-include-clients` / `mcp-exclude-clients`
    /// headers (spec §4.7 / §6), resolved once at the HTTP boundary.
    pub async fn handle_non_stream(&self, ctx: RequestContext, request: Request, overrides: ToolFilterOverrides) -> Result<Response, GatewayError> {
        let accepted = match self.run_pre(&ctx, request).await {
            Ok(a) => a,
            Err(OrchestratorDone(result)) => return result,
        };
        let PreAccepted { request, ran_count } = accepted;

        if let Err(e) = self.governance.check(request.common.virtual_key.as_deref(), &request.primary(), Self::estimate_tokens(&request)) {
            return self.run_post(&ctx, ran_count, None, Some(e)).await;
        }

        let virtual_key = self.virtual_key(&request);
        let scope = virtual_key.as_ref().map(Self::virtual_key_scope);

        let mut turn_request = {
            let mcp = self.mcp.read().await;
            mcp.inject_tools(&request, virtual_key.as_ref(), &overrides).await
        };
        let cancellation = CancellationToken::new();

        for _ in 0..MAX_TOOL_TURNS {
            let run = fallback::run_non_stream(&self.dispatcher, ctx.request_id(), &turn_request, scope.as_deref(), cancellation.clone()).await;

            match run {
                Ok(outcome) => {
                    self.governance.commit(
                        request.common.virtual_key.as_deref(),
                        UsageCommit {
                            prompt_tokens: u64::from(outcome.response.common.usage.prompt_tokens),
                            completion_tokens: u64::from(outcome.response.common.usage.completion_tokens),
                            cost: None,
                        },
                    );

                    let Some(message) = outcome.response.payload.message().cloned() else {
                        return self.run_post(&ctx, ran_count, Some(outcome.response), None).await;
                    };

                    let mcp = self.mcp.read().await;
                    let auto_calls: Vec<ToolCall> = message.tool_calls.iter().filter(|c| mcp.is_auto_executable(c)).cloned().collect();
                    if auto_calls.is_empty() {
                        drop(mcp);
                        return self.run_post(&ctx, ran_count, Some(outcome.response), None).await;
                    }

                    let mut results = Vec::with_capacity(auto_calls.len());
                    for call in &auto_calls {
                        results.push(mcp.execute_tool_call(call).await);
                    }
                    drop(mcp);
                    let tool_messages = gw_mcp::mediator::to_tool_messages(&results);

                    let Some(messages) = turn_request.payload.messages() else {
                        return self.run_post(&ctx, ran_count, Some(outcome.response), None).await;
                    };
                    let mut next_messages = messages.to_vec();
                    next_messages.push(message);
                    next_messages.extend(tool_messages);
                    turn_request = with_messages(&turn_request, next_messages);
                }
                Err(e) => {
                    self.governance.commit(request.common.virtual_key.as_deref(), UsageCommit::default());
                    return self.run_post(&ctx, ran_count, None, Some(e)).await;
                }
            }
        }

        self.run_post(&ctx, ran_count, None, Some(GatewayError::internal("exceeded max tool-call turns"))).await
    }

    /// Streaming variant: runs pre-hooks/governance/MCP injection
    /// synchronously, then returns a live chunk receiver the HTTP layer
    /// forwards as SSE while this task keeps driving further tool-call
    /// turns and PostHooks in the background.
    ///
    /// PostHooks for a stream only run once the accumulator observes the
    /// final chunk (spec §3: accumulator "torn down exactly once after the
    /// final chunk or terminal error" and §4.9's `accumulate_loop ->
    /// final_chunk -> post_hooks_unwind`); the caller consumes the stream
    /// via `take_stream` to avoid blocking on that.
    pub async fn handle_stream(self: Arc<Self>, ctx: RequestContext, request: Request, overrides: ToolFilterOverrides) -> Result<StreamHandle, GatewayError> {
        let accepted = match self.run_pre(&ctx, request).await {
            Ok(a) => a,
            Err(OrchestratorDone(Ok(response))) => {
                let (tx, rx) = mpsc::channel(2);
                let content = response.payload.message().map(|m| m.content.clone()).unwrap_or_default();
                if !content.is_empty() {
                    let _ = tx.send(gw_core::ChunkEvent::delta(ctx.request_id(), 0, content, 0)).await;
                }
                let _ = tx.send(gw_core::ChunkEvent::final_chunk(ctx.request_id(), 1, 0)).await;
                return Ok(StreamHandle { chunks: rx, cancellation: CancellationToken::new() });
            }
            Err(OrchestratorDone(Err(e))) => return Err(e),
        };
        let PreAccepted { request, .. } = accepted;

        self.governance.check(request.common.virtual_key.as_deref(), &request.primary(), Self::estimate_tokens(&request))?;

        let virtual_key = self.virtual_key(&request);
        let scope = virtual_key.as_ref().map(Self::virtual_key_scope);
        let turn_request = {
            let mcp = self.mcp.read().await;
            mcp.inject_tools(&request, virtual_key.as_ref(), &overrides).await
        };

        let cancellation = CancellationToken::new();
        let outer_cancellation = cancellation.clone();

        let outcome = fallback::run_stream(&self.dispatcher, ctx.request_id(), &turn_request, scope.as_deref(), cancellation.clone()).await?;

        let (forward_tx, forward_rx) = mpsc::channel(64);
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator
                .drive_stream_turns(ctx, turn_request, outcome.chunks, outcome.target.provider, outcome.fallback_index, forward_tx, cancellation)
                .await;
        });

        Ok(StreamHandle { chunks: forward_rx, cancellation: outer_cancellation })
    }

    /// Consumes one turn's chunk stream into the accumulator while
    /// forwarding every chunk live to the caller. On the final chunk,
    /// either loops back for another MCP tool-call turn or runs PostHooks.
    #[allow(clippy::too_many_arguments)]
    async fn drive_stream_turns(
        &self,
        ctx: RequestContext,
        mut turn_request: Request,
        mut chunks: mpsc::Receiver<gw_core::ChunkEvent>,
        provider: String,
        mut fallback_index: u32,
        forward_tx: mpsc::Sender<gw_core::ChunkEvent>,
        cancellation: CancellationToken,
    ) {
        for _ in 0..MAX_TOOL_TURNS {
            let mut accumulator = StreamAccumulator::new(ctx.request_id(), provider.clone(), turn_request.common.model.clone());
            // The turn's own terminal chunk (Final/Error) is held back until
            // we know whether another MCP turn follows: forwarding it live
            // would tell the client the SSE response ended when really it's
            // only this intermediate tool-calling turn that finished.
            let mut terminal: Option<gw_core::ChunkEvent> = None;

            while let Some(event) = chunks.recv().await {
                accumulator.apply(&event);
                self.accumulators.publish(ctx.request_id(), accumulator.snapshot());
                if event.stream_end {
                    terminal = Some(event);
                    break;
                }
                let _ = forward_tx.send(event).await;
            }

            let mut response = accumulator.snapshot();
            response.common.fallback_index = fallback_index;

            self.governance.commit(
                turn_request.common.virtual_key.as_deref(),
                UsageCommit {
                    prompt_tokens: u64::from(response.common.usage.prompt_tokens),
                    completion_tokens: u64::from(response.common.usage.completion_tokens),
                    cost: None,
                },
            );

            let message = response.payload.message().cloned().unwrap_or_else(|| Message::assistant(""));
            let mcp = self.mcp.read().await;
            let auto_calls: Vec<ToolCall> = message.tool_calls.iter().filter(|c| mcp.is_auto_executable(c)).cloned().collect();

            if accumulator.status() != crate::accumulator::AccumStatus::Success || auto_calls.is_empty() {
                drop(mcp);
                if let Some(event) = terminal {
                    let _ = forward_tx.send(event).await;
                }
                self.finish_stream(&ctx, response, accumulator.error_message().map(str::to_string)).await;
                return;
            }

            let _ = terminal;
            let mut results = Vec::with_capacity(auto_calls.len());
            for call in &auto_calls {
                results.push(mcp.execute_tool_call(call).await);
            }
            drop(mcp);
            let tool_messages = gw_mcp::mediator::to_tool_messages(&results);

            let Some(messages) = turn_request.payload.messages() else {
                self.finish_stream(&ctx, response, None).await;
                return;
            };
            let mut next_messages = messages.to_vec();
            next_messages.push(message);
            next_messages.extend(tool_messages);
            turn_request = with_messages(&turn_request, next_messages);

            let scope = self.virtual_key(&turn_request).as_ref().map(Self::virtual_key_scope);
            match fallback::run_stream(&self.dispatcher, ctx.request_id(), &turn_request, scope.as_deref(), cancellation.clone()).await {
                Ok(next) => {
                    chunks = next.chunks;
                    fallback_index = next.fallback_index;
                }
                Err(e) => {
                    self.finish_stream_error(&ctx, e).await;
                    return;
                }
            }
        }

        self.finish_stream_error(&ctx, GatewayError::internal("exceeded max tool-call turns")).await;
    }

    async fn finish_stream(&self, ctx: &RequestContext, response: Response, error_message: Option<String>) {
        let ran_count = self.pipeline.len();
        let error = error_message.map(|m| GatewayError::new(gw_core::error::ErrorKind::Upstream5xx, m));
        let _ = self.run_post(ctx, ran_count, Some(response), error).await;
        self.accumulators.remove(ctx.request_id());
    }

    async fn finish_stream_error(&self, ctx: &RequestContext, error: GatewayError) {
        let ran_count = self.pipeline.len();
        let _ = self.run_post(ctx, ran_count, None, Some(error)).await;
        self.accumulators.remove(ctx.request_id());
    }
}

struct PreAccepted {
    request: Request,
    ran_count: usize,
}

struct OrchestratorDone(Result<Response, GatewayError>);

/// Replace a chat-like request's message list while preserving whether it
/// was a `Chat` or `Responses` payload (spec §4.7's tool-call loop-back
/// must not silently convert one into the other).
fn with_messages(request: &Request, messages: Vec<Message>) -> Request {
    let payload = match request.payload {
        RequestPayload::Responses { .. } => RequestPayload::Responses { messages },
        _ => RequestPayload::Chat { messages },
    };
    request.with_payload(payload)
}
