//! Fallback Controller (C6, spec §4.6): retries a request against an
//! ordered list of `(provider, model)` alternatives on fallback-eligible
//! terminal outcomes, in a round-robin shape generalized to carry an
//! error-classification decision rather than advancing unconditionally.

use gw_core::chunk::ChunkEvent;
use gw_core::request::ProviderModel;
use gw_core::{GatewayError, Request, Response};
use tokio::sync::mpsc;

use crate::cancellation::CancellationToken;
use crate::dispatch::Dispatcher;

/// The ordered target list a fallback run walks: the primary, then each
/// declared fallback in order.
fn targets(request: &Request) -> Vec<ProviderModel> {
    let mut targets = vec![request.primary()];
    targets.extend(request.common.fallbacks.iter().cloned());
    targets
}

/// Result of a non-streaming fallback run.
pub struct FallbackOutcome {
    pub response: Response,
    pub fallback_index: u32,
}

/// Run the primary target, then each fallback in order, until one
/// succeeds or every target is exhausted (spec §4.6, testable property 2:
/// "the final error surfaced equals the last attempt's error").
pub async fn run_non_stream(
    dispatcher: &Dispatcher,
    request_id: &str,
    request: &Request,
    virtual_key_scope: Option<&[String]>,
    cancellation: CancellationToken,
) -> Result<FallbackOutcome, GatewayError> {
    let targets = targets(request);
    let mut last_error: Option<GatewayError> = None;

    for (index, target) in targets.iter().enumerate() {
        match dispatcher
            .dispatch_non_stream(request_id, target, request, virtual_key_scope, cancellation.clone())
            .await
        {
            Ok(mut response) => {
                response.common.fallback_index = index as u32;
                return Ok(FallbackOutcome {
                    response,
                    fallback_index: index as u32,
                });
            }
            Err(err) => {
                let eligible = err.is_fallback_eligible();
                tracing::warn!(request_id, provider = %target.provider, model = %target.model, kind = ?err.kind, eligible, "fallback attempt failed");
                last_error = Some(err);
                if !eligible || index + 1 >= targets.len() {
                    break;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GatewayError::internal("fallback run produced no targets")))
}

/// Result of a streaming fallback run: the winning target's chunk
/// receiver, plus which index in the fallback chain it was.
pub struct StreamFallbackOutcome {
    pub chunks: mpsc::Receiver<ChunkEvent>,
    pub target: ProviderModel,
    pub fallback_index: u32,
}

/// Streaming variant: fallback is only attempted while no bytes have been
/// delivered to the client, which [`Dispatcher::dispatch_stream`] encodes
/// by only resolving once the worker's `first_byte` signal fires (spec
/// §4.6 "Streaming fallbacks").
pub async fn run_stream(
    dispatcher: &Dispatcher,
    request_id: &str,
    request: &Request,
    virtual_key_scope: Option<&[String]>,
    cancellation: CancellationToken,
) -> Result<StreamFallbackOutcome, GatewayError> {
    let targets = targets(request);
    let mut last_error: Option<GatewayError> = None;

    for (index, target) in targets.iter().enumerate() {
        match dispatcher
            .dispatch_stream(request_id, target, request, virtual_key_scope, cancellation.clone())
            .await
        {
            Ok(chunks) => {
                return Ok(StreamFallbackOutcome {
                    chunks,
                    target: target.clone(),
                    fallback_index: index as u32,
                });
            }
            Err(err) => {
                let eligible = err.is_fallback_eligible();
                tracing::warn!(request_id, provider = %target.provider, model = %target.model, kind = ?err.kind, eligible, "streaming fallback attempt failed before first byte");
                last_error = Some(err);
                if !eligible || index + 1 >= targets.len() {
                    break;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GatewayError::internal("fallback run produced no targets")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_core::Message;

    #[test]
    fn targets_prepends_primary_to_fallback_list() {
        let mut request = Request::chat("openai", "gpt-4o-mini", vec![Message::user("hi")]);
        request.common.fallbacks.push(ProviderModel::new("anthropic", "claude-3-5-sonnet-20240620"));
        let list = targets(&request);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].provider, "openai");
        assert_eq!(list[1].provider, "anthropic");
    }
}
