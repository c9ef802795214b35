//! A plugin that logs request start/end via `tracing`, using the same
//! request-scoped span structure an HTTP handler would set up directly.

use async_trait::async_trait;
use gw_core::{GatewayError, Request, RequestContext, Response};

use crate::plugin::{Plugin, PostOutcome, PreOutcome};

pub struct LoggingPlugin;

#[async_trait]
impl Plugin for LoggingPlugin {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn pre(&self, ctx: &RequestContext, request: Request) -> PreOutcome {
        tracing::info!(
            request_id = ctx.request_id(),
            provider = %request.common.provider,
            model = %request.common.model,
            stream = request.common.stream,
            "request accepted"
        );
        PreOutcome::Continue(request)
    }

    async fn post(&self, ctx: &RequestContext, response: Option<Response>, error: Option<GatewayError>) -> PostOutcome {
        match (&response, &error) {
            (Some(response), None) => tracing::info!(
                request_id = ctx.request_id(),
                provider = %response.common.provider,
                model = %response.common.model,
                total_ms = response.common.latency.total_ms,
                prompt_tokens = response.common.usage.prompt_tokens,
                completion_tokens = response.common.usage.completion_tokens,
                "request completed"
            ),
            (_, Some(error)) => tracing::warn!(
                request_id = ctx.request_id(),
                kind = ?error.kind,
                message = %error.message,
                "request failed"
            ),
            (None, None) => tracing::warn!(request_id = ctx.request_id(), "request produced neither response nor error"),
        }
        PostOutcome::unchanged(response, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_core::Message;

    #[tokio::test]
    async fn pre_passes_request_through_unchanged() {
        let ctx = RequestContext::new();
        let request = Request::chat("openai", "gpt-4o-mini", vec![Message::user("hi")]);
        match LoggingPlugin.pre(&ctx, request.clone()).await {
            PreOutcome::Continue(passed) => assert_eq!(passed.common.model, request.common.model),
            _ => panic!("expected continue"),
        }
    }
}
