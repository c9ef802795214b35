//! The `Plugin` trait (spec C4, §4.4).

use async_trait::async_trait;
use gw_core::{GatewayError, Request, RequestContext, Response};

/// Outcome of a plugin's `pre` hook.
pub enum PreOutcome {
    /// Proceed to the next plugin (or dispatch) with this request, possibly
    /// rewritten.
    Continue(Request),
    /// Halt pre-execution and answer with this response without dispatching
    /// upstream. Post still runs for this plugin and everything before it.
    ShortCircuit(Response),
    /// Halt pre-execution with an error. Post runs only for plugins strictly
    /// before this one.
    Fail(GatewayError),
}

/// Outcome of a plugin's `post` hook: the response/error observed by
/// earlier (in original order) plugins after this one has had a chance to
/// rewrite either.
pub struct PostOutcome {
    pub response: Option<Response>,
    pub error: Option<GatewayError>,
}

impl PostOutcome {
    pub fn unchanged(response: Option<Response>, error: Option<GatewayError>) -> Self {
        Self { response, error }
    }
}

/// A request/response hook invoked symmetrically around dispatch.
///
/// Implementations must treat `ctx` as read-only ambient state (spec §9);
/// any background work started in `post` must capture what it needs before
/// detaching, since the context may already be reused for the next request
/// by the time a spawned task runs.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once per request, in configured order. Default: pass through.
    async fn pre(&self, _ctx: &RequestContext, request: Request) -> PreOutcome {
        PreOutcome::Continue(request)
    }

    /// Called once per request whose `pre` ran, in reverse configured
    /// order. Default: pass through unchanged.
    async fn post(&self, _ctx: &RequestContext, response: Option<Response>, error: Option<GatewayError>) -> PostOutcome {
        PostOutcome::unchanged(response, error)
    }

    /// Released resources regardless of how the request concluded.
    async fn cleanup(&self) {}
}
