//! The pipeline engine: runs configured plugins' `pre` hooks in order and
//! `post` hooks in reverse, per spec §4.4's five execution rules.

use std::sync::Arc;

use gw_core::{GatewayError, Request, RequestContext, Response};

use crate::plugin::{Plugin, PostOutcome, PreOutcome};

/// Outcome of running the pre chain, paired with how many plugins (from
/// the front) "successfully ran" pre and therefore must see `post` (spec
/// §4.4 rule 5).
pub struct PreRunResult {
    pub ran_count: usize,
    pub outcome: PreOutcome,
}

pub struct PostRunResult {
    pub response: Option<Response>,
    pub error: Option<GatewayError>,
}

pub struct Pipeline {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl Pipeline {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every plugin's `pre` in configured order.
    ///
    /// - If all plugins continue, `ran_count == plugins.len()` and the
    ///   outcome carries the (possibly rewritten) request.
    /// - If plugin `k` (0-based) short-circuits, `ran_count == k + 1` —
    ///   that plugin itself still gets `post`.
    /// - If plugin `k` fails, `ran_count == k` — the failing plugin is
    ///   excluded from `post`, but plugins `0..k` are included.
    pub async fn run_pre(&self, ctx: &RequestContext, mut request: Request) -> PreRunResult {
        for (k, plugin) in self.plugins.iter().enumerate() {
            match plugin.pre(ctx, request).await {
                PreOutcome::Continue(rewritten) => {
                    request = rewritten;
                }
                PreOutcome::ShortCircuit(response) => {
                    return PreRunResult {
                        ran_count: k + 1,
                        outcome: PreOutcome::ShortCircuit(response),
                    };
                }
                PreOutcome::Fail(error) => {
                    return PreRunResult {
                        ran_count: k,
                        outcome: PreOutcome::Fail(error),
                    };
                }
            }
        }
        PreRunResult {
            ran_count: self.plugins.len(),
            outcome: PreOutcome::Continue(request),
        }
    }

    /// Run `post` for plugins `[0, ran_count)` in reverse order. Each
    /// plugin observes the response/error as rewritten by the plugin after
    /// it in the unwind (i.e. the one that ran more recently).
    pub async fn run_post(
        &self,
        ctx: &RequestContext,
        ran_count: usize,
        mut response: Option<Response>,
        mut error: Option<GatewayError>,
    ) -> PostRunResult {
        for plugin in self.plugins[..ran_count].iter().rev() {
            let outcome: PostOutcome = plugin.post(ctx, response, error).await;
            response = outcome.response;
            error = outcome.error;
        }
        PostRunResult { response, error }
    }

    /// Release every plugin's resources, regardless of how the request
    /// concluded. Called once per pipeline lifetime, not per request.
    pub async fn cleanup_all(&self) {
        for plugin in &self.plugins {
            plugin.cleanup().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PostOutcome;
    use gw_core::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPlugin {
        name: &'static str,
        pre_calls: Arc<AtomicUsize>,
        post_calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Plugin for CountingPlugin {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn pre(&self, _ctx: &RequestContext, request: Request) -> PreOutcome {
            self.pre_calls.fetch_add(1, Ordering::SeqCst);
            PreOutcome::Continue(request)
        }

        async fn post(&self, _ctx: &RequestContext, response: Option<Response>, error: Option<GatewayError>) -> PostOutcome {
            self.post_calls.fetch_add(1, Ordering::SeqCst);
            PostOutcome::unchanged(response, error)
        }
    }

    struct ShortCircuitPlugin;

    #[async_trait::async_trait]
    impl Plugin for ShortCircuitPlugin {
        fn name(&self) -> &'static str {
            "short_circuit"
        }

        async fn pre(&self, _ctx: &RequestContext, _request: Request) -> PreOutcome {
            PreOutcome::ShortCircuit(test_response())
        }
    }

    struct FailingPlugin;

    #[async_trait::async_trait]
    impl Plugin for FailingPlugin {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn pre(&self, _ctx: &RequestContext, _request: Request) -> PreOutcome {
            PreOutcome::Fail(GatewayError::validation("nope"))
        }
    }

    fn test_request() -> Request {
        Request::chat("openai", "gpt-4o-mini", vec![Message::user("hi")])
    }

    fn test_response() -> Response {
        Response::chat("openai", "gpt-4o-mini", Message::assistant("hi"))
    }

    #[tokio::test]
    async fn all_plugins_run_pre_and_post_when_nothing_short_circuits() {
        let pre_calls = Arc::new(AtomicUsize::new(0));
        let post_calls = Arc::new(AtomicUsize::new(0));
        let plugins: Vec<Arc<dyn Plugin>> = vec![
            Arc::new(CountingPlugin { name: "a", pre_calls: pre_calls.clone(), post_calls: post_calls.clone() }),
            Arc::new(CountingPlugin { name: "b", pre_calls: pre_calls.clone(), post_calls: post_calls.clone() }),
        ];
        let pipeline = Pipeline::new(plugins);
        let ctx = RequestContext::new();

        let pre = pipeline.run_pre(&ctx, test_request()).await;
        assert_eq!(pre.ran_count, 2);
        assert_eq!(pre_calls.load(Ordering::SeqCst), 2);

        pipeline.run_post(&ctx, pre.ran_count, Some(test_response()), None).await;
        assert_eq!(post_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_circuit_plugin_itself_receives_post() {
        let pre_calls = Arc::new(AtomicUsize::new(0));
        let post_calls = Arc::new(AtomicUsize::new(0));
        let plugins: Vec<Arc<dyn Plugin>> = vec![
            Arc::new(CountingPlugin { name: "a", pre_calls: pre_calls.clone(), post_calls: post_calls.clone() }),
            Arc::new(ShortCircuitPlugin),
            Arc::new(CountingPlugin { name: "c", pre_calls: pre_calls.clone(), post_calls: post_calls.clone() }),
        ];
        let pipeline = Pipeline::new(plugins);
        let ctx = RequestContext::new();

        let pre = pipeline.run_pre(&ctx, test_request()).await;
        assert_eq!(pre.ran_count, 2, "short-circuiting plugin counts itself");
        assert_eq!(pre_calls.load(Ordering::SeqCst), 1, "plugin c's pre must not run");

        match pre.outcome {
            PreOutcome::ShortCircuit(response) => {
                pipeline.run_post(&ctx, pre.ran_count, Some(response), None).await;
            }
            _ => panic!("expected short circuit"),
        }
        assert_eq!(post_calls.load(Ordering::SeqCst), 1, "only plugin a's post runs");
    }

    #[tokio::test]
    async fn failing_plugin_is_excluded_from_its_own_post() {
        let pre_calls = Arc::new(AtomicUsize::new(0));
        let post_calls = Arc::new(AtomicUsize::new(0));
        let plugins: Vec<Arc<dyn Plugin>> = vec![
            Arc::new(CountingPlugin { name: "a", pre_calls: pre_calls.clone(), post_calls: post_calls.clone() }),
            Arc::new(FailingPlugin),
            Arc::new(CountingPlugin { name: "c", pre_calls: pre_calls.clone(), post_calls: post_calls.clone() }),
        ];
        let pipeline = Pipeline::new(plugins);
        let ctx = RequestContext::new();

        let pre = pipeline.run_pre(&ctx, test_request()).await;
        assert_eq!(pre.ran_count, 1, "failing plugin excludes itself from post");

        match pre.outcome {
            PreOutcome::Fail(error) => {
                pipeline.run_post(&ctx, pre.ran_count, None, Some(error)).await;
            }
            _ => panic!("expected failure"),
        }
        assert_eq!(post_calls.load(Ordering::SeqCst), 1, "only plugin a's post runs");
    }
}
