//! The Governance Gate (C8): spec §4.8's five-step pre-dispatch check and
//! its post-dispatch counter commit.

use std::sync::Arc;

use chrono::Utc;
use gw_core::request::ProviderModel;
use gw_core::{GatewayError, VirtualKey};

use crate::store::GovernanceStore;

/// Actual usage observed after dispatch, applied to a virtual key's
/// counters in the PostHook (spec §4.8).
#[derive(Clone, Copy, Debug, Default)]
pub struct UsageCommit {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Computed cost, if a pricing table is available. `None` skips the
    /// budget update entirely rather than charging zero.
    pub cost: Option<f64>,
}

impl UsageCommit {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Enforces a virtual key's allow-list, budget, and rate limits around
/// dispatch.
pub struct GovernanceGate<S: GovernanceStore> {
    store: Arc<S>,
}

impl<S: GovernanceStore> GovernanceGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run spec §4.8 steps 1-5 for a request targeting `target`, estimated
    /// to cost `estimated_tokens` against the key's rate windows.
    ///
    /// A request with no virtual key skips governance entirely — spec
    /// §4.8 opens with "If the request carries a virtual key".
    pub fn check(
        &self,
        virtual_key_id: Option<&str>,
        target: &ProviderModel,
        estimated_tokens: u64,
    ) -> Result<(), GatewayError> {
        let Some(id) = virtual_key_id else {
            return Ok(());
        };

        let now = Utc::now();
        let outcome = self.store.with_key_mut(id, |vk| check_and_reset(vk, target, estimated_tokens, now));

        match outcome {
            None => Err(GatewayError::auth(format!("virtual key '{id}' not found"))),
            Some(result) => result,
        }
    }

    /// Apply actual usage to the key's counters (spec §4.8 PostHook):
    /// token and request rate windows always advance; the budget advances
    /// only if `commit.cost` carries a computed cost.
    pub fn commit(&self, virtual_key_id: Option<&str>, commit: UsageCommit) {
        let Some(id) = virtual_key_id else {
            return;
        };

        let applied = self.store.with_key_mut(id, |vk| {
            if let Some(rate_limit) = vk.rate_limit.as_mut() {
                rate_limit.token.add_usage(commit.total_tokens());
                rate_limit.request.add_usage(1);
            }
            if let Some(cost) = commit.cost {
                if let Some(budget) = vk.budget.as_mut() {
                    budget.add_usage(cost);
                }
            }
        });

        if applied.is_none() {
            tracing::warn!(virtual_key_id = id, "usage commit against unknown virtual key dropped");
        }
    }
}

/// Steps 1-5 of spec §4.8, run while holding the per-key lock so the
/// reset-then-check sequence is atomic with respect to concurrent
/// requests against the same key.
fn check_and_reset(
    vk: &mut VirtualKey,
    target: &ProviderModel,
    estimated_tokens: u64,
    now: chrono::DateTime<Utc>,
) -> Result<(), GatewayError> {
    if !vk.active {
        return Err(GatewayError::auth(format!("virtual key '{}' is inactive", vk.id)));
    }

    if !vk.allows(target) {
        return Err(GatewayError::permission(format!(
            "virtual key '{}' is not permitted to use {target}",
            vk.id
        )));
    }

    if let Some(budget) = vk.budget.as_mut() {
        budget.reset_if_elapsed(now);
        if budget.is_exhausted() {
            return Err(GatewayError::budget_exhausted(format!("virtual key '{}' has exhausted its budget", vk.id)));
        }
    }

    if let Some(rate_limit) = vk.rate_limit.as_mut() {
        rate_limit.token.reset_if_elapsed(now);
        rate_limit.request.reset_if_elapsed(now);

        if rate_limit.token.would_exceed(estimated_tokens) {
            return Err(GatewayError::rate_limited_local(format!(
                "virtual key '{}' would exceed its token rate limit",
                vk.id
            )));
        }
        if rate_limit.request.would_exceed(1) {
            return Err(GatewayError::rate_limited_local(format!(
                "virtual key '{}' would exceed its request rate limit",
                vk.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGovernanceStore;
    use gw_core::virtual_key::{AllowedTarget, Budget, RateLimit, RateWindow};

    fn target() -> ProviderModel {
        ProviderModel::new("openai", "gpt-4o-mini")
    }

    #[test]
    fn no_virtual_key_skips_governance() {
        let gate = GovernanceGate::new(Arc::new(InMemoryGovernanceStore::new()));
        assert!(gate.check(None, &target(), 100).is_ok());
    }

    #[test]
    fn missing_virtual_key_fails_auth() {
        let gate = GovernanceGate::new(Arc::new(InMemoryGovernanceStore::new()));
        let err = gate.check(Some("nope"), &target(), 100).unwrap_err();
        assert_eq!(err.kind, gw_core::ErrorKind::Auth);
    }

    #[test]
    fn inactive_key_fails_auth() {
        let store = InMemoryGovernanceStore::new();
        let mut vk = VirtualKey::new("vk1", "test");
        vk.active = false;
        store.upsert(vk);

        let gate = GovernanceGate::new(Arc::new(store));
        let err = gate.check(Some("vk1"), &target(), 100).unwrap_err();
        assert_eq!(err.kind, gw_core::ErrorKind::Auth);
    }

    #[test]
    fn disallowed_target_fails_permission() {
        let store = InMemoryGovernanceStore::new();
        let mut vk = VirtualKey::new("vk1", "test");
        vk.allowed_targets.push(AllowedTarget {
            provider: "anthropic".into(),
            model: "claude-3-5-sonnet-20240620".into(),
            weight: 1.0,
        });
        store.upsert(vk);

        let gate = GovernanceGate::new(Arc::new(store));
        let err = gate.check(Some("vk1"), &target(), 100).unwrap_err();
        assert_eq!(err.kind, gw_core::ErrorKind::Permission);
    }

    #[test]
    fn exhausted_budget_is_rejected() {
        let store = InMemoryGovernanceStore::new();
        let mut vk = VirtualKey::new("vk1", "test");
        let mut budget = Budget::new(10.0);
        budget.add_usage(10.0);
        vk.budget = Some(budget);
        store.upsert(vk);

        let gate = GovernanceGate::new(Arc::new(store));
        let err = gate.check(Some("vk1"), &target(), 100).unwrap_err();
        assert_eq!(err.kind, gw_core::ErrorKind::BudgetExhausted);
    }

    #[test]
    fn rate_limit_would_exceed_is_rejected() {
        let store = InMemoryGovernanceStore::new();
        let mut vk = VirtualKey::new("vk1", "test");
        vk.rate_limit = Some(RateLimit {
            token: RateWindow::new(100, 60),
            request: RateWindow::new(100, 60),
        });
        store.upsert(vk);

        let gate = GovernanceGate::new(Arc::new(store));
        let err = gate.check(Some("vk1"), &target(), 150).unwrap_err();
        assert_eq!(err.kind, gw_core::ErrorKind::RateLimitedLocal);
    }

    #[test]
    fn commit_advances_counters_and_budget() {
        let store = InMemoryGovernanceStore::new();
        let mut vk = VirtualKey::new("vk1", "test");
        vk.budget = Some(Budget::new(10.0));
        vk.rate_limit = Some(RateLimit {
            token: RateWindow::new(1000, 60),
            request: RateWindow::new(1000, 60),
        });
        store.upsert(vk);

        let gate = GovernanceGate::new(Arc::new(store));
        gate.check(Some("vk1"), &target(), 50).unwrap();
        gate.commit(
            Some("vk1"),
            UsageCommit {
                prompt_tokens: 30,
                completion_tokens: 20,
                cost: Some(1.5),
            },
        );

        let (usage, tokens, requests) = gate
            .store
            .with_key("vk1", |vk| {
                (
                    vk.budget.as_ref().unwrap().current_usage,
                    vk.rate_limit.as_ref().unwrap().token.current,
                    vk.rate_limit.as_ref().unwrap().request.current,
                )
            })
            .unwrap();
        assert_eq!(usage, 1.5);
        assert_eq!(tokens, 50);
        assert_eq!(requests, 1);
    }
}
