//! `VirtualKey`: tenant-scoped credential carrying governance policy
//! (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::ProviderModel;

/// A budget ceiling tracked against actual spend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Budget {
    pub max_limit: f64,
    #[serde(default)]
    pub reset_duration_secs: Option<i64>,
    pub current_usage: f64,
    pub last_reset: DateTime<Utc>,
}

impl Budget {
    pub fn new(max_limit: f64) -> Self {
        Self {
            max_limit,
            reset_duration_secs: None,
            current_usage: 0.0,
            last_reset: Utc::now(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_limit > 0.0 && self.current_usage >= self.max_limit
    }

    /// Counters never go negative (spec §3 invariant).
    pub fn add_usage(&mut self, cost: f64) {
        self.current_usage = (self.current_usage + cost).max(0.0);
    }

    /// Reset the counter if its window has elapsed (spec §4.8 step 5).
    pub fn reset_if_elapsed(&mut self, now: DateTime<Utc>) {
        if let Some(secs) = self.reset_duration_secs {
            if (now - self.last_reset).num_seconds() >= secs {
                self.current_usage = 0.0;
                self.last_reset = now;
            }
        }
    }
}

/// One side (token or request) of a rate-limit window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateWindow {
    pub max: u64,
    pub current: u64,
    pub reset_duration_secs: i64,
    pub last_reset: DateTime<Utc>,
}

impl RateWindow {
    pub fn new(max: u64, reset_duration_secs: i64) -> Self {
        Self {
            max,
            current: 0,
            reset_duration_secs,
            last_reset: Utc::now(),
        }
    }

    /// Reset the counter if its window has elapsed (spec §4.8 step 5).
    pub fn reset_if_elapsed(&mut self, now: DateTime<Utc>) {
        if (now - self.last_reset).num_seconds() >= self.reset_duration_secs {
            self.current = 0;
            self.last_reset = now;
        }
    }

    /// `current + estimated_cost > max_limit` means reject (spec §4.8 step 4).
    pub fn would_exceed(&self, estimated_cost: u64) -> bool {
        self.max > 0 && self.current.saturating_add(estimated_cost) > self.max
    }

    pub fn add_usage(&mut self, amount: u64) {
        self.current = self.current.saturating_add(amount);
    }
}

/// Token and request rate limits for a virtual key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimit {
    pub token: RateWindow,
    pub request: RateWindow,
}

/// One allowed (provider, model, weight) tuple in a virtual key's scope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllowedTarget {
    pub provider: String,
    pub model: String,
    pub weight: f32,
}

/// A tenant-scoped credential carrying governance policy (spec §3, C8).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VirtualKey {
    pub id: String,
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub allowed_targets: Vec<AllowedTarget>,
    #[serde(default)]
    pub mcp_client_allow_list: Option<Vec<String>>,
    #[serde(default)]
    pub budget: Option<Budget>,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
}

impl VirtualKey {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: true,
            team: None,
            customer: None,
            allowed_targets: Vec::new(),
            mcp_client_allow_list: None,
            budget: None,
            rate_limit: None,
        }
    }

    /// Whether `(provider, model)` is permitted — spec §4.8 step 2: "if the
    /// list is non-empty" and the pair is absent, fail with permission_error.
    pub fn allows(&self, target: &ProviderModel) -> bool {
        self.allowed_targets.is_empty()
            || self
                .allowed_targets
                .iter()
                .any(|t| t.provider == target.provider && t.model == target.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_permits_everything() {
        let vk = VirtualKey::new("vk1", "test");
        assert!(vk.allows(&ProviderModel::new("openai", "gpt-4o-mini")));
    }

    #[test]
    fn non_empty_allow_list_restricts() {
        let mut vk = VirtualKey::new("vk1", "test");
        vk.allowed_targets.push(AllowedTarget {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            weight: 1.0,
        });
        assert!(vk.allows(&ProviderModel::new("openai", "gpt-4o-mini")));
        assert!(!vk.allows(&ProviderModel::new("anthropic", "claude-3-5-sonnet-20240620")));
    }

    #[test]
    fn budget_exhaustion_detected() {
        let mut budget = Budget::new(1.00);
        budget.add_usage(0.99);
        assert!(!budget.is_exhausted());
        budget.add_usage(0.02);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn rate_window_rejects_when_estimate_exceeds() {
        let window = RateWindow::new(100, 60);
        assert!(!window.would_exceed(50));
        assert!(window.would_exceed(150));
    }
}
