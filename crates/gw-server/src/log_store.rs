//! The `LogStore` interface (spec §6): "governance entities ... and
//! request logs live in a relational store accessed through a narrow
//! LogStore / GovernanceStore interface". `GovernanceStore` lives in
//! `gw_governance`; this is its request-log counterpart. Only the trait
//! and an in-memory stand-in ship here — a real deployment backs it with
//! a database, grounded the same way `gw_governance::InMemoryGovernanceStore`
//! stands in for one.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of the request log: a completed or failed gateway request,
/// written once in the orchestrator's final PostHook.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: String,
    pub request_id: String,
    pub virtual_key_id: Option<String>,
    pub provider: String,
    pub model: String,
    pub status_code: u16,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost: Option<f64>,
    pub latency_ms: u64,
    pub fallback_index: u32,
    pub error_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A filter over [`RequestLog`] rows, used by `find_all`/`search_logs`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LogQuery {
    pub virtual_key_id: Option<String>,
    pub provider: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Aggregate usage stats over a set of logs (request count, token totals,
/// total cost, error rate).
#[derive(Clone, Debug, Default, Serialize)]
pub struct LogStats {
    pub request_count: u64,
    pub error_count: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost: f64,
}

/// One bucket of a latency histogram.
#[derive(Clone, Debug, Serialize)]
pub struct HistogramBucket {
    pub upper_bound_ms: u64,
    pub count: u64,
}

/// The narrow persistence interface spec §6 names for request logs:
/// `{create, update, find_first, find_all, search_logs, get_stats,
/// get_histogram, bulk_update_cost}`.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn create(&self, log: RequestLog);
    async fn update(&self, id: &str, f: Box<dyn FnOnce(&mut RequestLog) + Send>) -> bool;
    async fn find_first(&self, query: &LogQuery) -> Option<RequestLog>;
    async fn find_all(&self, query: &LogQuery) -> Vec<RequestLog>;
    async fn search_logs(&self, text: &str) -> Vec<RequestLog>;
    async fn get_stats(&self, query: &LogQuery) -> LogStats;
    async fn get_histogram(&self, query: &LogQuery, bucket_bounds_ms: &[u64]) -> Vec<HistogramBucket>;
    /// Back-fill `cost` on logs written before a pricing table existed, or
    /// after a pricing correction (spec §6).
    async fn bulk_update_cost(&self, ids: &[String], cost: f64);
}

/// In-memory `LogStore` suitable for development and tests; a production
/// deployment backs the trait with a real relational store.
#[derive(Default)]
pub struct InMemoryLogStore {
    logs: RwLock<Vec<RequestLog>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(log: &RequestLog, query: &LogQuery) -> bool {
        if let Some(vk) = &query.virtual_key_id {
            if log.virtual_key_id.as_deref() != Some(vk.as_str()) {
                return false;
            }
        }
        if let Some(provider) = &query.provider {
            if &log.provider != provider {
                return false;
            }
        }
        if let Some(since) = query.since {
            if log.created_at < since {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn create(&self, log: RequestLog) {
        self.logs.write().unwrap().push(log);
    }

    async fn update(&self, id: &str, f: Box<dyn FnOnce(&mut RequestLog) + Send>) -> bool {
        let mut logs = self.logs.write().unwrap();
        match logs.iter_mut().find(|l| l.id == id) {
            Some(log) => {
                f(log);
                true
            }
            None => false,
        }
    }

    async fn find_first(&self, query: &LogQuery) -> Option<RequestLog> {
        self.logs.read().unwrap().iter().find(|l| Self::matches(l, query)).cloned()
    }

    async fn find_all(&self, query: &LogQuery) -> Vec<RequestLog> {
        let logs = self.logs.read().unwrap();
        let mut matched: Vec<RequestLog> = logs.iter().filter(|l| Self::matches(l, query)).cloned().collect();
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }

    async fn search_logs(&self, text: &str) -> Vec<RequestLog> {
        let logs = self.logs.read().unwrap();
        logs.iter()
            .filter(|l| l.request_id.contains(text) || l.model.contains(text) || l.provider.contains(text))
            .cloned()
            .collect()
    }

    async fn get_stats(&self, query: &LogQuery) -> LogStats {
        let logs = self.logs.read().unwrap();
        let mut stats = LogStats::default();
        for log in logs.iter().filter(|l| Self::matches(l, query)) {
            stats.request_count += 1;
            if log.error_type.is_some() {
                stats.error_count += 1;
            }
            stats.prompt_tokens += u64::from(log.prompt_tokens);
            stats.completion_tokens += u64::from(log.completion_tokens);
            stats.total_cost += log.cost.unwrap_or(0.0);
        }
        stats
    }

    async fn get_histogram(&self, query: &LogQuery, bucket_bounds_ms: &[u64]) -> Vec<HistogramBucket> {
        let logs = self.logs.read().unwrap();
        let mut buckets: Vec<HistogramBucket> = bucket_bounds_ms
            .iter()
            .map(|&upper_bound_ms| HistogramBucket { upper_bound_ms, count: 0 })
            .collect();
        for log in logs.iter().filter(|l| Self::matches(l, query)) {
            if let Some(bucket) = buckets.iter_mut().find(|b| log.latency_ms <= b.upper_bound_ms) {
                bucket.count += 1;
            }
        }
        buckets
    }

    async fn bulk_update_cost(&self, ids: &[String], cost: f64) {
        let mut logs = self.logs.write().unwrap();
        for log in logs.iter_mut().filter(|l| ids.contains(&l.id)) {
            log.cost = Some(cost);
        }
    }
}

/// Stamp a [`RequestLog`] from a completed request, for the final PostHook.
pub fn log_from_response(
    id: impl Into<String>,
    request_id: impl Into<String>,
    virtual_key_id: Option<String>,
    response: &gw_core::Response,
    raw: Option<&Value>,
) -> RequestLog {
    let _ = raw;
    RequestLog {
        id: id.into(),
        request_id: request_id.into(),
        virtual_key_id,
        provider: response.common.provider.clone(),
        model: response.common.model.clone(),
        status_code: 200,
        prompt_tokens: response.common.usage.prompt_tokens,
        completion_tokens: response.common.usage.completion_tokens,
        cost: None,
        latency_ms: response.common.latency.total_ms,
        fallback_index: response.common.fallback_index,
        error_type: None,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(id: &str, provider: &str) -> RequestLog {
        RequestLog {
            id: id.into(),
            request_id: id.into(),
            virtual_key_id: Some("vk1".into()),
            provider: provider.into(),
            model: "gpt-4o-mini".into(),
            status_code: 200,
            prompt_tokens: 10,
            completion_tokens: 5,
            cost: Some(0.01),
            latency_ms: 120,
            fallback_index: 0,
            error_type: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn find_all_filters_by_provider() {
        let store = InMemoryLogStore::new();
        store.create(log("1", "openai")).await;
        store.create(log("2", "anthropic")).await;

        let query = LogQuery { provider: Some("openai".into()), ..Default::default() };
        let found = store.find_all(&query).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].provider, "openai");
    }

    #[tokio::test]
    async fn get_stats_aggregates_tokens_and_cost() {
        let store = InMemoryLogStore::new();
        store.create(log("1", "openai")).await;
        store.create(log("2", "openai")).await;

        let stats = store.get_stats(&LogQuery::default()).await;
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.prompt_tokens, 20);
        assert!((stats.total_cost - 0.02).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn bulk_update_cost_rewrites_matching_ids() {
        let store = InMemoryLogStore::new();
        store.create(log("1", "openai")).await;
        store.bulk_update_cost(&["1".to_string()], 0.5).await;

        let found = store.find_first(&LogQuery::default()).await.unwrap();
        assert_eq!(found.cost, Some(0.5));
    }
}
