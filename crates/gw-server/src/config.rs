//! Narrow configuration loading (spec §6 "Environment variables", SPEC_FULL
//! §1 ambient-stack note): resolves `env.VAR_NAME` patterns in a TOML
//! bootstrap file into live [`ProviderConfig`]/[`VirtualKey`] records.
//!
//! Deliberately thin: hot-reload, the web UI, and a persistent relational
//! config store are out of scope (spec §1 Non-goals) — this module only
//! gets the process from zero to a running set of provider/virtual-key
//! snapshots at startup.

use std::collections::HashMap;

use gw_core::key::Key;
use gw_core::provider_config::{NetworkConfig, PerformanceConfig, ProviderConfig};
use gw_core::virtual_key::{AllowedTarget, Budget, RateLimit, RateWindow, VirtualKey};
use serde::Deserialize;

/// Top-level shape of the bootstrap TOML file.
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub bind_addr: Option<String>,
    #[serde(default)]
    pub providers: Vec<ProviderFileEntry>,
    #[serde(default)]
    pub virtual_keys: Vec<VirtualKeyFileEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderFileEntry {
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub initial_backoff_ms: Option<u64>,
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub buffer_size: Option<usize>,
    #[serde(default)]
    pub attach_raw_response: bool,
    #[serde(default)]
    pub keys: Vec<KeyFileEntry>,
    /// Whether this provider is enabled at all. A disabled provider whose
    /// `env.VAR_NAME` secret is missing never fails startup (spec §6).
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct KeyFileEntry {
    pub id: String,
    /// Either a literal secret or an `env.VAR_NAME` reference, resolved by
    /// [`resolve_env_refs`].
    pub secret: String,
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct VirtualKeyFileEntry {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub allowed_targets: Vec<AllowedTargetFileEntry>,
    #[serde(default)]
    pub budget_max_limit: Option<f64>,
    #[serde(default)]
    pub budget_reset_secs: Option<i64>,
    #[serde(default)]
    pub token_rate_max: Option<u64>,
    #[serde(default)]
    pub request_rate_max: Option<u64>,
    #[serde(default)]
    pub rate_reset_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AllowedTargetFileEntry {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

/// Resolve an `env.VAR_NAME` reference against the process environment.
/// Returns the literal string unchanged if it doesn't match the pattern.
/// A referenced variable that is missing is only an error for an *enabled*
/// provider (spec §6: "missing variables fail startup only if the
/// referencing provider is enabled").
pub fn resolve_env_ref(value: &str) -> Result<String, String> {
    match value.strip_prefix("env.") {
        Some(var_name) => std::env::var(var_name).map_err(|_| format!("missing environment variable: {var_name}")),
        None => Ok(value.to_string()),
    }
}

impl GatewayConfig {
    pub fn load_from_str(contents: &str) -> anyhow::Result<Self> {
        let config: GatewayConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::load_from_str(&contents)
    }

    /// Resolve every provider entry into a live [`ProviderConfig`], skipping
    /// (and logging) disabled providers whose key secrets don't resolve.
    pub fn build_provider_configs(&self) -> anyhow::Result<HashMap<String, ProviderConfig>> {
        let mut out = HashMap::new();
        for entry in &self.providers {
            let mut keys = Vec::new();
            let mut missing_secret = false;
            for k in &entry.keys {
                match resolve_env_ref(&k.secret) {
                    Ok(secret) => {
                        let mut key = Key::new(k.id.clone(), secret, k.weight);
                        key.allowed_models = k.allowed_models.iter().cloned().collect();
                        keys.push(key);
                    }
                    Err(e) => {
                        if entry.enabled {
                            anyhow::bail!("provider '{}': {e}", entry.name);
                        }
                        missing_secret = true;
                        tracing::warn!(provider = %entry.name, "skipping disabled provider with unresolved secret: {e}");
                    }
                }
            }
            if missing_secret && !entry.enabled {
                continue;
            }

            let network = NetworkConfig {
                base_url: entry.base_url.clone().unwrap_or_default(),
                timeout: std::time::Duration::from_millis(entry.timeout_ms.unwrap_or(30_000)),
                max_retries: entry.max_retries.unwrap_or(2),
                initial_backoff: std::time::Duration::from_millis(entry.initial_backoff_ms.unwrap_or(250)),
                max_backoff: std::time::Duration::from_millis(entry.max_backoff_ms.unwrap_or(10_000)),
                extra_headers: HashMap::new(),
                proxy: None,
            };
            let performance = PerformanceConfig {
                concurrency: entry.concurrency.unwrap_or(8),
                buffer_size: entry.buffer_size.unwrap_or(64),
            };
            performance.validate().map_err(|e| anyhow::anyhow!("provider '{}': {e}", entry.name))?;

            out.insert(
                entry.name.clone(),
                ProviderConfig {
                    name: entry.name.clone(),
                    network,
                    performance,
                    keys,
                    attach_raw_response: entry.attach_raw_response,
                },
            );
        }
        Ok(out)
    }

    pub fn build_virtual_keys(&self) -> Vec<VirtualKey> {
        self.virtual_keys
            .iter()
            .map(|entry| {
                let mut vk = VirtualKey::new(entry.id.clone(), entry.name.clone());
                vk.active = entry.active;
                vk.allowed_targets = entry
                    .allowed_targets
                    .iter()
                    .map(|t| AllowedTarget {
                        provider: t.provider.clone(),
                        model: t.model.clone(),
                        weight: t.weight,
                    })
                    .collect();
                if let Some(max_limit) = entry.budget_max_limit {
                    let mut budget = Budget::new(max_limit);
                    budget.reset_duration_secs = entry.budget_reset_secs;
                    vk.budget = Some(budget);
                }
                if entry.token_rate_max.is_some() || entry.request_rate_max.is_some() {
                    let reset = entry.rate_reset_secs.unwrap_or(60);
                    vk.rate_limit = Some(RateLimit {
                        token: RateWindow::new(entry.token_rate_max.unwrap_or(0), reset),
                        request: RateWindow::new(entry.request_rate_max.unwrap_or(0), reset),
                    });
                }
                vk
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_ref_resolves_against_process_environment() {
        std::env::set_var("GW_TEST_SECRET", "sk-abc123");
        assert_eq!(resolve_env_ref("env.GW_TEST_SECRET").unwrap(), "sk-abc123");
        std::env::remove_var("GW_TEST_SECRET");
    }

    #[test]
    fn literal_value_passes_through() {
        assert_eq!(resolve_env_ref("sk-literal").unwrap(), "sk-literal");
    }

    #[test]
    fn missing_env_ref_is_an_error() {
        assert!(resolve_env_ref("env.GW_TEST_DEFINITELY_MISSING").is_err());
    }

    #[test]
    fn disabled_provider_with_missing_secret_is_skipped_not_fatal() {
        let toml = r#"
            [[providers]]
            name = "openai"
            enabled = false
            [[providers.keys]]
            id = "k1"
            secret = "env.GW_TEST_DEFINITELY_MISSING_2"
        "#;
        let config = GatewayConfig::load_from_str(toml).unwrap();
        let providers = config.build_provider_configs().unwrap();
        assert!(!providers.contains_key("openai"));
    }

    #[test]
    fn enabled_provider_with_missing_secret_fails_startup() {
        let toml = r#"
            [[providers]]
            name = "openai"
            [[providers.keys]]
            id = "k1"
            secret = "env.GW_TEST_DEFINITELY_MISSING_3"
        "#;
        let config = GatewayConfig::load_from_str(toml).unwrap();
        assert!(config.build_provider_configs().is_err());
    }
}
