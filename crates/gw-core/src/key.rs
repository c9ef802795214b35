//! `Key`: one credential in a provider's weighted pool (spec §3).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider-specific extra configuration attached to a key — Azure
/// deployments, Vertex service-account credentials, Bedrock IAM role, etc.
/// Kept as an opaque JSON blob here; adapters parse what they need.
pub type KeyMetaConfig = Value;

/// One credential in a provider's weighted pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    pub secret: String,
    /// Allowed model names. Empty means "all models".
    #[serde(default)]
    pub allowed_models: HashSet<String>,
    /// Weight in `[0, 1]`. Weights within a provider need not sum to 1.
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<KeyMetaConfig>,
}

impl Key {
    pub fn new(id: impl Into<String>, secret: impl Into<String>, weight: f32) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            allowed_models: HashSet::new(),
            weight,
            meta: None,
        }
    }

    /// A key whose weight is 0 is never selected (spec §3 invariant).
    pub fn is_selectable(&self) -> bool {
        self.weight > 0.0
    }

    /// A key whose allowed-model set excludes the requested model is never
    /// selected; an empty set means "all models" (spec §3 invariant, §4.1).
    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.contains(model)
    }
}
