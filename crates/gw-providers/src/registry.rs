//! Registry of available provider adapters, looked up by name, in the same
//! name-keyed trait-object-registry shape as a tool registry, generalized
//! from tool-name → `Tool` to provider-name → `ProviderAdapter`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::ProviderAdapter;
use crate::{anthropic, azure, bedrock, cohere, google_genai, mistral, ollama, openai, vertex};

/// Name-keyed lookup of stateless provider adapters.
pub struct ProviderRegistry {
    adapters: HashMap<&'static str, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Build a registry with every built-in vendor adapter registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            adapters: HashMap::new(),
        };
        registry.register(Arc::new(openai::OpenAiAdapter));
        registry.register(Arc::new(anthropic::AnthropicAdapter));
        registry.register(Arc::new(ollama::OllamaAdapter));
        registry.register(Arc::new(google_genai::GoogleGenAiAdapter));
        registry.register(Arc::new(bedrock::BedrockAdapter));
        registry.register(Arc::new(vertex::VertexAdapter));
        registry.register(Arc::new(azure::AzureAdapter));
        registry.register(Arc::new(cohere::CohereAdapter));
        registry.register(Arc::new(mistral::MistralAdapter));
        registry
    }

    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name(), adapter);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.keys().copied().collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_the_spec_vendor_list() {
        let registry = ProviderRegistry::with_builtins();
        for name in [
            "openai", "anthropic", "ollama", "google_genai", "bedrock", "vertex", "azure",
            "cohere", "mistral",
        ] {
            assert!(registry.get(name).is_some(), "missing adapter: {name}");
        }
    }
}
