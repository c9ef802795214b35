//! Key Selector (spec C1, §4.1).
//!
//! `select(provider, model, virtual_key_scope?) -> (key, selection_metadata)
//! | no_suitable_key`. Candidates are weighted-random over keys whose
//! allowed-model set includes the requested model and, if a virtual-key
//! scope is supplied, whose id is in that scope.
//!
//! Each call recomputes prefix sums over the filtered candidate list — the
//! candidate set depends on the caller's live key list, so there is no
//! cross-call cache to keep coherent with config swaps.

use rand::Rng;
use thiserror::Error;

use crate::key::Key;

/// Failure to find any suitable key — surfaced, never retried against the
/// same key set (spec §4.1).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no suitable key for the requested model")]
pub struct SelectionError;

/// Metadata about how a key was selected, useful for logging/telemetry.
#[derive(Clone, Debug)]
pub struct SelectionMetadata {
    pub candidate_count: usize,
    pub total_weight: f32,
    pub drawn: f32,
}

/// Weighted-random key selector.
pub struct KeySelector;

impl KeySelector {
    pub fn new() -> Self {
        Self
    }

    /// Select one key from `keys` for `model`, optionally restricted to
    /// `virtual_key_scope` (a set of allowed key ids).
    pub fn select(
        &self,
        _provider: &str,
        model: &str,
        keys: &[Key],
        virtual_key_scope: Option<&[String]>,
    ) -> Result<(Key, SelectionMetadata), SelectionError> {
        let candidates: Vec<&Key> = keys
            .iter()
            .filter(|k| k.is_selectable() && k.allows_model(model))
            .filter(|k| virtual_key_scope.map_or(true, |scope| scope.iter().any(|id| id == &k.id)))
            .collect();

        if candidates.is_empty() {
            return Err(SelectionError);
        }

        let total: f32 = candidates.iter().map(|k| k.weight).sum();

        // Ties on equal weights use insertion (candidate) order; prefix
        // sums preserve that order by construction.
        let prefix: Vec<(usize, f32)> = {
            let mut running = 0.0_f32;
            candidates
                .iter()
                .enumerate()
                .map(|(i, k)| {
                    running += k.weight;
                    (i, running)
                })
                .collect()
        };

        let drawn = if total <= 0.0 {
            0.0
        } else {
            rand::thread_rng().gen_range(0.0..total)
        };

        let chosen_idx = prefix
            .iter()
            .find(|(_, cum)| drawn < *cum)
            .map(|(i, _)| *i)
            .unwrap_or(prefix.len() - 1);

        let chosen = candidates[chosen_idx].clone();
        Ok((
            chosen,
            SelectionMetadata {
                candidate_count: candidates.len(),
                total_weight: total,
                drawn,
            },
        ))
    }
}

impl Default for KeySelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn key(id: &str, weight: f32) -> Key {
        Key::new(id, format!("secret-{id}"), weight)
    }

    #[test]
    fn zero_weight_key_never_selected() {
        let selector = KeySelector::new();
        let keys = vec![key("a", 0.0), key("b", 1.0)];
        for _ in 0..50 {
            let (chosen, _) = selector.select("openai", "gpt-4o-mini", &keys, None).unwrap();
            assert_eq!(chosen.id, "b");
        }
    }

    #[test]
    fn model_restricted_key_excluded() {
        let mut restricted = key("a", 1.0);
        restricted.allowed_models.insert("other-model".into());
        let open = key("b", 1.0);
        let selector = KeySelector::new();
        let keys = vec![restricted, open];
        for _ in 0..50 {
            let (chosen, _) = selector.select("openai", "gpt-4o-mini", &keys, None).unwrap();
            assert_eq!(chosen.id, "b");
        }
    }

    #[test]
    fn virtual_key_scope_restricts_candidates() {
        let keys = vec![key("a", 1.0), key("b", 1.0)];
        let selector = KeySelector::new();
        let scope = vec!["b".to_string()];
        for _ in 0..20 {
            let (chosen, _) = selector
                .select("openai", "gpt-4o-mini", &keys, Some(&scope))
                .unwrap();
            assert_eq!(chosen.id, "b");
        }
    }

    #[test]
    fn empty_candidates_fail_with_no_suitable_key() {
        let selector = KeySelector::new();
        let keys: Vec<Key> = vec![];
        assert!(selector.select("openai", "gpt-4o-mini", &keys, None).is_err());
    }

    #[test]
    fn weighted_distribution_converges_empirically() {
        let selector = KeySelector::new();
        let keys = vec![key("a", 1.0), key("b", 3.0)];
        let mut counts = HashMap::new();
        const N: u32 = 10_000;
        for _ in 0..N {
            let (chosen, _) = selector.select("openai", "gpt-4o-mini", &keys, None).unwrap();
            *counts.entry(chosen.id).or_insert(0u32) += 1;
        }
        let a_ratio = f64::from(*counts.get("a").unwrap_or(&0)) / f64::from(N);
        // Expected 0.25 +/- 5%
        assert!((0.20..0.30).contains(&a_ratio), "a_ratio={a_ratio}");
    }
}
