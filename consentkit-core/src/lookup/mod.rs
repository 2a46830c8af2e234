//! Consent lookup strategies, keyed by CMP framework id.

mod iab;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub use iab::{IabLookup, IAB_PLATFORM_ID};

use crate::gate::LookupResponder;

/// A way of asking a CMP for the user's vendor consents.
///
/// The strategy must eventually call [`LookupResponder::success`] or
/// [`LookupResponder::error`], but it does not have to: the gate's timeout
/// covers platforms that never answer. It may also answer before `lookup`
/// returns.
pub trait ConsentLookup: Send + Sync {
    /// Starts a lookup whose result is reported through `responder`.
    fn lookup(&self, responder: LookupResponder);
}

impl<F> ConsentLookup for F
where
    F: Fn(LookupResponder) + Send + Sync,
{
    fn lookup(&self, responder: LookupResponder) {
        self(responder);
    }
}

/// Open registry of lookup strategies.
#[derive(Default)]
pub struct LookupRegistry {
    strategies: RwLock<HashMap<String, Arc<dyn ConsentLookup>>>,
}

impl LookupRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry containing the built-in `iab` strategy.
    #[must_use]
    pub fn with_defaults(iab: Arc<IabLookup>) -> Self {
        let registry = Self::new();
        registry.register(IAB_PLATFORM_ID, iab);
        registry
    }

    /// Registers `strategy` under `platform_id`, replacing any previous one.
    pub fn register(&self, platform_id: &str, strategy: Arc<dyn ConsentLookup>) {
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(platform_id.to_string(), strategy);
    }

    /// Returns the strategy registered under `platform_id`.
    #[must_use]
    pub fn get(&self, platform_id: &str) -> Option<Arc<dyn ConsentLookup>> {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(platform_id)
            .cloned()
    }

    /// Whether a strategy is registered under `platform_id`.
    #[must_use]
    pub fn contains(&self, platform_id: &str) -> bool {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(platform_id)
    }

    /// Registered platform ids, sorted.
    #[must_use]
    pub fn platform_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = LookupRegistry::new();
        assert!(!registry.contains("custom"));

        registry.register("custom", Arc::new(|responder: LookupResponder| {
            responder.error("not implemented");
        }));
        registry.register("another", Arc::new(|_responder: LookupResponder| {}));

        assert!(registry.contains("custom"));
        assert!(registry.get("custom").is_some());
        assert!(registry.get("iab").is_none());
        assert_eq!(registry.platform_ids(), vec!["another", "custom"]);
    }
}
