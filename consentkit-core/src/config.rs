//! Gate configuration and the config store it subscribes to.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::ConsentError;

/// Name of the config section the gate listens to.
pub const CONFIG_SECTION: &str = "consentManagement";

/// CMP framework used when the config does not name one.
pub const DEFAULT_CMP: &str = "iab";

/// Lookup budget used when the config does not set one.
pub const DEFAULT_CONSENT_TIMEOUT_MS: u64 = 10_000;

/// Whether auctions run without consent data when the config does not say.
pub const DEFAULT_ALLOW_AUCTION_WITHOUT_CONSENT: bool = true;

/// Operating parameters for one gate pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Key of the lookup strategy in the [`crate::LookupRegistry`].
    pub platform_id: String,
    /// How long the CMP may take before the pass fails. Zero fails at once.
    pub timeout: Duration,
    /// Continue the pipeline without consent data when the lookup fails.
    pub allow_without_consent: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            platform_id: DEFAULT_CMP.to_string(),
            timeout: Duration::from_millis(DEFAULT_CONSENT_TIMEOUT_MS),
            allow_without_consent: DEFAULT_ALLOW_AUCTION_WITHOUT_CONSENT,
        }
    }
}

impl GateConfig {
    /// Derives a config from the `consentManagement` section.
    ///
    /// Recognized keys are `cmpApi`, `timeout` (milliseconds) and
    /// `allowAuctionWithoutConsent`. A key that is missing or has the wrong
    /// type falls back to its default, and the fallback is logged.
    #[must_use]
    pub fn from_section(section: &Value) -> Self {
        let platform_id = if let Some(cmp) = section.get("cmpApi").and_then(Value::as_str) {
            cmp.to_string()
        } else {
            log::info!(
                "consentManagement config did not specify cmp.  Using system default setting ({DEFAULT_CMP})."
            );
            DEFAULT_CMP.to_string()
        };

        let timeout_ms = if let Some(ms) = section.get("timeout").and_then(Value::as_u64) {
            ms
        } else {
            log::info!(
                "consentManagement config did not specify timeout.  Using system default setting ({DEFAULT_CONSENT_TIMEOUT_MS})."
            );
            DEFAULT_CONSENT_TIMEOUT_MS
        };

        let allow_without_consent = if let Some(allow) = section
            .get("allowAuctionWithoutConsent")
            .and_then(Value::as_bool)
        {
            allow
        } else {
            log::info!(
                "consentManagement config did not specify allowAuctionWithoutConsent.  Using system default setting ({DEFAULT_ALLOW_AUCTION_WITHOUT_CONSENT})."
            );
            DEFAULT_ALLOW_AUCTION_WITHOUT_CONSENT
        };

        Self {
            platform_id,
            timeout: Duration::from_millis(timeout_ms),
            allow_without_consent,
        }
    }
}

type Subscriber = Arc<dyn Fn(&Value) + Send + Sync>;

/// In-process store of named config sections.
///
/// Subscribers are notified when a later [`ConfigStore::set_config`] call
/// carries their section; registering does not replay the current value.
#[derive(Default)]
pub struct ConfigStore {
    sections: RwLock<Map<String, Value>>,
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl ConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the top-level sections of `config` into the store.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::InvalidConfig`] if `config` is not a JSON object.
    pub fn set_config(&self, config: Value) -> Result<(), ConsentError> {
        let Value::Object(updates) = config else {
            return Err(ConsentError::InvalidConfig {
                error: format!("expected a config object, got {config}"),
            });
        };

        {
            let mut sections = self
                .sections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for (topic, value) in &updates {
                sections.insert(topic.clone(), value.clone());
            }
        }

        // Callbacks run without the section lock so they may read the store.
        for (topic, value) in &updates {
            for subscriber in self.subscribers_of(topic) {
                subscriber(value);
            }
        }
        Ok(())
    }

    /// Returns the current value of a section.
    #[must_use]
    pub fn get_config(&self, topic: &str) -> Option<Value> {
        self.sections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
    }

    /// Registers `callback` for future updates of `topic`.
    pub fn subscribe<F>(&self, topic: &str, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    fn subscribers_of(&self, topic: &str) -> Vec<Subscriber> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}
