//! The consent gate.
//!
//! The gate sits in a [`Pipeline`] as the `consentManagement` hook. Each
//! invocation is one pass:
//!
//! ```text
//! invoke ─┬─ consent already committed ───────────────────────────► next
//!         ├─ platform id not registered ── warn ──────────────────► next
//!         └─ strategy.lookup(responder)
//!              ├─ settled synchronously ─┐
//!              ├─ timeout == 0 ──────────┤ first admitted outcome
//!              ├─ responder.success/err ─┤
//!              └─ timer fires ───────────┘
//!                   ├─ Ok(data) ─────────────── commit(data) ─────► next
//!                   ├─ Err, allow_without_consent ─ commit(empty) ─► next
//!                   └─ Err, !allow_without_consent ── error ──────► (dropped)
//! ```

mod pass;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::config::{ConfigStore, GateConfig, CONFIG_SECTION};
use crate::consent::{ConsentData, ConsentStore};
use crate::error::ConsentError;
use crate::lookup::{ConsentLookup, LookupRegistry};
use crate::pipeline::{Hook, Next, Pipeline};

use pass::{GatePass, SettleGuard};
pub use pass::{LookupOutcome, LookupResponder};

/// Name under which the gate registers in a [`Pipeline`].
pub const HOOK_NAME: &str = "consentManagement";

/// Priority of the gate hook.
pub const HOOK_PRIORITY: i32 = 50;

/// What the pipeline should do after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Run the continuation.
    Proceed,
    /// Drop the request; the continuation must not run.
    Abandon,
}

/// Coordinates consent lookups for a pipeline.
pub struct ConsentGate {
    registry: Arc<LookupRegistry>,
    store: Arc<ConsentStore>,
    config: RwLock<Arc<GateConfig>>,
}

impl ConsentGate {
    /// Creates a gate with an initial configuration.
    #[must_use]
    pub fn new(registry: Arc<LookupRegistry>, store: Arc<ConsentStore>, config: GateConfig) -> Self {
        Self {
            registry,
            store,
            config: RwLock::new(Arc::new(config)),
        }
    }

    /// Replaces the configuration used by subsequent passes.
    pub fn set_config(&self, config: GateConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> Arc<GateConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The store consent is committed to.
    #[must_use]
    pub fn store(&self) -> &Arc<ConsentStore> {
        &self.store
    }

    /// Subscribes to the `consentManagement` section of `config_store`.
    ///
    /// Each update re-derives the [`GateConfig`] and (re-)registers the gate
    /// in `pipeline`. Registration is idempotent.
    pub fn attach<R: Send + 'static>(self: &Arc<Self>, pipeline: &Arc<Pipeline<R>>, config_store: &ConfigStore) {
        let gate = Arc::clone(self);
        let pipeline = Arc::clone(pipeline);
        config_store.subscribe(CONFIG_SECTION, move |section| {
            gate.set_config(GateConfig::from_section(section));
            pipeline.add_hook(HOOK_NAME, HOOK_PRIORITY, Arc::clone(&gate) as Arc<dyn Hook<R>>);
        });
    }

    /// Runs one gate pass and reports whether the pipeline may continue.
    pub async fn gate(&self) -> GateDecision {
        let config = self.config();

        // Consent from an earlier pass (e.g. during a bid refresh) is reused.
        if self.store.has_consent_data() {
            return GateDecision::Proceed;
        }

        let Some(lookup) = self.registry.get(&config.platform_id) else {
            log::warn!(
                "CMP framework ({}) is not a supported framework.  Aborting consentManagement module and resuming auction.",
                config.platform_id
            );
            return GateDecision::Proceed;
        };

        match resolve(lookup.as_ref(), config.timeout).await {
            Ok(data) => {
                self.store.set_consent_data(data);
                GateDecision::Proceed
            }
            Err(err) if config.allow_without_consent => {
                self.store.set_consent_data(ConsentData::empty());
                log::warn!(
                    "{err} Resuming auction without consent data as per consentManagement config."
                );
                GateDecision::Proceed
            }
            Err(err) => {
                log::error!("{err} Canceling auction as per consentManagement config.");
                GateDecision::Abandon
            }
        }
    }
}

#[async_trait]
impl<R: Send + 'static> Hook<R> for ConsentGate {
    async fn call(&self, input: R, next: Next<R>) {
        match self.gate().await {
            GateDecision::Proceed => next.run(input).await,
            GateDecision::Abandon => drop(next),
        }
    }
}

/// Starts `lookup` and races it against `timeout`.
async fn resolve(lookup: &dyn ConsentLookup, timeout: Duration) -> LookupOutcome {
    let (pass, rx) = GatePass::new();
    // Settle hooks must run even if this future is dropped before an outcome.
    let _settle = SettleGuard(Arc::clone(&pass));
    lookup.lookup(LookupResponder::new(Arc::clone(&pass)));

    race(&pass, rx, timeout).await
}

async fn race(pass: &GatePass, mut rx: oneshot::Receiver<LookupOutcome>, timeout: Duration) -> LookupOutcome {
    // A strategy may settle before `lookup` returns; no timer is armed then.
    if !pass.has_exited() {
        if timeout.is_zero() {
            pass.admit(Err(ConsentError::UnexpectedResponse {
                received: "undefined".to_string(),
            }));
        } else {
            tokio::select! {
                biased;
                outcome = &mut rx => return outcome.unwrap_or_else(|_| Err(abandoned())),
                () = tokio::time::sleep(timeout) => {
                    pass.admit(Err(ConsentError::Timeout));
                }
            }
        }
    }
    rx.await.unwrap_or_else(|_| Err(abandoned()))
}

fn abandoned() -> ConsentError {
    ConsentError::Platform {
        reason: "consent lookup ended without an outcome".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn config(timeout_ms: u64, allow_without_consent: bool) -> GateConfig {
        GateConfig {
            platform_id: "iab".to_string(),
            timeout: Duration::from_millis(timeout_ms),
            allow_without_consent,
        }
    }

    fn gate_with<L: ConsentLookup + 'static>(lookup: L, config: GateConfig) -> ConsentGate {
        let registry = LookupRegistry::new();
        registry.register("iab", Arc::new(lookup));
        ConsentGate::new(Arc::new(registry), Arc::new(ConsentStore::new()), config)
    }

    #[tokio::test]
    async fn test_synchronous_success_skips_timer() {
        let gate = gate_with(
            |responder: LookupResponder| {
                responder.success(json!({ "metadata": "SYNC", "gdprApplies": false }));
            },
            config(10_000, false),
        );

        assert_eq!(gate.gate().await, GateDecision::Proceed);
        let data = gate.store().consent_data().unwrap();
        assert_eq!(data.consent_string.as_deref(), Some("SYNC"));
        assert_eq!(data.gdpr_applies, Some(false));
    }

    #[tokio::test]
    async fn test_zero_timeout_fails_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let gate = gate_with(
            move |_responder: LookupResponder| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            config(0, true),
        );

        assert_eq!(gate.gate().await, GateDecision::Proceed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.store().consent_data(), Some(ConsentData::empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_success_is_ignored() {
        let parked = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&parked);
        let gate = gate_with(
            move |responder: LookupResponder| {
                *slot.lock().unwrap() = Some(responder);
            },
            config(500, false),
        );

        assert_eq!(gate.gate().await, GateDecision::Abandon);
        assert!(gate.store().consent_data().is_none());

        let responder = parked.lock().unwrap().take().unwrap();
        assert!(!responder.success(json!({ "metadata": "LATE" })));
        assert!(gate.store().consent_data().is_none());
    }

    #[tokio::test]
    async fn test_unregistered_platform_proceeds_without_commit() {
        let gate = gate_with(|_responder: LookupResponder| {}, config(0, false));
        gate.set_config(GateConfig {
            platform_id: "unknown".to_string(),
            ..config(0, false)
        });

        assert_eq!(gate.gate().await, GateDecision::Proceed);
        assert!(gate.store().consent_data().is_none());
    }

    #[tokio::test]
    async fn test_settle_hooks_run_after_outcome() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cleaned);
        let gate = gate_with(
            move |responder: LookupResponder| {
                let counter = Arc::clone(&counter);
                responder.on_settle(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                responder.error("CMP unavailable");
            },
            config(1_000, true),
        );

        assert_eq!(gate.gate().await, GateDecision::Proceed);
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_pass_still_settles() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cleaned);
        let gate = gate_with(
            move |responder: LookupResponder| {
                let counter = Arc::clone(&counter);
                responder.on_settle(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            },
            config(10_000, false),
        );

        let mut pass = tokio_test::task::spawn(gate.gate());
        tokio_test::assert_pending!(pass.poll());
        assert_eq!(cleaned.load(Ordering::SeqCst), 0);

        drop(pass);
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert!(gate.store().consent_data().is_none());
    }
}
