//! Single-admission slot for one gate pass.
//!
//! Several sources race to finish a pass: the strategy's success and error
//! callbacks, the timeout, and the zero-timeout shortcut. Whichever reaches
//! [`GatePass::admit`] first wins. Later arrivals are discarded.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::consent::ConsentData;
use crate::error::ConsentError;

/// Validated result of a consent lookup.
pub type LookupOutcome = Result<ConsentData, ConsentError>;

type SettleHook = Box<dyn FnOnce() + Send>;

pub(crate) struct GatePass {
    exited: AtomicBool,
    outcome: Mutex<Option<oneshot::Sender<LookupOutcome>>>,
    // `None` once the hooks have run.
    settle_hooks: Mutex<Option<Vec<SettleHook>>>,
}

impl GatePass {
    pub(crate) fn new() -> (Arc<Self>, oneshot::Receiver<LookupOutcome>) {
        let (tx, rx) = oneshot::channel();
        let pass = Arc::new(Self {
            exited: AtomicBool::new(false),
            outcome: Mutex::new(Some(tx)),
            settle_hooks: Mutex::new(Some(Vec::new())),
        });
        (pass, rx)
    }

    pub(crate) fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Test-and-set on the exit flag. Returns whether `outcome` was admitted.
    pub(crate) fn admit(&self, outcome: LookupOutcome) -> bool {
        if self.exited.swap(true, Ordering::AcqRel) {
            log::debug!("consent lookup already settled, discarding late outcome: {outcome:?}");
            return false;
        }
        let sender = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            // The gate owns the receiver for the whole pass.
            let _ = sender.send(outcome);
        }
        true
    }

    fn on_settle(&self, hook: SettleHook) {
        let mut hooks = self
            .settle_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = hooks.as_mut() {
            pending.push(hook);
            return;
        }
        drop(hooks);
        hook();
    }

    /// Runs the registered settle hooks. Later registrations run immediately.
    pub(crate) fn settle(&self) {
        let hooks = mem::take(
            &mut *self
                .settle_hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for hook in hooks.unwrap_or_default() {
            hook();
        }
    }
}

/// Runs the settle hooks of a pass when dropped, including when the pass
/// future is cancelled mid-lookup.
pub(crate) struct SettleGuard(pub(crate) Arc<GatePass>);

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.0.settle();
    }
}

/// Completion handle given to a [`crate::ConsentLookup`] strategy.
///
/// It carries the two callbacks of the lookup contract. Only the first
/// completion of a pass counts, whether it comes from this handle or from the
/// gate's timer. Every later call is a silent no-op.
#[derive(Clone)]
pub struct LookupResponder {
    pass: Arc<GatePass>,
}

impl LookupResponder {
    pub(crate) const fn new(pass: Arc<GatePass>) -> Self {
        Self { pass }
    }

    /// Reports the raw `getVendorConsents` response.
    ///
    /// The response is validated first. A malformed response fails the pass
    /// just like [`LookupResponder::error`]. Returns whether this call
    /// decided the pass.
    pub fn success(&self, response: Value) -> bool {
        self.pass.admit(ConsentData::from_cmp_response(response))
    }

    /// Reports that the platform could not produce consent.
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.fail(ConsentError::Platform {
            reason: message.into(),
        })
    }

    /// Fails the pass with a specific error.
    pub fn fail(&self, error: ConsentError) -> bool {
        self.pass.admit(Err(error))
    }

    /// Whether the pass has already been decided.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.pass.has_exited()
    }

    /// Registers cleanup to run once the pass exits, whatever the outcome.
    pub fn on_settle<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pass.on_settle(Box::new(hook));
    }
}
