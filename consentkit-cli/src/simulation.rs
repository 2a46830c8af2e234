//! A scripted CMP living in a simulated top window.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use consentkit_core::rpc::{CmpCallback, CmpFrame, CmpSurface, FrameError, InboundMessage};
use consentkit_core::IabLookup;
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Behaviour of the scripted CMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CmpMode {
    /// Answer every call with consent data.
    Respond,
    /// Answer with a value that is not a consent object.
    Malformed,
    /// Receive calls but never answer.
    Silent,
    /// No CMP on the page.
    Missing,
    /// Expose the CMP API in place instead of through frames.
    Direct,
}

/// What the scripted CMP answers, and how.
pub struct CmpScript {
    pub mode: CmpMode,
    pub delay: Duration,
    pub consent_string: String,
    pub gdpr_applies: bool,
    pub text_replies: bool,
}

impl CmpScript {
    fn return_value(&self) -> Value {
        match self.mode {
            CmpMode::Malformed => json!("CMP is still loading"),
            _ => json!({
                "metadata": self.consent_string,
                "gdprApplies": self.gdpr_applies,
            }),
        }
    }
}

/// Top window hosting the scripted CMP. Posted calls are queued for the CMP task.
struct SimulatedWindow {
    has_cmp: bool,
    calls: mpsc::UnboundedSender<Value>,
}

impl CmpFrame for SimulatedWindow {
    fn has_locator(&self, _name: &str) -> Result<bool, FrameError> {
        Ok(self.has_cmp)
    }

    fn parent(&self) -> Option<Arc<dyn CmpFrame>> {
        None
    }

    fn post_message(&self, message: &Value, target_origin: &str) -> Result<(), FrameError> {
        tracing::debug!(%message, target_origin, "window received postMessage");
        self.calls
            .send(message.clone())
            .map_err(|err| FrameError(err.to_string()))
    }
}

struct DirectCmp {
    script: Arc<CmpScript>,
}

impl CmpSurface for DirectCmp {
    fn call(&self, command: &str, _parameter: Value, callback: CmpCallback) {
        tracing::debug!(command, "direct CMP call");
        let script = Arc::clone(&self.script);
        tokio::spawn(async move {
            tokio::time::sleep(script.delay).await;
            callback(script.return_value(), true);
        });
    }
}

/// Builds an IAB lookup wired to the scripted CMP.
///
/// Must be called from within a tokio runtime: the CMP answers from
/// background tasks.
pub fn build_lookup(script: CmpScript) -> Arc<IabLookup> {
    let script = Arc::new(script);
    let (calls, mut inbox) = mpsc::unbounded_channel::<Value>();

    let window = Arc::new(SimulatedWindow {
        has_cmp: script.mode != CmpMode::Missing,
        calls,
    });
    let mut lookup = IabLookup::new(window);
    if script.mode == CmpMode::Direct {
        lookup = lookup.with_direct_surface(Arc::new(DirectCmp {
            script: Arc::clone(&script),
        }));
    }
    let lookup = Arc::new(lookup);

    let listener = Arc::clone(&lookup);
    tokio::spawn(async move {
        while let Some(call) = inbox.recv().await {
            if script.mode == CmpMode::Silent {
                continue;
            }
            let Some(call_id) = call["__cmpCall"]["callId"].as_str().map(str::to_string) else {
                tracing::warn!(%call, "CMP ignored a message without a call id");
                continue;
            };

            let listener = Arc::clone(&listener);
            let script = Arc::clone(&script);
            tokio::spawn(async move {
                tokio::time::sleep(script.delay).await;
                let reply = json!({
                    "__cmpReturn": {
                        "callId": call_id,
                        "returnValue": script.return_value(),
                        "success": true,
                    }
                });
                let message = if script.text_replies {
                    InboundMessage::Text(reply.to_string())
                } else {
                    InboundMessage::Structured(reply)
                };
                if !listener.handle_message(&message) {
                    tracing::info!("CMP answer arrived after its call was dropped");
                }
            });
        }
    });

    lookup
}
