//! Call/response correlation for CMP frame messaging.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use super::frame::{locate_cmp_frame, CmpCallback, CmpFrame};
use super::wire::{CmpCallEnvelope, InboundMessage};
use crate::error::ConsentError;

/// Maximum number of CMP calls awaiting a response.
pub const MAX_PENDING_CALLS: usize = 64;

/// Messages are posted without restricting the receiver's origin; the CMP
/// validates what it receives.
const TARGET_ORIGIN: &str = "*";

struct PendingCall {
    callback: CmpCallback,
    issued_at: Instant,
}

/// Call/response channel to a CMP living in another frame.
///
/// Each call gets a fresh id and its callback is parked in the pending table
/// until [`FrameChannel::handle_message`] sees the matching `__cmpReturn`.
/// The channel never times calls out itself; callers drop abandoned entries
/// with [`FrameChannel::cancel`].
pub struct FrameChannel {
    target: Option<Arc<dyn CmpFrame>>,
    pending: Mutex<HashMap<String, PendingCall>>,
}

impl FrameChannel {
    /// Locates the CMP frame starting from `window`.
    ///
    /// A channel without a target still constructs; its calls fail with
    /// [`ConsentError::CmpNotFound`].
    #[must_use]
    pub fn connect(window: Arc<dyn CmpFrame>) -> Self {
        let target = locate_cmp_frame(window);
        if target.is_none() {
            log::debug!("no frame in the hierarchy exposes the CMP locator");
        }
        Self {
            target,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a CMP frame was found.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.target.is_some()
    }

    /// Posts `command` to the CMP frame and returns its call id.
    ///
    /// # Errors
    ///
    /// Fails if no CMP frame was found, if too many calls are in flight, or
    /// if the frame rejects the message.
    pub fn call(
        &self,
        command: &str,
        parameter: Value,
        callback: CmpCallback,
    ) -> Result<String, ConsentError> {
        let Some(target) = &self.target else {
            return Err(ConsentError::CmpNotFound);
        };

        let call_id = Uuid::new_v4().to_string();
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.len() >= MAX_PENDING_CALLS {
                return Err(ConsentError::TooManyPendingCalls {
                    count: pending.len() as u64,
                    max: MAX_PENDING_CALLS as u64,
                });
            }
            pending.insert(
                call_id.clone(),
                PendingCall {
                    callback,
                    issued_at: Instant::now(),
                },
            );
        }

        let envelope = CmpCallEnvelope::new(command, parameter, call_id.clone());
        let posted = serde_json::to_value(&envelope)
            .map_err(ConsentError::from)
            .and_then(|message| {
                target
                    .post_message(&message, TARGET_ORIGIN)
                    .map_err(|err| ConsentError::PostMessage {
                        error: err.to_string(),
                    })
            });
        if let Err(err) = posted {
            self.cancel(&call_id);
            return Err(err);
        }
        Ok(call_id)
    }

    /// Dispatches a `__cmpReturn` to its pending call.
    ///
    /// Returns whether a pending call was answered. Messages that are not
    /// return envelopes, or that answer unknown ids, are ignored.
    pub fn handle_message(&self, message: &InboundMessage) -> bool {
        let Some(ret) = message.cmp_return() else {
            return false;
        };

        // Removed before invoking so the callback may re-enter the channel.
        let entry = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ret.call_id);
        let Some(entry) = entry else {
            log::debug!("ignoring CMP response for unknown call {}", ret.call_id);
            return false;
        };

        log::debug!(
            "CMP call {} answered after {:?}",
            ret.call_id,
            entry.issued_at.elapsed()
        );
        (entry.callback)(ret.return_value, ret.success);
        true
    }

    /// Drops a pending call. Returns whether it was still pending.
    pub fn cancel(&self, call_id: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(call_id)
            .is_some()
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::json;

    use super::*;
    use crate::rpc::FrameError;

    #[derive(Default)]
    struct TopFrame {
        locator: bool,
        posted: Mutex<Vec<Value>>,
    }

    impl CmpFrame for TopFrame {
        fn has_locator(&self, _name: &str) -> Result<bool, FrameError> {
            Ok(self.locator)
        }

        fn parent(&self) -> Option<Arc<dyn CmpFrame>> {
            None
        }

        fn post_message(&self, message: &Value, target_origin: &str) -> Result<(), FrameError> {
            assert_eq!(target_origin, "*");
            self.posted.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn connected() -> (Arc<TopFrame>, FrameChannel) {
        let frame = Arc::new(TopFrame {
            locator: true,
            ..TopFrame::default()
        });
        let channel = FrameChannel::connect(frame.clone());
        (frame, channel)
    }

    #[test]
    fn test_call_without_cmp_frame() {
        let channel = FrameChannel::connect(Arc::new(TopFrame::default()));
        assert!(!channel.is_connected());
        let err = channel
            .call("getVendorConsents", Value::Null, Box::new(|_, _| {}))
            .unwrap_err();
        assert_eq!(err, ConsentError::CmpNotFound);
        assert_eq!(err.to_string(), "CMP not found");
    }

    #[test]
    fn test_response_matched_by_call_id() {
        let (frame, channel) = connected();
        let answered = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&answered);
        let call_id = channel
            .call(
                "getVendorConsents",
                Value::Null,
                Box::new(move |value, success| {
                    assert_eq!(value, json!({ "metadata": "BO" }));
                    assert!(success);
                    flag.store(true, Ordering::SeqCst);
                }),
            )
            .unwrap();

        let posted = frame.posted.lock().unwrap()[0].clone();
        assert_eq!(posted["__cmpCall"]["callId"], call_id.as_str());
        assert_eq!(posted["__cmpCall"]["command"], json!("getVendorConsents"));

        let other = InboundMessage::from(json!({
            "__cmpReturn": { "callId": "someone-else", "returnValue": null, "success": true }
        }));
        assert!(!channel.handle_message(&other));
        assert_eq!(channel.pending_calls(), 1);

        let reply = InboundMessage::from(
            json!({
                "__cmpReturn": { "callId": call_id, "returnValue": { "metadata": "BO" }, "success": true }
            })
            .to_string(),
        );
        assert!(channel.handle_message(&reply));
        assert!(answered.load(Ordering::SeqCst));
        assert_eq!(channel.pending_calls(), 0);

        // A duplicate answer finds nothing left to resolve.
        assert!(!channel.handle_message(&reply));
    }

    #[test]
    fn test_cancel_drops_pending_call() {
        let (_frame, channel) = connected();
        let call_id = channel
            .call("getVendorConsents", Value::Null, Box::new(|_, _| panic!("cancelled")))
            .unwrap();
        assert!(channel.cancel(&call_id));
        assert!(!channel.cancel(&call_id));

        let late = InboundMessage::from(json!({ "__cmpReturn": { "callId": call_id } }));
        assert!(!channel.handle_message(&late));
    }

    #[test]
    fn test_pending_table_is_bounded() {
        let (_frame, channel) = connected();
        for _ in 0..MAX_PENDING_CALLS {
            channel
                .call("ping", Value::Null, Box::new(|_, _| {}))
                .unwrap();
        }
        let err = channel
            .call("ping", Value::Null, Box::new(|_, _| {}))
            .unwrap_err();
        assert!(matches!(err, ConsentError::TooManyPendingCalls { max: 64, .. }));
    }
}
