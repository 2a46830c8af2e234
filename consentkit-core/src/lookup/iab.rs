//! IAB CMP 1.1 lookup.
//!
//! When the CMP API is reachable directly it is called in place. Otherwise
//! the CMP frame is located once and `getVendorConsents` travels over a
//! [`FrameChannel`]. The host feeds window messages to
//! [`IabLookup::handle_message`], which acts as the single message listener.

use std::sync::{Arc, OnceLock};

use serde_json::Value;

use super::ConsentLookup;
use crate::gate::LookupResponder;
use crate::rpc::{CmpFrame, CmpSurface, FrameChannel, InboundMessage};

/// Registry key of the IAB strategy.
pub const IAB_PLATFORM_ID: &str = "iab";

const GET_VENDOR_CONSENTS: &str = "getVendorConsents";

/// Consent lookup against an IAB-compliant CMP.
pub struct IabLookup {
    window: Arc<dyn CmpFrame>,
    direct: Option<Arc<dyn CmpSurface>>,
    channel: OnceLock<Arc<FrameChannel>>,
}

impl IabLookup {
    /// Creates a lookup that reaches the CMP through frames, starting at `window`.
    #[must_use]
    pub fn new(window: Arc<dyn CmpFrame>) -> Self {
        Self {
            window,
            direct: None,
            channel: OnceLock::new(),
        }
    }

    /// Uses `surface` instead of frame messaging.
    #[must_use]
    pub fn with_direct_surface(mut self, surface: Arc<dyn CmpSurface>) -> Self {
        self.direct = Some(surface);
        self
    }

    /// Routes a window message to the frame channel.
    ///
    /// Returns whether the message answered a pending call. Messages seen
    /// before the first frame lookup are ignored.
    pub fn handle_message(&self, message: &InboundMessage) -> bool {
        self.channel
            .get()
            .is_some_and(|channel| channel.handle_message(message))
    }

    /// Number of frame calls still waiting for an answer.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.channel.get().map_or(0, |channel| channel.pending_calls())
    }

    fn channel(&self) -> Arc<FrameChannel> {
        Arc::clone(
            self.channel
                .get_or_init(|| Arc::new(FrameChannel::connect(Arc::clone(&self.window)))),
        )
    }
}

impl ConsentLookup for IabLookup {
    fn lookup(&self, responder: LookupResponder) {
        if let Some(surface) = &self.direct {
            surface.call(
                GET_VENDOR_CONSENTS,
                Value::Null,
                Box::new(move |value, _success| {
                    responder.success(value);
                }),
            );
            return;
        }

        let channel = self.channel();
        let on_answer = responder.clone();
        let call = channel.call(
            GET_VENDOR_CONSENTS,
            Value::Null,
            Box::new(move |value, success| {
                if !success {
                    log::debug!("CMP reported getVendorConsents as unsuccessful");
                }
                on_answer.success(value);
            }),
        );

        match call {
            // An unanswered call must not outlive its pass.
            Ok(call_id) => responder.on_settle(move || {
                if channel.cancel(&call_id) {
                    log::debug!("dropped unanswered CMP call {call_id}");
                }
            }),
            Err(err) => {
                responder.fail(err);
            }
        }
    }
}
