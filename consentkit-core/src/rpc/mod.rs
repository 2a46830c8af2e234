//! Cross-frame RPC to an IAB CMP.
//!
//! A CMP usually runs in the top window and declares a `__cmpLocator` child
//! frame. Code embedded in a nested, possibly cross-origin frame finds the
//! CMP window by walking up the hierarchy, then talks to it with
//! `postMessage`. Calls and answers are correlated by a per-call id.

mod channel;
mod frame;
mod wire;

pub use channel::{FrameChannel, MAX_PENDING_CALLS};
pub use frame::{locate_cmp_frame, CmpCallback, CmpFrame, CmpSurface, FrameError, CMP_LOCATOR_NAME};
pub use wire::{CmpCall, CmpCallEnvelope, CmpReturn, CmpReturnEnvelope, InboundMessage, RETURN_MARKER};
