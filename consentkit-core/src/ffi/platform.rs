//! Host-implemented window and CMP access, bridged to the core traits.
//!
//! Values cross the FFI boundary as JSON text.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use super::error::PlatformError;
use crate::error::ConsentError;
use crate::rpc::{CmpCallback, CmpFrame, CmpSurface, FrameError};

/// A browser window (or webview frame) as seen from the host.
#[uniffi::export(with_foreign)]
pub trait ForeignFrame: Send + Sync {
    /// Whether this window has a child frame called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the window is not accessible from the caller's origin.
    fn has_locator(&self, name: String) -> Result<bool, PlatformError>;

    /// The parent window; `None` for the top window.
    fn parent(&self) -> Option<Arc<dyn ForeignFrame>>;

    /// Posts a JSON-encoded message to this window.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be posted.
    fn post_message(&self, message_json: String, target_origin: String) -> Result<(), PlatformError>;
}

/// A CMP API callable in place (`window.__cmp`).
#[uniffi::export(with_foreign)]
pub trait ForeignCmpSurface: Send + Sync {
    /// Invokes `command`; the result must be passed to `responder`.
    fn call(&self, command: String, parameter_json: String, responder: Arc<CmpResponder>);
}

/// One-shot answer slot handed to a [`ForeignCmpSurface`].
#[derive(uniffi::Object)]
pub struct CmpResponder {
    callback: Mutex<Option<CmpCallback>>,
}

#[uniffi::export]
impl CmpResponder {
    /// Delivers the CMP's return value. Returns `false` if an answer was
    /// already delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if `return_value_json` is not valid JSON.
    pub fn respond(&self, return_value_json: String, success: bool) -> Result<bool, ConsentError> {
        let value: Value = serde_json::from_str(&return_value_json)?;
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(callback.is_some_and(|callback| {
            callback(value, success);
            true
        }))
    }
}

pub(super) struct FrameAdapter(pub(super) Arc<dyn ForeignFrame>);

impl CmpFrame for FrameAdapter {
    fn has_locator(&self, name: &str) -> Result<bool, FrameError> {
        self.0
            .has_locator(name.to_string())
            .map_err(|err| FrameError(err.to_string()))
    }

    fn parent(&self) -> Option<Arc<dyn CmpFrame>> {
        self.0
            .parent()
            .map(|parent| Arc::new(Self(parent)) as Arc<dyn CmpFrame>)
    }

    fn post_message(&self, message: &Value, target_origin: &str) -> Result<(), FrameError> {
        self.0
            .post_message(message.to_string(), target_origin.to_string())
            .map_err(|err| FrameError(err.to_string()))
    }
}

pub(super) struct SurfaceAdapter(pub(super) Arc<dyn ForeignCmpSurface>);

impl CmpSurface for SurfaceAdapter {
    fn call(&self, command: &str, parameter: Value, callback: CmpCallback) {
        let responder = Arc::new(CmpResponder {
            callback: Mutex::new(Some(callback)),
        });
        self.0
            .call(command.to_string(), parameter.to_string(), responder);
    }
}
