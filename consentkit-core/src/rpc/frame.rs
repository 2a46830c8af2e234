//! Frame hierarchy access and the direct CMP call surface.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Name of the child frame a CMP declares so embedded code can find it.
pub const CMP_LOCATOR_NAME: &str = "__cmpLocator";

/// Failure touching a frame, typically a cross-origin access error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("frame access failed: {0}")]
pub struct FrameError(pub String);

/// One window in the embedding hierarchy.
pub trait CmpFrame: Send + Sync {
    /// Whether this window has a child frame called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be inspected from the caller's origin.
    fn has_locator(&self, name: &str) -> Result<bool, FrameError>;

    /// The parent window, or `None` for the top window.
    fn parent(&self) -> Option<Arc<dyn CmpFrame>>;

    /// Posts `message` to this window.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be delivered.
    fn post_message(&self, message: &Value, target_origin: &str) -> Result<(), FrameError>;
}

/// Callback receiving `(returnValue, success)` from a CMP.
pub type CmpCallback = Box<dyn FnOnce(Value, bool) + Send>;

/// A CMP API reachable in the current context without messaging (`__cmp`).
pub trait CmpSurface: Send + Sync {
    /// Invokes `command` and eventually calls `callback` with the result.
    fn call(&self, command: &str, parameter: Value, callback: CmpCallback);
}

/// Walks from `start` up to the top window and returns the first window that
/// can see the CMP locator frame, `start` included.
#[must_use]
pub fn locate_cmp_frame(start: Arc<dyn CmpFrame>) -> Option<Arc<dyn CmpFrame>> {
    let mut frame = start;
    loop {
        match frame.has_locator(CMP_LOCATOR_NAME) {
            Ok(true) => return Some(frame),
            Ok(false) => {}
            Err(err) => log::debug!("skipping frame while locating CMP: {err}"),
        }
        frame = frame.parent()?;
    }
}
