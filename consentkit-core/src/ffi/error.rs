use thiserror::Error;

/// Errors raised by host-implemented platform traits.
#[derive(Debug, Error, uniffi::Error)]
pub enum PlatformError {
    /// The host could not access or message a frame.
    #[error("frame error: {0}")]
    Frame(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for PlatformError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}
