use thiserror::Error;

/// Error outputs from `ConsentKit`.
///
/// Every variant except [`ConsentError::InvalidConfig`] is a terminal outcome
/// of one gate pass. What happens next depends on
/// [`crate::GateConfig::allow_without_consent`].
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum ConsentError {
    /// No frame in the embedding hierarchy exposes the CMP locator.
    #[error("CMP not found")]
    CmpNotFound,
    /// The CMP answered with something that is not a usable consent object.
    #[error("CMP returned unexpected value during lookup process; returned value was ({received}).")]
    UnexpectedResponse {
        /// JSON rendering of the value the CMP returned.
        received: String,
    },
    /// The CMP did not answer within the configured timeout.
    #[error("CMP workflow exceeded timeout threshold.")]
    Timeout,
    /// The lookup strategy reported an explicit error.
    #[error("{reason}")]
    Platform {
        /// Message supplied by the strategy.
        reason: String,
    },
    /// Too many CMP calls are awaiting a response.
    #[error("too many pending CMP calls: {count} >= {max}")]
    TooManyPendingCalls {
        /// Calls currently in flight.
        count: u64,
        /// Maximum number of calls allowed in flight.
        max: u64,
    },
    /// A frame refused to deliver a message.
    #[error("failed to post CMP message: {error}")]
    PostMessage {
        /// Reason reported by the frame.
        error: String,
    },
    /// Unexpected error serializing information.
    #[error("serialization_error: {error}")]
    SerializationError {
        /// Serializer message.
        error: String,
    },
    /// The configuration supplied by the host is not usable.
    #[error("invalid_config: {error}")]
    InvalidConfig {
        /// Description of the problem.
        error: String,
    },
}

impl From<serde_json::Error> for ConsentError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError {
            error: error.to_string(),
        }
    }
}
