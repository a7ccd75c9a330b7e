//! Error types and handling for the dialer-core library
//!
//! Every failure the call session controller can surface is a [`DialerError`].
//! None of them is fatal: any error state can be left by retrying
//! `initialize_device()` or `initiate_call()`.
//!
//! # Error Categories
//!
//! - **Precondition** - operation invoked in the wrong state (no device, empty
//!   destination, no active call). Rejected locally, never retried.
//! - **Transport** - backend/network failure while fetching a capability token
//!   or originating a call. Surfaced, the session moves to `Error`.
//! - **Device** - registration or call-leg failure reported by the telephony SDK.
//! - **Signaling** - the real-time channel could not be opened or failed.
//! - **Configuration** - invalid settings or a missing session credential.
//!
//! # Handling Pattern
//!
//! ```rust,no_run
//! # use dialer_core::{CallSessionController, DialerError};
//! # async fn example(controller: CallSessionController) {
//! match controller.initiate_call().await {
//!     Ok(()) => {}
//!     Err(DialerError::Precondition { reason }) => {
//!         eprintln!("Cannot dial yet: {}", reason);
//!     }
//!     Err(e) if e.is_recoverable() => {
//!         eprintln!("Temporary failure ({}), try again: {}", e.category(), e);
//!     }
//!     Err(e) => eprintln!("Call failed: {}", e),
//! }
//! # }
//! ```

use thiserror::Error;

/// Result type alias for dialer-core operations
pub type DialerResult<T> = Result<T, DialerError>;

/// Errors raised by the call session controller and its adapters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialerError {
    /// Operation invoked while the session is in the wrong state
    #[error("{reason}")]
    Precondition { reason: String },

    #[error("Invalid dial string: {value:?}")]
    InvalidDialString { value: String },

    #[error("No session credential available")]
    MissingCredential,

    /// Backend or network failure
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// Backend answered with a body that could not be decoded
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    /// Failure reported by the telephony device or one of its call legs
    #[error("Device error: {reason}")]
    Device { reason: String },

    #[error("Signaling error: {reason}")]
    Signaling { reason: String },

    #[error("Operation timeout after {duration_ms}ms")]
    OperationTimeout { duration_ms: u64 },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },
}

impl DialerError {
    /// Create a precondition error
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition { reason: reason.into() }
    }

    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport { reason: reason.into() }
    }

    /// Create a protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol { reason: reason.into() }
    }

    /// Create a device error
    pub fn device(reason: impl Into<String>) -> Self {
        Self::Device { reason: reason.into() }
    }

    /// Create a signaling error
    pub fn signaling(reason: impl Into<String>) -> Self {
        Self::Signaling { reason: reason.into() }
    }

    /// Create a configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if retrying the same operation may succeed without changing anything
    pub fn is_recoverable(&self) -> bool {
        match self {
            DialerError::Transport { .. }
            | DialerError::Device { .. }
            | DialerError::Signaling { .. }
            | DialerError::OperationTimeout { .. } => true,

            DialerError::Precondition { .. }
            | DialerError::InvalidDialString { .. }
            | DialerError::MissingCredential
            | DialerError::AuthenticationFailed { .. }
            | DialerError::Protocol { .. }
            | DialerError::InvalidConfiguration { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            DialerError::Precondition { .. } | DialerError::InvalidDialString { .. } => {
                "precondition"
            }

            DialerError::Transport { .. }
            | DialerError::AuthenticationFailed { .. }
            | DialerError::Protocol { .. }
            | DialerError::OperationTimeout { .. } => "transport",

            DialerError::Device { .. } => "device",

            DialerError::Signaling { .. } => "signaling",

            DialerError::MissingCredential | DialerError::InvalidConfiguration { .. } => {
                "configuration"
            }
        }
    }
}
