//! Dialer-core: call session controller for agent softphones
//!
//! This crate owns the single call session of a call-center agent's dialer
//! screen: it registers a telephony device, originates calls through the
//! backend, follows the live transcript over a signaling channel, and
//! exposes in-call controls.
//!
//! ## Collaborators
//! ```text
//! dialer UI -> dialer-core -> BackendClient      (REST)
//!                           -> DeviceFactory      (softphone SDK)
//!                           -> SignalingConnector (WebSocket)
//! ```
//!
//! Dialer-core focuses on:
//! - The call lifecycle state machine and its invariants
//! - Discarding late async results once a call has moved on
//! - Snapshot and event streams for UI integration
//! - Dial string and DTMF input handling
//!
//! The softphone SDK binding is supplied by the host through
//! [`DeviceFactory`]; REST and WebSocket implementations of the other two
//! seams ship with the crate.

pub mod backend;
pub mod call;
pub mod controller;
pub mod device;
pub mod dtmf;
pub mod error;
pub mod events;
pub mod format;
pub mod signaling;

// Public API exports
pub use backend::{BackendClient, CallNotes, HttpBackendClient, OriginateResponse};
pub use call::{CallId, CallSession, CallStatus, Speaker, TranscriptMessage};
pub use controller::{
    CallSessionController, DialerConfig, DialerControllerBuilder, SessionCredential,
};
pub use device::{
    CallLeg, CallParams, Codec, Connection, ConnectionEvent, Device, DeviceEvent, DeviceFactory,
    DeviceHandle, DeviceOptions,
};
pub use error::{DialerError, DialerResult};
pub use events::{EventPriority, SessionEvent};
pub use signaling::{
    SignalingChannel, SignalingCloser, SignalingConnector, SignalingEvent, WsSignalingConnector,
};

/// Dialer-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
