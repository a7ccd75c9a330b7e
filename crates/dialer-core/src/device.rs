//! Telephony device abstraction
//!
//! The softphone endpoint comes from a vendor SDK. The controller only needs
//! a narrow capability set: create a device from a capability token, register
//! it, place a call leg, and control that leg. SDK callbacks arrive as events
//! on unbounded channels handed out next to each handle.
//!
//! Hosts implement [`DeviceFactory`], [`Device`] and [`Connection`] over their
//! SDK binding; tests implement them in memory.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::DialerResult;

/// Audio codec offered at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Codec {
    Opus,
    Pcmu,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Opus => "opus",
            Codec::Pcmu => "pcmu",
        }
    }
}

/// Codec preference order used for every registration
pub const CODEC_PREFERENCES: [Codec; 2] = [Codec::Opus, Codec::Pcmu];

/// Options a device is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOptions {
    /// Identity the capability token was issued for
    pub identity: String,
    /// Codecs in preference order
    pub codec_preferences: Vec<Codec>,
}

impl DeviceOptions {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            codec_preferences: CODEC_PREFERENCES.to_vec(),
        }
    }
}

/// Parameters for placing an outbound call leg
///
/// Carries the same destination and caller metadata that is sent to the
/// backend when the call is originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallParams {
    pub to: String,
    pub agent_name: String,
    pub agent_id: String,
    pub supervisor_id: Option<String>,
    pub supervisor_name: Option<String>,
    pub customer_id: Option<String>,
    pub organisation_id: Option<String>,
    pub domain: Option<String>,
    pub processes: Vec<String>,
}

/// Events raised by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Registration with the provider completed
    Registered,
    /// Device-level failure
    Error(String),
    /// Someone is calling this endpoint
    Incoming { from: Option<String> },
}

/// Events raised by a call leg
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The far end is being alerted
    Ringing,
    /// The call was answered
    Accepted,
    /// The leg is gone, whichever side hung up
    Disconnected,
    /// Leg-level failure
    Error(String),
}

/// A registered softphone endpoint
#[async_trait]
pub trait Device: Send + Sync {
    /// Issue registration; completion is reported as [`DeviceEvent::Registered`]
    async fn register(&self) -> DialerResult<()>;

    /// Place an outbound call leg
    async fn connect(&self, params: &CallParams) -> DialerResult<CallLeg>;

    /// Unregister and release the endpoint
    async fn destroy(&self);
}

/// A single call leg placed by a [`Device`]
#[async_trait]
pub trait Connection: Send + Sync {
    async fn mute(&self, muted: bool) -> DialerResult<()>;

    async fn hold(&self, on_hold: bool) -> DialerResult<()>;

    /// Start or stop recording the leg
    async fn set_recording(&self, recording: bool) -> DialerResult<()>;

    async fn send_digits(&self, digits: &str) -> DialerResult<()>;

    /// Hang up; must be harmless on an already disconnected leg
    async fn disconnect(&self);
}

/// Creates devices from capability tokens
#[async_trait]
pub trait DeviceFactory: Send + Sync {
    async fn create(&self, token: &str, options: &DeviceOptions) -> DialerResult<DeviceHandle>;
}

/// A device together with its event stream
pub struct DeviceHandle {
    pub device: Arc<dyn Device>,
    pub events: mpsc::UnboundedReceiver<DeviceEvent>,
}

/// A call leg together with its event stream
pub struct CallLeg {
    pub connection: Arc<dyn Connection>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
}
