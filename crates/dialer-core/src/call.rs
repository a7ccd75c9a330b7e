//! Call session state
//!
//! [`CallSession`] is the single aggregate the controller mutates. Observers
//! only ever see cloned snapshots of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a call leg
pub type CallId = Uuid;

/// Lifecycle status of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallStatus {
    /// No call in flight (device may or may not be registered)
    Idle,
    /// Device registration in progress
    Registering,
    /// Call is being originated
    Connecting,
    /// Remote party is being alerted
    Ringing,
    /// Call accepted and media is flowing
    InProgress,
    /// Call was terminated by the remote side, the provider or the channel
    Ended,
    /// Registration or call failed, see `last_error`
    Error,
}

impl CallStatus {
    /// Check if a call leg is in flight
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CallStatus::Connecting | CallStatus::Ringing | CallStatus::InProgress
        )
    }

    /// Check if the session is in a terminal-for-the-call state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Error)
    }

    /// Check if a new call may be placed from this status
    pub fn can_dial(&self) -> bool {
        matches!(self, CallStatus::Idle | CallStatus::Ended | CallStatus::Error)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CallStatus::Idle => "idle",
            CallStatus::Registering => "registering",
            CallStatus::Connecting => "connecting",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Ended => "ended",
            CallStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Who said a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    Agent,
    Customer,
}

impl Speaker {
    /// Map a speaker label from the signaling channel
    ///
    /// Only the exact label `"Agent"` is the agent; every other label is the
    /// customer side of the call.
    pub fn from_label(label: &str) -> Self {
        if label == "Agent" {
            Speaker::Agent
        } else {
            Speaker::Customer
        }
    }
}

/// One line of the live transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub speaker: Speaker,
    pub text: String,
}

impl TranscriptMessage {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }
}

/// Snapshot of the controller's single call session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    /// Current lifecycle status
    pub status: CallStatus,
    /// Whether a telephony device is registered
    pub device_registered: bool,
    /// Call leg in flight; set iff `status.is_active()`
    pub active_connection: Option<CallId>,
    /// Dial string being composed or dialed
    pub destination_number: String,
    /// Customer the next call is placed for
    pub customer_id: Option<String>,
    /// Live transcript, append-only for the duration of a call
    pub transcript: Vec<TranscriptMessage>,
    /// Mirrors the last successful mute instruction
    pub is_muted: bool,
    /// Mirrors the last successful hold instruction
    pub is_on_hold: bool,
    /// Mirrors the last successful recording instruction
    pub is_recording: bool,
    /// Seconds spent in `InProgress`
    pub duration_seconds: u64,
    /// Stream identifier of the signaling channel for the current call
    pub signaling_stream_id: Option<String>,
    /// Last human-readable failure
    pub last_error: Option<String>,
    /// When the current call was dialed
    pub started_at: Option<DateTime<Utc>>,
    /// When the current call was accepted
    pub connected_at: Option<DateTime<Utc>>,
    /// When the current call was torn down
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallSession {
    /// Fresh idle session with no device
    pub fn new() -> Self {
        Self {
            status: CallStatus::Idle,
            device_registered: false,
            active_connection: None,
            destination_number: String::new(),
            customer_id: None,
            transcript: Vec::new(),
            is_muted: false,
            is_on_hold: false,
            is_recording: false,
            duration_seconds: 0,
            signaling_stream_id: None,
            last_error: None,
            started_at: None,
            connected_at: None,
            ended_at: None,
        }
    }

    /// Check the connection/status invariant
    pub fn is_consistent(&self) -> bool {
        self.active_connection.is_some() == self.status.is_active()
    }

    /// Clear per-call fields ahead of a new call
    ///
    /// Device registration, the destination and the customer survive.
    pub(crate) fn reset_for_new_call(&mut self) {
        self.transcript.clear();
        self.duration_seconds = 0;
        self.last_error = None;
        self.signaling_stream_id = None;
        self.is_muted = false;
        self.is_on_hold = false;
        self.is_recording = false;
        self.started_at = None;
        self.connected_at = None;
        self.ended_at = None;
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_statuses() {
        assert!(CallStatus::Connecting.is_active());
        assert!(CallStatus::Ringing.is_active());
        assert!(CallStatus::InProgress.is_active());
        assert!(!CallStatus::Idle.is_active());
        assert!(!CallStatus::Ended.is_active());
        assert!(!CallStatus::Error.is_active());
        assert!(!CallStatus::Registering.is_active());
    }

    #[test]
    fn test_dialable_statuses() {
        assert!(CallStatus::Idle.can_dial());
        assert!(CallStatus::Ended.can_dial());
        assert!(CallStatus::Error.can_dial());
        assert!(!CallStatus::Registering.can_dial());
        assert!(!CallStatus::InProgress.can_dial());
    }

    #[test]
    fn test_speaker_labels() {
        assert_eq!(Speaker::from_label("Agent"), Speaker::Agent);
        assert_eq!(Speaker::from_label("Customer"), Speaker::Customer);
        assert_eq!(Speaker::from_label("agent"), Speaker::Customer);
        assert_eq!(Speaker::from_label(""), Speaker::Customer);
    }

    #[test]
    fn test_new_session_is_idle_and_consistent() {
        let session = CallSession::new();
        assert_eq!(session.status, CallStatus::Idle);
        assert!(!session.device_registered);
        assert!(session.is_consistent());
    }

    #[test]
    fn test_reset_keeps_dial_context() {
        let mut session = CallSession::new();
        session.destination_number = "+15551234".to_string();
        session.device_registered = true;
        session.transcript.push(TranscriptMessage::new(Speaker::Agent, "hello"));
        session.duration_seconds = 42;
        session.last_error = Some("boom".to_string());
        session.is_on_hold = true;
        session.is_recording = true;

        session.reset_for_new_call();

        assert_eq!(session.destination_number, "+15551234");
        assert!(session.device_registered);
        assert!(session.transcript.is_empty());
        assert_eq!(session.duration_seconds, 0);
        assert!(session.last_error.is_none());
        assert!(!session.is_on_hold);
        assert!(!session.is_recording);
    }
}
