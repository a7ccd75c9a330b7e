//! Events published to session observers
//!
//! Besides the latest [`CallSession`](crate::CallSession) snapshot (a `watch`
//! channel), the controller broadcasts discrete [`SessionEvent`]s so UI
//! components can react to individual changes such as a new transcript line.

use chrono::{DateTime, Utc};

use crate::call::{CallId, CallStatus, TranscriptMessage};
use crate::error::DialerError;

/// Event priority levels for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Routine updates (duration ticks)
    Low,
    /// State changes, transcript lines, control acknowledgements
    Normal,
    /// Incoming calls and errors
    High,
}

/// Discrete change in the call session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Session status changed
    StatusChanged {
        call_id: Option<CallId>,
        previous: CallStatus,
        current: CallStatus,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A transcript line was appended at `index`
    TranscriptAppended {
        call_id: CallId,
        index: usize,
        message: TranscriptMessage,
    },
    /// Microphone mute state changed
    MuteChanged { call_id: CallId, muted: bool },
    /// Hold state changed
    HoldChanged { call_id: CallId, on_hold: bool },
    /// Call recording started or stopped
    RecordingChanged { call_id: CallId, recording: bool },
    /// DTMF digits were sent on the active call
    DtmfSent { call_id: CallId, digits: String },
    /// The in-progress duration counter advanced
    DurationTick { call_id: CallId, seconds: u64 },
    /// The device reported an incoming call; it is not answered
    IncomingCall {
        from: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A failure was recorded in `last_error`
    Error {
        error: DialerError,
        call_id: Option<CallId>,
    },
}

impl SessionEvent {
    pub(crate) fn status_changed(
        call_id: Option<CallId>,
        previous: CallStatus,
        current: CallStatus,
        reason: Option<String>,
    ) -> Self {
        SessionEvent::StatusChanged {
            call_id,
            previous,
            current,
            reason,
            timestamp: Utc::now(),
        }
    }

    /// Get the priority of this event
    pub fn priority(&self) -> EventPriority {
        match self {
            SessionEvent::DurationTick { .. } => EventPriority::Low,
            SessionEvent::IncomingCall { .. } | SessionEvent::Error { .. } => EventPriority::High,
            _ => EventPriority::Normal,
        }
    }

    /// Get the call ID associated with this event (if any)
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            SessionEvent::StatusChanged { call_id, .. } => *call_id,
            SessionEvent::TranscriptAppended { call_id, .. }
            | SessionEvent::MuteChanged { call_id, .. }
            | SessionEvent::HoldChanged { call_id, .. }
            | SessionEvent::RecordingChanged { call_id, .. }
            | SessionEvent::DtmfSent { call_id, .. }
            | SessionEvent::DurationTick { call_id, .. } => Some(*call_id),
            SessionEvent::Error { call_id, .. } => *call_id,
            SessionEvent::IncomingCall { .. } => None,
        }
    }
}
