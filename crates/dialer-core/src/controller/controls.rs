//! In-call controls and dialer inputs
//!
//! Mute, hold, recording and DTMF act on the live call leg; the destination
//! and customer setters feed the next call.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::call::{CallId, CallSession, CallStatus};
use crate::device::Connection;
use crate::dtmf::{is_valid_dial_string, sanitize_dtmf_input};
use crate::error::{DialerError, DialerResult};
use crate::events::SessionEvent;

use super::{CallSessionController, ControllerState};

/// Leg settings that can only change while the call is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InCallSetting {
    Hold,
    Recording,
}

impl InCallSetting {
    fn label(self) -> &'static str {
        match self {
            InCallSetting::Hold => "Hold",
            InCallSetting::Recording => "Recording",
        }
    }

    fn get(self, session: &CallSession) -> bool {
        match self {
            InCallSetting::Hold => session.is_on_hold,
            InCallSetting::Recording => session.is_recording,
        }
    }

    fn set(self, session: &mut CallSession, value: bool) {
        match self {
            InCallSetting::Hold => session.is_on_hold = value,
            InCallSetting::Recording => session.is_recording = value,
        }
    }

    fn changed(self, call_id: CallId, value: bool) -> SessionEvent {
        match self {
            InCallSetting::Hold => SessionEvent::HoldChanged {
                call_id,
                on_hold: value,
            },
            InCallSetting::Recording => SessionEvent::RecordingChanged {
                call_id,
                recording: value,
            },
        }
    }

    async fn instruct(self, connection: &dyn Connection, value: bool) -> DialerResult<()> {
        match self {
            InCallSetting::Hold => connection.hold(value).await,
            InCallSetting::Recording => connection.set_recording(value).await,
        }
    }
}

/// Call control operations
impl CallSessionController {
    /// Replace the dial string for the next call
    ///
    /// Accepts an optional leading `+` followed by up to 15 digits, `*` or
    /// `#`. An invalid value is rejected whole and the previous destination
    /// is kept.
    pub fn set_destination_number(&self, value: &str) -> DialerResult<()> {
        if !is_valid_dial_string(value) {
            debug!(value = value, "Rejecting invalid dial string");
            return Err(DialerError::InvalidDialString {
                value: value.to_string(),
            });
        }

        let mut state = self.inner.lock();
        state.session.destination_number = value.to_string();
        self.inner.publish(&state);
        Ok(())
    }

    /// Set the customer the next call is placed for
    pub fn set_customer_id(&self, customer_id: Option<String>) {
        let mut state = self.inner.lock();
        state.session.customer_id = customer_id;
        self.inner.publish(&state);
    }

    /// Flip the microphone mute on the live call leg
    ///
    /// Returns the resulting mute state. Without a call leg this does
    /// nothing and returns the current state. The session only changes once
    /// the leg accepted the instruction.
    pub async fn toggle_mute(&self) -> DialerResult<bool> {
        let Some((connection, call_id, epoch, muted)) =
            self.live_leg(|state| state.session.is_muted)
        else {
            debug!("No call leg to mute");
            return Ok(self.inner.lock().session.is_muted);
        };
        let target = !muted;

        if let Err(error) = connection.mute(target).await {
            warn!(call_id = %call_id, error = %error, "Mute instruction failed");
            self.record_control_error(epoch, &error);
            return Err(error);
        }

        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return Ok(state.session.is_muted);
        }
        state.session.is_muted = target;
        self.inner.emit(SessionEvent::MuteChanged {
            call_id,
            muted: target,
        });
        self.inner.publish(&state);
        info!(call_id = %call_id, muted = target, "Microphone mute changed");
        Ok(target)
    }

    /// Put the live call on hold, or take it off hold
    ///
    /// Only valid while the call is in progress. Returns the resulting hold
    /// state.
    pub async fn toggle_hold(&self) -> DialerResult<bool> {
        self.toggle_in_call(InCallSetting::Hold).await
    }

    /// Start or stop recording the live call
    ///
    /// Only valid while the call is in progress. Returns the resulting
    /// recording state; like hold, it only changes once the leg accepted the
    /// instruction and it is cleared when the call ends.
    pub async fn toggle_recording(&self) -> DialerResult<bool> {
        self.toggle_in_call(InCallSetting::Recording).await
    }

    /// Send DTMF tones on the live call
    ///
    /// Letters are translated through the keypad mapping and anything else
    /// that is not a DTMF symbol is dropped. Returns the digits actually
    /// sent; nothing is sent when none survive.
    pub async fn send_dtmf(&self, sequence: &str) -> DialerResult<String> {
        let (connection, call_id) = {
            let state = self.inner.lock();
            let in_progress = state.session.status == CallStatus::InProgress;
            match (&state.connection, state.session.active_connection) {
                (Some(connection), Some(call_id)) if in_progress => {
                    (Arc::clone(connection), call_id)
                }
                _ => {
                    return Err(DialerError::precondition(
                        "DTMF can only be sent during an active call",
                    ));
                }
            }
        };

        let digits = sanitize_dtmf_input(sequence);
        if digits.is_empty() {
            debug!(call_id = %call_id, input = sequence, "No DTMF symbols in input");
            return Ok(digits);
        }

        connection.send_digits(&digits).await.map_err(|error| {
            warn!(call_id = %call_id, error = %error, "DTMF send failed");
            error
        })?;

        self.inner.emit(SessionEvent::DtmfSent {
            call_id,
            digits: digits.clone(),
        });
        info!(call_id = %call_id, digits = %digits, "DTMF sent");
        Ok(digits)
    }

    async fn toggle_in_call(&self, setting: InCallSetting) -> DialerResult<bool> {
        let refused = || {
            DialerError::precondition(format!(
                "{} is only available during an active call",
                setting.label()
            ))
        };
        if self.session_status() != CallStatus::InProgress {
            return Err(refused());
        }
        let Some((connection, call_id, epoch, current)) =
            self.live_leg(|state| setting.get(&state.session))
        else {
            return Err(refused());
        };
        let target = !current;

        if let Err(error) = setting.instruct(connection.as_ref(), target).await {
            warn!(
                call_id = %call_id,
                setting = setting.label(),
                error = %error,
                "Call leg rejected the instruction"
            );
            self.record_control_error(epoch, &error);
            return Err(error);
        }

        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return Ok(setting.get(&state.session));
        }
        setting.set(&mut state.session, target);
        self.inner.emit(setting.changed(call_id, target));
        self.inner.publish(&state);
        info!(
            call_id = %call_id,
            setting = setting.label(),
            enabled = target,
            "Call setting changed"
        );
        Ok(target)
    }

    fn session_status(&self) -> CallStatus {
        self.inner.lock().session.status
    }

    /// Live call leg with its call id, epoch and a flag read under the same lock
    fn live_leg(
        &self,
        flag: impl FnOnce(&ControllerState) -> bool,
    ) -> Option<(Arc<dyn Connection>, CallId, u64, bool)> {
        let state = self.inner.lock();
        let connection = state.connection.as_ref()?;
        let call_id = state.session.active_connection?;
        Some((Arc::clone(connection), call_id, state.epoch, flag(&state)))
    }

    fn record_control_error(&self, epoch: u64, error: &DialerError) {
        let mut state = self.inner.lock();
        if state.epoch == epoch {
            self.inner.record_error(&mut state, error);
            self.inner.publish(&state);
        }
    }
}
