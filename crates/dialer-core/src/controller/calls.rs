//! Device and call lifecycle operations
//!
//! Registration, dialing, teardown, and the background tasks that feed
//! device, call leg and signaling events back into the session.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::call::{CallId, CallStatus};
use crate::device::{CallLeg, ConnectionEvent, Device, DeviceEvent, DeviceHandle, DeviceOptions};
use crate::error::{DialerError, DialerResult};
use crate::events::SessionEvent;
use crate::signaling::{stream_id_from_url, SignalingChannel, SignalingEvent};

use super::config::SessionCredential;
use super::recovery::with_timeout;
use super::{CallSessionController, ControllerInner};

/// Call lifecycle operations
impl CallSessionController {
    /// Register a telephony device for the logged-in agent
    ///
    /// Fetches a capability token, creates the device with the codec
    /// preferences, and waits for the provider to confirm registration. On
    /// success the session returns to `Idle` with `device_registered` set; on
    /// failure it lands in `Error` with `last_error` filled in, and the call
    /// may simply be repeated.
    ///
    /// Calling this with a device already registered is a no-op.
    ///
    /// Callers that only render the session may ignore the returned result:
    /// every failure is also recorded in `last_error` and the `Error` status,
    /// so the snapshot alone tells the outcome. A device whose registration
    /// completes after [`teardown_device`](Self::teardown_device) is destroyed
    /// and `Ok` is returned.
    pub async fn initialize_device(&self) -> DialerResult<()> {
        let inner = &self.inner;

        let (credential, device_epoch) = {
            let mut state = inner.lock();
            if state.device.is_some() {
                debug!("Device already registered");
                return Ok(());
            }
            if state.session.status == CallStatus::Registering {
                return Err(DialerError::precondition("Device registration already in progress"));
            }

            let credential = match &inner.credential {
                Some(credential) => credential.clone(),
                None => {
                    let error = DialerError::MissingCredential;
                    inner.record_error(&mut state, &error);
                    inner.transition(&mut state, CallStatus::Error, Some(error.to_string()));
                    inner.publish(&state);
                    warn!("Cannot register a device without a logged-in agent");
                    return Err(error);
                }
            };

            state.session.last_error = None;
            inner.transition(&mut state, CallStatus::Registering, None);
            inner.publish(&state);
            (credential, state.device_epoch)
        };

        info!(identity = %credential.identity, "Registering telephony device");

        match inner.register_device(&credential).await {
            Ok(DeviceHandle { device, events }) => {
                let attached = {
                    let mut state = inner.lock();
                    if state.device_epoch == device_epoch {
                        state.device = Some(Arc::clone(&device));
                        state.session.device_registered = true;
                        let listener = ControllerInner::run_device_listener(
                            Arc::clone(inner),
                            device_epoch,
                            events,
                        );
                        state.device_listener = Some(tokio::spawn(listener));
                        inner.transition(&mut state, CallStatus::Idle, None);
                        inner.publish(&state);
                        true
                    } else {
                        false
                    }
                };

                if attached {
                    info!(identity = %credential.identity, "Telephony device registered");
                } else {
                    debug!("Device torn down during registration; discarding it");
                    device.destroy().await;
                }
                Ok(())
            }
            Err(error) => {
                warn!(
                    identity = %credential.identity,
                    error = %error,
                    "Device registration failed"
                );
                let mut state = inner.lock();
                if state.device_epoch == device_epoch {
                    inner.record_error(&mut state, &error);
                    inner.transition(&mut state, CallStatus::Error, Some(error.to_string()));
                    inner.publish(&state);
                }
                Err(error)
            }
        }
    }

    /// Place a call to the current destination
    ///
    /// Requires a registered device, a non-empty destination and no call in
    /// flight; a failed precondition is reported both as the returned error
    /// and in `last_error`, and the status is left alone.
    ///
    /// The call is originated server-side first. The response names the
    /// signaling channel, which is opened before the device places the call
    /// leg. Returning `Ok` means the leg was placed: progress (ringing,
    /// answer, hang-up) arrives asynchronously through the session.
    ///
    /// If the call is ended while any of these steps is pending, the late
    /// result is released and discarded, and `Ok` is returned.
    pub async fn initiate_call(&self) -> DialerResult<()> {
        let inner = &self.inner;

        let (epoch, call_id, device, params) = {
            let mut state = inner.lock();

            let refusal = if state.device.is_none() {
                Some("No telephony device registered")
            } else if state.session.destination_number.is_empty() {
                Some("Enter a number to dial")
            } else if !state.session.status.can_dial() {
                Some("A call is already in progress")
            } else {
                None
            };
            if let Some(reason) = refusal {
                let error = DialerError::precondition(reason);
                inner.record_error(&mut state, &error);
                inner.publish(&state);
                debug!(status = %state.session.status, reason = reason, "Refusing to dial");
                return Err(error);
            }

            let (Some(device), Some(credential)) =
                (state.device.clone(), inner.credential.as_ref())
            else {
                return Err(DialerError::MissingCredential);
            };
            let params = credential.call_params(
                state.session.destination_number.clone(),
                state.session.customer_id.clone(),
            );

            state.epoch += 1;
            let call_id = Uuid::new_v4();
            state.session.reset_for_new_call();
            state.session.active_connection = Some(call_id);
            state.session.started_at = Some(Utc::now());
            inner.transition(&mut state, CallStatus::Connecting, None);
            inner.publish(&state);

            (state.epoch, call_id, device, params)
        };

        info!(call_id = %call_id, to = %params.to, "Placing call");

        // Server-side origination
        let origination = with_timeout(
            "call origination",
            inner.config.request_timeout(),
            inner.backend.originate_call(&params),
        )
        .await;
        if !inner.is_current(epoch) {
            debug!(call_id = %call_id, "Discarding origination result for an ended call");
            return Ok(());
        }
        let response = match origination {
            Ok(response) => response,
            Err(error) => return Err(inner.fail_call(epoch, error).await),
        };

        let url = match response.frontend_url.filter(|url| !url.trim().is_empty()) {
            Some(url) => url,
            None => {
                let error = DialerError::protocol("Call origination returned no signaling URL");
                return Err(inner.fail_call(epoch, error).await);
            }
        };

        // Signaling channel
        let opened = with_timeout(
            "signaling open",
            inner.config.request_timeout(),
            inner.signaling.open(&url),
        )
        .await;
        let SignalingChannel { events, closer } = match opened {
            Ok(channel) => channel,
            Err(error) if inner.is_current(epoch) => {
                return Err(inner.fail_call(epoch, error).await);
            }
            Err(_) => return Ok(()),
        };
        {
            let mut state = inner.lock();
            if state.epoch != epoch {
                drop(state);
                debug!(call_id = %call_id, "Closing signaling channel for an ended call");
                closer.close();
                return Ok(());
            }
            state.session.signaling_stream_id = stream_id_from_url(&url);
            state.signaling = Some(closer);
            inner.publish(&state);
            debug!(
                call_id = %call_id,
                stream_id = ?state.session.signaling_stream_id,
                "Signaling channel attached"
            );
        }
        tokio::spawn(ControllerInner::run_signaling_pump(
            Arc::clone(inner),
            epoch,
            call_id,
            events,
        ));

        // Call leg
        let placed = with_timeout(
            "device connect",
            inner.config.request_timeout(),
            device.connect(&params),
        )
        .await;
        let CallLeg { connection, events } = match placed {
            Ok(leg) => leg,
            Err(error) if inner.is_current(epoch) => {
                return Err(inner.fail_call(epoch, error).await);
            }
            Err(_) => return Ok(()),
        };
        let attached = {
            let mut state = inner.lock();
            if state.epoch == epoch {
                state.connection = Some(Arc::clone(&connection));
                true
            } else {
                false
            }
        };
        if !attached {
            debug!(call_id = %call_id, "Hanging up a call leg placed after the call ended");
            connection.disconnect().await;
            return Ok(());
        }
        tokio::spawn(ControllerInner::run_connection_pump(
            Arc::clone(inner),
            epoch,
            call_id,
            events,
        ));

        info!(call_id = %call_id, "Call leg placed");
        Ok(())
    }

    /// Hang up and reset to an idle session
    ///
    /// Safe from any status and safe to repeat. The ticker is stopped, the
    /// call leg disconnected and the signaling channel closed; the transcript
    /// and duration remain readable until the next call starts.
    pub async fn end_call(&self) {
        let inner = &self.inner;

        let released = {
            let mut state = inner.lock();
            let status = state.session.status;
            let holds_call = state.connection.is_some()
                || state.signaling.is_some()
                || state.ticker.is_some();

            if !status.is_active() && !status.is_terminal() && !holds_call {
                debug!(status = %status, "No call to end");
                return;
            }

            if let Some(call_id) = ControllerInner::active_call_id(&state) {
                info!(call_id = %call_id, status = %status, "Ending call");
            }
            inner.transition(&mut state, CallStatus::Idle, Some("Ended by agent".to_string()));
            let released = inner.release_call(&mut state);
            inner.publish(&state);
            released
        };

        released.release().await;
    }

    /// End any call, then unregister and drop the device
    pub async fn teardown_device(&self) {
        self.end_call().await;

        let device = {
            let mut state = self.inner.lock();
            state.device_epoch += 1;
            if let Some(listener) = state.device_listener.take() {
                listener.abort();
            }
            state.session.device_registered = false;
            if state.session.status == CallStatus::Registering {
                let reason = Some("Device torn down".to_string());
                self.inner.transition(&mut state, CallStatus::Idle, reason);
            }
            self.inner.publish(&state);
            state.device.take()
        };

        if let Some(device) = device {
            device.destroy().await;
            info!("Telephony device destroyed");
        }
    }
}

impl ControllerInner {
    /// Token, create, register; the device is destroyed again on failure
    async fn register_device(&self, credential: &SessionCredential) -> DialerResult<DeviceHandle> {
        let token = with_timeout(
            "capability token",
            self.config.request_timeout(),
            self.backend.fetch_capability_token(&credential.identity),
        )
        .await?;

        let options = DeviceOptions::new(credential.identity.clone());
        let DeviceHandle { device, mut events } = self.devices.create(&token, &options).await?;

        let registered = with_timeout(
            "device registration",
            self.config.registration_timeout(),
            Self::await_registration(device.as_ref(), &mut events),
        )
        .await;

        match registered {
            Ok(()) => Ok(DeviceHandle { device, events }),
            Err(error) => {
                device.destroy().await;
                Err(error)
            }
        }
    }

    async fn await_registration(
        device: &dyn Device,
        events: &mut mpsc::UnboundedReceiver<DeviceEvent>,
    ) -> DialerResult<()> {
        device.register().await?;
        loop {
            match events.recv().await {
                Some(DeviceEvent::Registered) => return Ok(()),
                Some(DeviceEvent::Error(reason)) => return Err(DialerError::device(reason)),
                Some(DeviceEvent::Incoming { .. }) => {
                    debug!("Ignoring incoming call before registration completed");
                }
                None => return Err(DialerError::device("Device closed before registering")),
            }
        }
    }

    /// Tear the current call down into `target` if `epoch` is still current
    ///
    /// Returns whether anything was torn down.
    pub(crate) async fn finish_call(
        &self,
        epoch: u64,
        target: CallStatus,
        error: Option<DialerError>,
    ) -> bool {
        let released = {
            let mut state = self.lock();
            if state.epoch != epoch || !state.session.status.is_active() {
                return false;
            }

            if let Some(error) = &error {
                self.record_error(&mut state, error);
            }
            self.transition(&mut state, target, error.as_ref().map(ToString::to_string));
            let released = self.release_call(&mut state);
            self.publish(&state);
            released
        };

        released.release().await;
        true
    }

    /// Fail the call set up under `epoch` and hand the error back
    async fn fail_call(&self, epoch: u64, error: DialerError) -> DialerError {
        warn!(epoch = epoch, error = %error, "Call setup failed");
        self.finish_call(epoch, CallStatus::Error, Some(error.clone())).await;
        error
    }

    /// Count one second of talk time; false once the call is over
    pub(crate) fn tick_duration(&self, epoch: u64, call_id: CallId) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        if state.session.status != CallStatus::InProgress {
            return true;
        }

        state.session.duration_seconds += 1;
        self.emit(SessionEvent::DurationTick {
            call_id,
            seconds: state.session.duration_seconds,
        });
        self.publish(&state);
        true
    }

    fn start_ticker(self: &Arc<Self>, epoch: u64, call_id: CallId) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(self);
        let period = self.config.duration_tick();

        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if !inner.tick_duration(epoch, call_id) {
                    break;
                }
            }
        })
    }

    async fn run_device_listener(
        inner: Arc<Self>,
        device_epoch: u64,
        mut events: mpsc::UnboundedReceiver<DeviceEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                DeviceEvent::Registered => debug!("Device re-registered"),
                DeviceEvent::Error(reason) => {
                    let mut state = inner.lock();
                    if state.device_epoch != device_epoch {
                        break;
                    }
                    warn!(reason = %reason, "Device reported an error");
                    inner.record_error(&mut state, &DialerError::device(reason));
                    inner.publish(&state);
                }
                DeviceEvent::Incoming { from } => {
                    info!(from = ?from, "Incoming call ignored; inbound calls are not answered");
                    inner.emit(SessionEvent::IncomingCall {
                        from,
                        timestamp: Utc::now(),
                    });
                }
            }
        }
        debug!("Device event stream closed");
    }

    async fn run_connection_pump(
        inner: Arc<Self>,
        epoch: u64,
        call_id: CallId,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Ringing => {
                    let mut state = inner.lock();
                    if state.epoch != epoch {
                        return;
                    }
                    if state.session.status == CallStatus::Connecting {
                        inner.transition(&mut state, CallStatus::Ringing, None);
                        inner.publish(&state);
                    }
                }
                ConnectionEvent::Accepted => {
                    let mut state = inner.lock();
                    if state.epoch != epoch {
                        return;
                    }
                    let status = state.session.status;
                    if matches!(status, CallStatus::Connecting | CallStatus::Ringing) {
                        state.session.connected_at = Some(Utc::now());
                        inner.transition(&mut state, CallStatus::InProgress, None);
                        let ticker = inner.start_ticker(epoch, call_id);
                        if let Some(previous) = state.ticker.replace(ticker) {
                            previous.abort();
                        }
                        inner.publish(&state);
                        info!(call_id = %call_id, "Call answered");
                    }
                }
                ConnectionEvent::Disconnected => {
                    if inner.finish_call(epoch, CallStatus::Ended, None).await {
                        info!(call_id = %call_id, "Call disconnected");
                    }
                    return;
                }
                ConnectionEvent::Error(reason) => {
                    warn!(call_id = %call_id, reason = %reason, "Call leg failed");
                    inner
                        .finish_call(epoch, CallStatus::Error, Some(DialerError::device(reason)))
                        .await;
                    return;
                }
            }
        }

        if inner.finish_call(epoch, CallStatus::Ended, None).await {
            info!(call_id = %call_id, "Call leg event stream closed; call ended");
        }
    }

    async fn run_signaling_pump(
        inner: Arc<Self>,
        epoch: u64,
        call_id: CallId,
        mut events: mpsc::UnboundedReceiver<SignalingEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                SignalingEvent::Transcript(messages) => {
                    let mut state = inner.lock();
                    if state.epoch != epoch {
                        return;
                    }
                    for message in messages {
                        let index = state.session.transcript.len();
                        state.session.transcript.push(message.clone());
                        inner.emit(SessionEvent::TranscriptAppended {
                            call_id,
                            index,
                            message,
                        });
                    }
                    inner.publish(&state);
                }
                SignalingEvent::CallEnded => {
                    if inner.finish_call(epoch, CallStatus::Ended, None).await {
                        info!(call_id = %call_id, "Call ended by the server");
                    }
                    return;
                }
            }
        }

        if inner.finish_call(epoch, CallStatus::Ended, None).await {
            info!(call_id = %call_id, "Signaling channel dropped; call ended");
        }
    }
}
