//! Call session controller
//!
//! The controller is the only thing that mutates the [`CallSession`]. It sits
//! between three collaborators and the UI:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!   UI  ◄────┤  watch: CallSession snapshot │
//!       ◄────┤  broadcast: SessionEvent     │
//!            └──────────────┬───────────────┘
//!                           │
//!            ┌──────────────▼───────────────┐
//!            │    CallSessionController     │ ◄── This Module
//!            └───┬──────────┬───────────┬───┘
//!                │          │           │
//!        BackendClient  DeviceFactory  SignalingConnector
//!        (token, call)  (SDK device)   (transcripts, end)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dialer_core::{CallStatus, DialerControllerBuilder, DeviceFactory, SessionCredential};
//!
//! async fn dial(devices: Arc<dyn DeviceFactory>) -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = DialerControllerBuilder::new()
//!         .backend_url("https://api.example.com")
//!         .credential(SessionCredential::new("agent-7", "token"))
//!         .device_factory(devices)
//!         .build()?;
//!
//!     let mut session = controller.subscribe();
//!     controller.initialize_device().await?;
//!     controller.set_destination_number("+14155550100")?;
//!     controller.initiate_call().await?;
//!
//!     session.wait_for(|s| s.status == CallStatus::InProgress).await?;
//!     controller.send_dtmf("1").await?;
//!     controller.end_call().await;
//!     Ok(())
//! }
//! ```
//!
//! # Late results
//!
//! Every call gets a fresh epoch, and teardown bumps it again. Each async
//! continuation (origination response, signaling open, device connect, pump
//! events, duration ticks) re-checks its epoch under the state lock and
//! discards itself when the session moved on.

pub mod builder;
pub mod calls;
pub mod config;
pub mod controls;
pub mod recovery;

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::BackendClient;
use crate::call::{CallId, CallSession, CallStatus};
use crate::device::{Connection, Device, DeviceFactory};
use crate::error::DialerError;
use crate::events::SessionEvent;
use crate::signaling::{SignalingCloser, SignalingConnector};

pub use builder::DialerControllerBuilder;
pub use config::{DialerConfig, SessionCredential};
pub use recovery::with_timeout;

/// Owner of the single call session
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct CallSessionController {
    pub(crate) inner: Arc<ControllerInner>,
}

pub(crate) struct ControllerInner {
    pub(crate) config: DialerConfig,
    pub(crate) credential: Option<SessionCredential>,
    pub(crate) backend: Arc<dyn BackendClient>,
    pub(crate) devices: Arc<dyn DeviceFactory>,
    pub(crate) signaling: Arc<dyn SignalingConnector>,
    state: Mutex<ControllerState>,
    snapshot_tx: watch::Sender<CallSession>,
    event_tx: broadcast::Sender<SessionEvent>,
}

/// Mutable controller state; the lock is never held across an await
pub(crate) struct ControllerState {
    pub(crate) session: CallSession,
    /// Current call generation
    pub(crate) epoch: u64,
    /// Current device generation, bumped by `teardown_device`
    pub(crate) device_epoch: u64,
    pub(crate) device: Option<Arc<dyn Device>>,
    pub(crate) device_listener: Option<JoinHandle<()>>,
    pub(crate) connection: Option<Arc<dyn Connection>>,
    pub(crate) signaling: Option<SignalingCloser>,
    pub(crate) ticker: Option<JoinHandle<()>>,
}

/// Resources taken out of the state during teardown, released after unlocking
pub(crate) struct ReleasedCall {
    connection: Option<Arc<dyn Connection>>,
    signaling: Option<SignalingCloser>,
}

impl ReleasedCall {
    pub(crate) async fn release(self) {
        if let Some(signaling) = self.signaling {
            signaling.close();
        }
        if let Some(connection) = self.connection {
            connection.disconnect().await;
        }
    }
}

impl CallSessionController {
    /// Create a controller with an idle session
    ///
    /// `credential` is the logged-in agent, if any; without one,
    /// `initialize_device()` fails with [`DialerError::MissingCredential`].
    pub fn new(
        config: DialerConfig,
        credential: Option<SessionCredential>,
        backend: Arc<dyn BackendClient>,
        devices: Arc<dyn DeviceFactory>,
        signaling: Arc<dyn SignalingConnector>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(CallSession::new());
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Self {
            inner: Arc::new(ControllerInner {
                config,
                credential,
                backend,
                devices,
                signaling,
                state: Mutex::new(ControllerState {
                    session: CallSession::new(),
                    epoch: 0,
                    device_epoch: 0,
                    device: None,
                    device_listener: None,
                    connection: None,
                    signaling: None,
                    ticker: None,
                }),
                snapshot_tx,
                event_tx,
            }),
        }
    }

    /// Current session snapshot
    pub fn session(&self) -> CallSession {
        self.inner.lock().session.clone()
    }

    /// Follow session snapshots; the receiver always holds the latest one
    pub fn subscribe(&self) -> watch::Receiver<CallSession> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Follow discrete session events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn config(&self) -> &DialerConfig {
        &self.inner.config
    }

    pub fn credential(&self) -> Option<&SessionCredential> {
        self.inner.credential.as_ref()
    }

    /// The backend this controller talks to, for adjacent screens (call notes)
    pub fn backend(&self) -> Arc<dyn BackendClient> {
        Arc::clone(&self.inner.backend)
    }
}

impl ControllerInner {
    pub(crate) fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock()
    }

    /// Push the current session to snapshot observers
    pub(crate) fn publish(&self, state: &ControllerState) {
        self.snapshot_tx.send_replace(state.session.clone());
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn transition(
        &self,
        state: &mut ControllerState,
        to: CallStatus,
        reason: Option<String>,
    ) {
        let from = state.session.status;
        if from == to {
            return;
        }
        state.session.status = to;
        info!(from = %from, to = %to, epoch = state.epoch, "Call session status changed");
        self.emit(SessionEvent::status_changed(
            state.session.active_connection,
            from,
            to,
            reason,
        ));
    }

    pub(crate) fn record_error(&self, state: &mut ControllerState, error: &DialerError) {
        state.session.last_error = Some(error.to_string());
        self.emit(SessionEvent::Error {
            error: error.clone(),
            call_id: state.session.active_connection,
        });
    }

    /// Detach every per-call resource and start a new epoch
    ///
    /// Clears the in-flight leg and the mute, hold and recording flags;
    /// transcript and duration stay for post-call review.
    pub(crate) fn release_call(&self, state: &mut ControllerState) -> ReleasedCall {
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        if state.session.active_connection.take().is_some() {
            state.session.ended_at = Some(chrono::Utc::now());
        }
        state.session.is_muted = false;
        state.session.is_on_hold = false;
        state.session.is_recording = false;
        state.epoch += 1;

        ReleasedCall {
            connection: state.connection.take(),
            signaling: state.signaling.take(),
        }
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    pub(crate) fn active_call_id(state: &ControllerState) -> Option<CallId> {
        state.session.active_connection
    }
}
