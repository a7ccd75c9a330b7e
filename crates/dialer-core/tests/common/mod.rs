//! In-memory collaborators for controller integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch, Notify};

use dialer_core::{
    BackendClient, CallLeg, CallNotes, CallParams, CallSession, CallSessionController, CallStatus,
    Connection, ConnectionEvent, Device, DeviceEvent, DeviceFactory, DeviceHandle, DeviceOptions,
    DialerConfig, DialerError, DialerResult, OriginateResponse, SessionCredential,
    SignalingChannel, SignalingCloser, SignalingConnector, SignalingEvent,
};

pub const STREAM_URL: &str = "wss://rt.example.com/media-stream/abc123";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dialer_core=debug")
        .with_test_writer()
        .try_init();
}

// ===== Backend =====

pub struct FakeBackend {
    token: Mutex<DialerResult<String>>,
    origination: Mutex<DialerResult<OriginateResponse>>,
    /// When set, origination waits for a permit before answering
    gate: Mutex<Option<Arc<Notify>>>,
    pub token_requests: Mutex<Vec<String>>,
    pub originated: Mutex<Vec<CallParams>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(Ok("capability-token".to_string())),
            origination: Mutex::new(Ok(Self::response(Some(STREAM_URL)))),
            gate: Mutex::new(None),
            token_requests: Mutex::new(Vec::new()),
            originated: Mutex::new(Vec::new()),
        }
    }

    pub fn response(frontend_url: Option<&str>) -> OriginateResponse {
        OriginateResponse {
            frontend_url: frontend_url.map(str::to_string),
            extra: serde_json::Map::new(),
        }
    }

    pub fn set_token(&self, token: DialerResult<String>) {
        *self.token.lock() = token;
    }

    pub fn set_origination(&self, origination: DialerResult<OriginateResponse>) {
        *self.origination.lock() = origination;
    }

    /// Hold origination responses until the returned handle is notified
    pub fn gate_origination(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn fetch_capability_token(&self, identity: &str) -> DialerResult<String> {
        self.token_requests.lock().push(identity.to_string());
        self.token.lock().clone()
    }

    async fn originate_call(&self, params: &CallParams) -> DialerResult<OriginateResponse> {
        self.originated.lock().push(params.clone());
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.origination.lock().clone()
    }

    async fn update_call_notes(&self, _call_id: &str, _notes: &CallNotes) -> DialerResult<()> {
        Ok(())
    }
}

// ===== Device =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Succeed,
    Fail(String),
    /// Never report back
    Silent,
}

pub struct FakeDeviceFactory {
    registration: Mutex<Registration>,
    /// When set, devices created from now on hold their registration answer
    registration_gate: Mutex<Option<Arc<Notify>>>,
    pub options: Mutex<Vec<DeviceOptions>>,
    pub devices: Mutex<Vec<Arc<FakeDevice>>>,
}

impl FakeDeviceFactory {
    pub fn new() -> Self {
        Self {
            registration: Mutex::new(Registration::Succeed),
            registration_gate: Mutex::new(None),
            options: Mutex::new(Vec::new()),
            devices: Mutex::new(Vec::new()),
        }
    }

    pub fn set_registration(&self, registration: Registration) {
        *self.registration.lock() = registration;
    }

    /// Hold registration answers until the returned handle is notified
    pub fn gate_registration(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.registration_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn device(&self) -> Arc<FakeDevice> {
        self.devices.lock().last().cloned().expect("no device created")
    }

    /// Latest call leg placed by the latest device
    pub fn leg(&self) -> Arc<FakeConnection> {
        self.device().leg()
    }
}

#[async_trait]
impl DeviceFactory for FakeDeviceFactory {
    async fn create(&self, _token: &str, options: &DeviceOptions) -> DialerResult<DeviceHandle> {
        self.options.lock().push(options.clone());
        let (events, rx) = mpsc::unbounded_channel();
        let device = Arc::new(FakeDevice {
            events,
            registration: self.registration.lock().clone(),
            registration_gate: self.registration_gate.lock().clone(),
            connect_gate: Mutex::new(None),
            destroyed: AtomicBool::new(false),
            placed: Mutex::new(Vec::new()),
            legs: Mutex::new(Vec::new()),
        });
        self.devices.lock().push(device.clone());

        Ok(DeviceHandle { device, events: rx })
    }
}

pub struct FakeDevice {
    events: mpsc::UnboundedSender<DeviceEvent>,
    registration: Registration,
    registration_gate: Option<Arc<Notify>>,
    connect_gate: Mutex<Option<Arc<Notify>>>,
    destroyed: AtomicBool,
    pub placed: Mutex<Vec<CallParams>>,
    pub legs: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeDevice {
    pub fn leg(&self) -> Arc<FakeConnection> {
        self.legs.lock().last().cloned().expect("no call leg placed")
    }

    /// Hold call leg placement until the returned handle is notified
    pub fn gate_connect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.connect_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn incoming(&self, from: &str) {
        let _ = self.events.send(DeviceEvent::Incoming {
            from: Some(from.to_string()),
        });
    }
}

#[async_trait]
impl Device for FakeDevice {
    async fn register(&self) -> DialerResult<()> {
        if let Some(gate) = &self.registration_gate {
            gate.notified().await;
        }
        match &self.registration {
            Registration::Succeed => {
                let _ = self.events.send(DeviceEvent::Registered);
            }
            Registration::Fail(reason) => {
                let _ = self.events.send(DeviceEvent::Error(reason.clone()));
            }
            Registration::Silent => {}
        }
        Ok(())
    }

    async fn connect(&self, params: &CallParams) -> DialerResult<CallLeg> {
        self.placed.lock().push(params.clone());
        let gate = self.connect_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let (events, rx) = mpsc::unbounded_channel();
        let leg = Arc::new(FakeConnection {
            events,
            fail_controls: AtomicBool::new(false),
            mutes: Mutex::new(Vec::new()),
            holds: Mutex::new(Vec::new()),
            recordings: Mutex::new(Vec::new()),
            digits: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        });
        self.legs.lock().push(leg.clone());

        Ok(CallLeg {
            connection: leg,
            events: rx,
        })
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeConnection {
    events: mpsc::UnboundedSender<ConnectionEvent>,
    fail_controls: AtomicBool,
    pub mutes: Mutex<Vec<bool>>,
    pub holds: Mutex<Vec<bool>>,
    pub recordings: Mutex<Vec<bool>>,
    pub digits: Mutex<Vec<String>>,
    disconnects: AtomicUsize,
}

impl FakeConnection {
    pub fn ring(&self) {
        let _ = self.events.send(ConnectionEvent::Ringing);
    }

    pub fn accept(&self) {
        let _ = self.events.send(ConnectionEvent::Accepted);
    }

    pub fn hang_up(&self) {
        let _ = self.events.send(ConnectionEvent::Disconnected);
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.events.send(ConnectionEvent::Error(reason.to_string()));
    }

    /// Make every in-call instruction fail
    pub fn fail_controls(&self, fail: bool) {
        self.fail_controls.store(fail, Ordering::SeqCst);
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn control(&self) -> DialerResult<()> {
        if self.fail_controls.load(Ordering::SeqCst) {
            Err(DialerError::device("instruction rejected"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn mute(&self, muted: bool) -> DialerResult<()> {
        self.control()?;
        self.mutes.lock().push(muted);
        Ok(())
    }

    async fn hold(&self, on_hold: bool) -> DialerResult<()> {
        self.control()?;
        self.holds.lock().push(on_hold);
        Ok(())
    }

    async fn set_recording(&self, recording: bool) -> DialerResult<()> {
        self.control()?;
        self.recordings.lock().push(recording);
        Ok(())
    }

    async fn send_digits(&self, digits: &str) -> DialerResult<()> {
        self.control()?;
        self.digits.lock().push(digits.to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(ConnectionEvent::Disconnected);
    }
}

// ===== Signaling =====

pub struct FakeSignalingConnector {
    failure: Mutex<Option<DialerError>>,
    gate: Mutex<Option<Arc<Notify>>>,
    pub urls: Mutex<Vec<String>>,
    senders: Mutex<Vec<Option<mpsc::UnboundedSender<SignalingEvent>>>>,
    closes: Mutex<Vec<oneshot::Receiver<()>>>,
}

impl FakeSignalingConnector {
    pub fn new() -> Self {
        Self {
            failure: Mutex::new(None),
            gate: Mutex::new(None),
            urls: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_with(&self, error: DialerError) {
        *self.failure.lock() = Some(error);
    }

    /// Hold channel opens until the returned handle is notified
    pub fn gate_open(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn opened(&self) -> usize {
        self.urls.lock().len()
    }

    /// Push an event into the latest channel
    pub fn send(&self, event: SignalingEvent) {
        if let Some(Some(sender)) = self.senders.lock().last() {
            let _ = sender.send(event);
        }
    }

    /// Drop the server side of the latest channel
    pub fn drop_channel(&self) {
        if let Some(sender) = self.senders.lock().last_mut() {
            sender.take();
        }
    }

    /// Whether the controller closed (or dropped) channel `index`
    pub fn is_closed(&self, index: usize) -> bool {
        let mut closes = self.closes.lock();
        match closes.get_mut(index) {
            Some(rx) => !matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)),
            None => false,
        }
    }
}

#[async_trait]
impl SignalingConnector for FakeSignalingConnector {
    async fn open(&self, url: &str) -> DialerResult<SignalingChannel> {
        self.urls.lock().push(url.to_string());
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }

        let (events, rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        self.senders.lock().push(Some(events));
        self.closes.lock().push(close_rx);

        Ok(SignalingChannel {
            events: rx,
            closer: SignalingCloser::new(close_tx),
        })
    }
}

// ===== Harness =====

pub struct Harness {
    pub controller: CallSessionController,
    pub backend: Arc<FakeBackend>,
    pub devices: Arc<FakeDeviceFactory>,
    pub signaling: Arc<FakeSignalingConnector>,
}

pub fn credential() -> SessionCredential {
    SessionCredential::new("agent-7", "secret-token")
        .with_agent("a-7", "Ada Agent")
        .with_supervisor("s-1", "Sam Supervisor")
        .with_organisation("org-9", "acme.example.com")
        .with_processes(["collections"])
}

pub fn harness() -> Harness {
    init_tracing();
    let backend = Arc::new(FakeBackend::new());
    let devices = Arc::new(FakeDeviceFactory::new());
    let signaling = Arc::new(FakeSignalingConnector::new());

    let controller = dialer_core::DialerControllerBuilder::new()
        .config(DialerConfig::default())
        .credential(credential())
        .backend(backend.clone())
        .device_factory(devices.clone())
        .signaling_connector(signaling.clone())
        .build()
        .expect("controller builds");

    Harness {
        controller,
        backend,
        devices,
        signaling,
    }
}

impl Harness {
    /// Controller with a registered device
    pub async fn registered() -> Self {
        let harness = harness();
        harness
            .controller
            .initialize_device()
            .await
            .expect("device registers");
        harness
    }

    /// Registered controller with a call placed to `to`
    pub async fn dialing(to: &str) -> Self {
        let harness = Self::registered().await;
        harness.controller.set_destination_number(to).expect("valid dial string");
        harness.controller.initiate_call().await.expect("call placed");
        harness
    }

    /// Registered controller with an answered call
    pub async fn in_progress() -> Self {
        let harness = Self::dialing("+14155550100").await;
        harness.devices.leg().accept();
        wait_for_status(&harness.controller, CallStatus::InProgress).await;
        harness
    }
}

/// Wait until the session satisfies `predicate`, failing after a while
pub async fn wait_for<F>(controller: &CallSessionController, predicate: F) -> CallSession
where
    F: FnMut(&CallSession) -> bool,
{
    let mut rx: watch::Receiver<CallSession> = controller.subscribe();
    let session = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session")
        .expect("controller dropped")
        .clone();
    session
}

pub async fn wait_for_status(
    controller: &CallSessionController,
    status: CallStatus,
) -> CallSession {
    wait_for(controller, |session| session.status == status).await
}
