//! Builder for creating a call session controller

use std::sync::Arc;

use crate::backend::{BackendClient, HttpBackendClient};
use crate::device::DeviceFactory;
use crate::error::{DialerError, DialerResult};
use crate::signaling::{SignalingConnector, WsSignalingConnector};

use super::config::{DialerConfig, SessionCredential};
use super::CallSessionController;

/// Builder for [`CallSessionController`]
///
/// A device factory is always required, since the softphone SDK binding is
/// host-specific. The backend defaults to [`HttpBackendClient`] against
/// `backend_url`, authenticated with the credential's token, and signaling
/// defaults to [`WsSignalingConnector`].
pub struct DialerControllerBuilder {
    config: DialerConfig,
    credential: Option<SessionCredential>,
    backend: Option<Arc<dyn BackendClient>>,
    devices: Option<Arc<dyn DeviceFactory>>,
    signaling: Option<Arc<dyn SignalingConnector>>,
}

impl DialerControllerBuilder {
    /// Create a new controller builder
    pub fn new() -> Self {
        Self {
            config: DialerConfig::default(),
            credential: None,
            backend: None,
            devices: None,
            signaling: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: DialerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the backend base URL
    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend_url = url.into();
        self
    }

    /// Set the logged-in agent
    pub fn credential(mut self, credential: SessionCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Use a custom backend client
    pub fn backend(mut self, backend: Arc<dyn BackendClient>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the telephony device factory
    pub fn device_factory(mut self, devices: Arc<dyn DeviceFactory>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Use a custom signaling connector
    pub fn signaling_connector(mut self, signaling: Arc<dyn SignalingConnector>) -> Self {
        self.signaling = Some(signaling);
        self
    }

    /// Build the controller
    pub fn build(self) -> DialerResult<CallSessionController> {
        self.config.validate()?;

        let devices = self.devices.ok_or_else(|| {
            DialerError::invalid_configuration("device_factory", "a device factory is required")
        })?;

        let backend: Arc<dyn BackendClient> = match self.backend {
            Some(backend) => backend,
            None => {
                let timeout = self.config.request_timeout();
                let mut client = HttpBackendClient::new(&self.config.backend_url, timeout)?;
                if let Some(credential) = &self.credential {
                    client = client.with_auth_token(credential.auth_token.clone());
                }
                Arc::new(client)
            }
        };

        let signaling: Arc<dyn SignalingConnector> = match self.signaling {
            Some(signaling) => signaling,
            None => Arc::new(WsSignalingConnector::new(self.config.request_timeout())),
        };

        Ok(CallSessionController::new(
            self.config,
            self.credential,
            backend,
            devices,
            signaling,
        ))
    }
}

impl Default for DialerControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
