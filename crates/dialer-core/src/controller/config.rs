//! Configuration for the call session controller
//!
//! [`DialerConfig`] carries the tunables (backend location, timeouts, tick
//! period); [`SessionCredential`] carries who the agent is. The credential is
//! owned by the host (it normally lives in the dashboard's persisted login)
//! and is handed to the controller read-only.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::device::CallParams;
use crate::error::{DialerError, DialerResult};

/// Controller configuration
///
/// ```rust
/// use dialer_core::DialerConfig;
///
/// let config = DialerConfig::new()
///     .with_backend_url("https://api.example.com/v1")
///     .with_request_timeout_secs(5);
///
/// assert_eq!(config.request_timeout_secs, 5);
/// assert_eq!(config.duration_tick_ms, 1000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialerConfig {
    /// Base URL of the call-center REST backend
    pub backend_url: String,
    /// Bound on each backend request and on opening the signaling channel
    pub request_timeout_secs: u64,
    /// Bound on waiting for the device's `Registered` event
    pub registration_timeout_secs: u64,
    /// Period of the in-progress duration counter
    pub duration_tick_ms: u64,
    /// Capacity of the broadcast channel for session events
    pub event_channel_capacity: usize,
}

impl DialerConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 10,
            registration_timeout_secs: 15,
            duration_tick_ms: 1000,
            event_channel_capacity: 256,
        }
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_registration_timeout_secs(mut self, secs: u64) -> Self {
        self.registration_timeout_secs = secs;
        self
    }

    pub fn with_duration_tick_ms(mut self, millis: u64) -> Self {
        self.duration_tick_ms = millis;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    pub fn duration_tick(&self) -> Duration {
        Duration::from_millis(self.duration_tick_ms.max(1))
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> DialerResult<()> {
        Url::parse(&self.backend_url)
            .map_err(|e| DialerError::invalid_configuration("backend_url", e.to_string()))?;
        if self.request_timeout_secs == 0 {
            return Err(DialerError::invalid_configuration(
                "request_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.registration_timeout_secs == 0 {
            return Err(DialerError::invalid_configuration(
                "registration_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.duration_tick_ms == 0 {
            return Err(DialerError::invalid_configuration(
                "duration_tick_ms",
                "must be greater than zero",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(DialerError::invalid_configuration(
                "event_channel_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Logged-in agent identity plus the metadata attached to every call
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    /// Identity the capability token is issued for
    pub identity: String,
    /// Bearer token for the REST backend
    pub auth_token: String,
    pub agent_name: String,
    pub agent_id: String,
    pub supervisor_id: Option<String>,
    pub supervisor_name: Option<String>,
    pub organisation_id: Option<String>,
    pub domain: Option<String>,
    #[serde(default)]
    pub processes: Vec<String>,
}

// The auth token stays out of logs
impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("identity", &self.identity)
            .field("auth_token", &"<redacted>")
            .field("agent_name", &self.agent_name)
            .field("agent_id", &self.agent_id)
            .field("supervisor_id", &self.supervisor_id)
            .field("supervisor_name", &self.supervisor_name)
            .field("organisation_id", &self.organisation_id)
            .field("domain", &self.domain)
            .field("processes", &self.processes)
            .finish()
    }
}

impl SessionCredential {
    /// Credential with only the required fields set
    ///
    /// The agent id and name default to the identity.
    pub fn new(identity: impl Into<String>, auth_token: impl Into<String>) -> Self {
        let identity = identity.into();
        Self {
            agent_name: identity.clone(),
            agent_id: identity.clone(),
            identity,
            auth_token: auth_token.into(),
            supervisor_id: None,
            supervisor_name: None,
            organisation_id: None,
            domain: None,
            processes: Vec::new(),
        }
    }

    pub fn with_agent(
        mut self,
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        self.agent_id = agent_id.into();
        self.agent_name = agent_name.into();
        self
    }

    pub fn with_supervisor(
        mut self,
        supervisor_id: impl Into<String>,
        supervisor_name: impl Into<String>,
    ) -> Self {
        self.supervisor_id = Some(supervisor_id.into());
        self.supervisor_name = Some(supervisor_name.into());
        self
    }

    pub fn with_organisation(
        mut self,
        organisation_id: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        self.organisation_id = Some(organisation_id.into());
        self.domain = Some(domain.into());
        self
    }

    pub fn with_processes<I, S>(mut self, processes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.processes = processes.into_iter().map(Into::into).collect();
        self
    }

    /// Read the credential from `DIALER_*` environment variables
    ///
    /// `DIALER_IDENTITY` and `DIALER_AUTH_TOKEN` are required. Optional:
    /// `DIALER_AGENT_ID`, `DIALER_AGENT_NAME`, `DIALER_SUPERVISOR_ID`,
    /// `DIALER_SUPERVISOR_NAME`, `DIALER_ORGANISATION_ID`, `DIALER_DOMAIN` and
    /// `DIALER_PROCESSES` (comma separated). Returns `None` when a required
    /// variable is missing or empty.
    pub fn from_env() -> Option<Self> {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        let mut credential = Self::new(var("DIALER_IDENTITY")?, var("DIALER_AUTH_TOKEN")?);
        if let Some(agent_id) = var("DIALER_AGENT_ID") {
            credential.agent_id = agent_id;
        }
        if let Some(agent_name) = var("DIALER_AGENT_NAME") {
            credential.agent_name = agent_name;
        }
        credential.supervisor_id = var("DIALER_SUPERVISOR_ID");
        credential.supervisor_name = var("DIALER_SUPERVISOR_NAME");
        credential.organisation_id = var("DIALER_ORGANISATION_ID");
        credential.domain = var("DIALER_DOMAIN");
        if let Some(processes) = var("DIALER_PROCESSES") {
            credential.processes = processes
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        Some(credential)
    }

    /// Build origination/connect parameters for a call to `to`
    pub fn call_params(&self, to: impl Into<String>, customer_id: Option<String>) -> CallParams {
        CallParams {
            to: to.into(),
            agent_name: self.agent_name.clone(),
            agent_id: self.agent_id.clone(),
            supervisor_id: self.supervisor_id.clone(),
            supervisor_name: self.supervisor_name.clone(),
            customer_id,
            organisation_id: self.organisation_id.clone(),
            domain: self.domain.clone(),
            processes: self.processes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: [&str; 9] = [
        "DIALER_IDENTITY",
        "DIALER_AUTH_TOKEN",
        "DIALER_AGENT_ID",
        "DIALER_AGENT_NAME",
        "DIALER_SUPERVISOR_ID",
        "DIALER_SUPERVISOR_NAME",
        "DIALER_ORGANISATION_ID",
        "DIALER_DOMAIN",
        "DIALER_PROCESSES",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = DialerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.duration_tick(), Duration::from_secs(1));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let err = DialerConfig::new().with_backend_url("::nope::").validate().unwrap_err();
        assert!(matches!(
            err,
            DialerError::InvalidConfiguration { ref field, .. } if field == "backend_url"
        ));

        assert!(DialerConfig::new().with_request_timeout_secs(0).validate().is_err());
        assert!(DialerConfig::new().with_registration_timeout_secs(0).validate().is_err());
        assert!(DialerConfig::new().with_duration_tick_ms(0).validate().is_err());
        assert!(DialerConfig::new().with_event_channel_capacity(0).validate().is_err());
    }

    #[test]
    fn test_config_serde() {
        let config = DialerConfig::new().with_backend_url("https://api.example.com");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DialerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_debug_redacts_auth_token() {
        let credential = SessionCredential::new("agent-7", "s3cret-token");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("agent-7"));
        assert!(!debug.contains("s3cret-token"));
    }

    #[test]
    fn test_call_params_carry_agent_metadata() {
        let credential = SessionCredential::new("agent-7", "token")
            .with_agent("7", "Dana")
            .with_supervisor("3", "Lee")
            .with_organisation("org-1", "acme.example")
            .with_processes(["collections", "support"]);

        let params = credential.call_params("+15550100", Some("cust-9".to_string()));
        assert_eq!(params.to, "+15550100");
        assert_eq!(params.agent_id, "7");
        assert_eq!(params.agent_name, "Dana");
        assert_eq!(params.supervisor_name.as_deref(), Some("Lee"));
        assert_eq!(params.customer_id.as_deref(), Some("cust-9"));
        assert_eq!(params.domain.as_deref(), Some("acme.example"));
        assert_eq!(params.processes, vec!["collections", "support"]);
    }

    #[test]
    #[serial]
    fn test_from_env_requires_identity_and_token() {
        clear_env();
        assert!(SessionCredential::from_env().is_none());

        std::env::set_var("DIALER_IDENTITY", "agent-7");
        assert!(SessionCredential::from_env().is_none());

        std::env::set_var("DIALER_AUTH_TOKEN", "   ");
        assert!(SessionCredential::from_env().is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_reads_optional_fields() {
        clear_env();
        std::env::set_var("DIALER_IDENTITY", "agent-7");
        std::env::set_var("DIALER_AUTH_TOKEN", "token");
        std::env::set_var("DIALER_AGENT_NAME", "Dana");
        std::env::set_var("DIALER_PROCESSES", "collections, support,,");

        let credential = SessionCredential::from_env().unwrap();
        assert_eq!(credential.identity, "agent-7");
        assert_eq!(credential.agent_id, "agent-7");
        assert_eq!(credential.agent_name, "Dana");
        assert_eq!(credential.processes, vec!["collections", "support"]);
        assert!(credential.domain.is_none());
        clear_env();
    }
}
