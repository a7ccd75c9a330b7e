//! Backend REST client
//!
//! The controller needs three things from the call-center backend: a
//! capability token for device registration, server-side call origination
//! (which hands back the signaling channel URL), and, for the post-call
//! screen, saving notes against a call.
//!
//! [`BackendClient`] is the seam; [`HttpBackendClient`] is the `reqwest`
//! implementation used in production.
//!
//! | operation | request | response |
//! |---|---|---|
//! | capability token | `GET /token?identity=<id>` | `{"token": "..."}` |
//! | originate | `POST /call` with [`CallParams`] | `{"frontend_url": "...", ...}` |
//! | notes | `PATCH /calls/{id}/notes` with [`CallNotes`] | any 2xx |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::device::CallParams;
use crate::error::{DialerError, DialerResult};

/// Response to a capability token request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Response to a call origination request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginateResponse {
    /// Signaling channel URL; its trailing path segment is the stream id
    pub frontend_url: Option<String>,
    /// Everything else the backend returned
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Post-call notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallNotes {
    pub notes: String,
    pub tags: Vec<String>,
}

/// REST operations the dialer depends on
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Fetch a short-lived capability token for `identity`
    async fn fetch_capability_token(&self, identity: &str) -> DialerResult<String>;

    /// Originate a call server-side
    async fn originate_call(&self, params: &CallParams) -> DialerResult<OriginateResponse>;

    /// Save notes and tags against a finished call
    async fn update_call_notes(&self, call_id: &str, notes: &CallNotes) -> DialerResult<()>;
}

/// `reqwest` implementation of [`BackendClient`]
#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    http: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpBackendClient {
    /// Create a client for the backend rooted at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> DialerResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| DialerError::invalid_configuration("backend_url", e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(DialerError::invalid_configuration(
                "backend_url",
                "URL cannot be used as a base",
            ));
        }
        // Keep a trailing slash so endpoints extend the base path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DialerError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            auth_token: None,
            timeout,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> DialerResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                DialerError::invalid_configuration("backend_url", "URL cannot be used as a base")
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn map_send_error(&self, operation: &str, e: reqwest::Error) -> DialerError {
        if e.is_timeout() {
            DialerError::OperationTimeout {
                duration_ms: self.timeout.as_millis() as u64,
            }
        } else {
            DialerError::transport(format!("{} failed: {}", operation, e))
        }
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> DialerResult<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(operation, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        warn!(operation = operation, status = %status, "Backend rejected request");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(DialerError::AuthenticationFailed {
                    reason: format!("{} returned {}", operation, status),
                })
            }
            _ => Err(DialerError::transport(format!(
                "{} returned {}",
                operation, status
            ))),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        operation: &str,
        response: reqwest::Response,
    ) -> DialerResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| {
                DialerError::protocol(format!("{} returned an unexpected body: {}", operation, e))
            })
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn fetch_capability_token(&self, identity: &str) -> DialerResult<String> {
        let mut url = self.endpoint(&["token"])?;
        url.query_pairs_mut().append_pair("identity", identity);
        debug!(identity = identity, "Requesting capability token");

        let response = self.send("token request", self.http.get(url)).await?;
        let body: TokenResponse = Self::decode("token request", response).await?;
        Ok(body.token)
    }

    async fn originate_call(&self, params: &CallParams) -> DialerResult<OriginateResponse> {
        let url = self.endpoint(&["call"])?;
        debug!(to = %params.to, agent_id = %params.agent_id, "Originating call");

        let response = self
            .send("call origination", self.http.post(url).json(params))
            .await?;
        Self::decode("call origination", response).await
    }

    async fn update_call_notes(&self, call_id: &str, notes: &CallNotes) -> DialerResult<()> {
        let url = self.endpoint(&["calls", call_id, "notes"])?;
        self.send("notes update", self.http.patch(url).json(notes))
            .await?;
        Ok(())
    }
}
