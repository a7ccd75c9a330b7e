//! Real-time signaling channel
//!
//! While a call is up, the backend streams transcript batches and an
//! out-of-band "call ended" signal over a channel that is independent of the
//! voice media path. Only two inbound shapes matter:
//!
//! ```text
//! {"event":"full_content","data":{"transcripts":[
//!     {"event":"transcription","speaker":"Agent","data":"Hello"}
//! ]}}
//! {"status":"call_ended"}
//! ```
//!
//! Parsing is best-effort: anything that does not match is dropped, never
//! treated as a fault.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, trace, warn};
use url::Url;

use crate::call::{Speaker, TranscriptMessage};
use crate::error::{DialerError, DialerResult};

/// Event decoded from the signaling channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// One or more transcript lines, in arrival order
    Transcript(Vec<TranscriptMessage>),
    /// The server ended the call
    CallEnded,
}

/// Closes a signaling channel; dropping it closes the channel too
#[derive(Debug)]
pub struct SignalingCloser(oneshot::Sender<()>);

impl SignalingCloser {
    pub fn new(tx: oneshot::Sender<()>) -> Self {
        Self(tx)
    }

    pub fn close(self) {
        let _ = self.0.send(());
    }
}

/// An open signaling channel
///
/// `events` ends (yields `None`) when the remote side closes the channel or
/// the transport fails.
#[derive(Debug)]
pub struct SignalingChannel {
    pub events: mpsc::UnboundedReceiver<SignalingEvent>,
    pub closer: SignalingCloser,
}

/// Opens signaling channels by URL
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    async fn open(&self, url: &str) -> DialerResult<SignalingChannel>;
}

/// Decode one inbound text message
pub fn parse_signaling_message(text: &str) -> Option<SignalingEvent> {
    let value: Value = serde_json::from_str(text).ok()?;

    if value.get("status").and_then(Value::as_str) == Some("call_ended") {
        return Some(SignalingEvent::CallEnded);
    }

    if value.get("event").and_then(Value::as_str) != Some("full_content") {
        return None;
    }

    let entries = value.get("data")?.get("transcripts")?.as_array()?;
    let messages: Vec<TranscriptMessage> = entries
        .iter()
        .filter(|entry| entry.get("event").and_then(Value::as_str) == Some("transcription"))
        .filter_map(|entry| {
            let text = entry.get("data")?.as_str()?;
            let speaker = entry.get("speaker").and_then(Value::as_str).unwrap_or_default();
            Some(TranscriptMessage::new(Speaker::from_label(speaker), text))
        })
        .collect();

    if messages.is_empty() {
        None
    } else {
        Some(SignalingEvent::Transcript(messages))
    }
}

/// Stream identifier carried by a signaling URL: its trailing path segment
pub fn stream_id_from_url(url: &str) -> Option<String> {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()
            .map(str::to_string),
        Err(_) => {
            let path = url.split(['?', '#']).next().unwrap_or_default();
            path.split('/')
                .filter(|segment| !segment.is_empty())
                .last()
                .map(str::to_string)
        }
    }
}

/// WebSocket implementation of [`SignalingConnector`]
///
/// `wss://` URLs need the crate's `tls` feature.
#[derive(Debug, Clone)]
pub struct WsSignalingConnector {
    connect_timeout: Duration,
}

impl WsSignalingConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsSignalingConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl SignalingConnector for WsSignalingConnector {
    async fn open(&self, url: &str) -> DialerResult<SignalingChannel> {
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| DialerError::OperationTimeout {
                duration_ms: self.connect_timeout.as_millis() as u64,
            })?
            .map_err(|e| DialerError::signaling(format!("Failed to open {}: {}", url, e)))?;
        debug!(url = url, "Signaling channel open");

        let (mut writer, mut reader) = stream.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        let channel_url = url.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut close_rx => {
                        let _ = writer.send(Message::Close(None)).await;
                        debug!(url = %channel_url, "Signaling channel closed locally");
                        break;
                    }
                    frame = reader.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                match parse_signaling_message(text.as_str()) {
                                    Some(event) => {
                                        if event_tx.send(event).is_err() {
                                            break;
                                        }
                                    }
                                    None => {
                                        trace!(url = %channel_url, "Dropping unrecognised message");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(url = %channel_url, "Signaling channel closed by peer");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(url = %channel_url, error = %e, "Signaling channel failed");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(SignalingChannel {
            events: event_rx,
            closer: SignalingCloser::new(close_tx),
        })
    }
}
