//! Timeout helper for controller suspension points
//!
//! Origination and registration are never retried automatically; a slow
//! collaborator is bounded instead and surfaces as
//! [`DialerError::OperationTimeout`].

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{DialerError, DialerResult};

/// Run `future`, failing with `OperationTimeout` if it outlives `timeout`
pub async fn with_timeout<T, F>(
    operation_name: &str,
    timeout: Duration,
    future: F,
) -> DialerResult<T>
where
    F: Future<Output = DialerResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "Operation timed out"
            );
            Err(DialerError::OperationTimeout {
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}
