//! Dispatch: one request to one context, resolved exactly once.
//!
//! The dispatch registers its response slot before posting, then races the
//! response against a context fault and the deadline. Whichever comes first
//! wins; the pending slot is removed on every path. A failed dispatch never
//! tears down the context itself -- that decision belongs to the caller.

use std::time::Duration;

use airmap_core::codec;
use airmap_core::messages::{TransformResult, WorkPayload};

use super::context::{ContextHandle, Reply};

/// Why a dispatch did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("background context reported an error: {message}")]
    Remote { message: String },
    #[error("background context fault: {message}")]
    ContextFault { message: String },
    #[error("dispatch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("codec error: {0:#}")]
    Codec(#[from] anyhow::Error),
}

impl DispatchError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "remote",
            Self::ContextFault { .. } => "fault",
            Self::Timeout { .. } => "timeout",
            Self::Codec(_) => "codec",
        }
    }
}

/// Removes the pending slot when the dispatch resolves, whichever way.
struct PendingGuard<'a> {
    handle: &'a ContextHandle,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.handle.forget(self.id);
    }
}

/// Send `payload` to the context behind `handle` and wait up to `timeout` for its result.
///
/// An empty payload is valid and yields an empty result. On timeout a cancel
/// message is posted so the context can drop the request if it has not started it.
///
/// # Errors
///
/// - `DispatchError::Remote` if the context answered with a failure, or with a
///   result of the wrong category
/// - `DispatchError::ContextFault` if the context faulted, exited, or was terminated
/// - `DispatchError::Timeout` if no answer arrived within `timeout`
/// - `DispatchError::Codec` if the request could not be encoded
pub async fn dispatch(
    handle: &ContextHandle,
    payload: &WorkPayload,
    timeout: Duration,
) -> Result<TransformResult, DispatchError> {
    let id = handle.next_request_id();
    let frame = codec::encode_process(id, payload)?;

    let reply = handle.register(id);
    let _pending = PendingGuard { handle, id };

    let exchange = async {
        handle
            .post(frame)
            .await
            .map_err(|_| DispatchError::ContextFault {
                message: "background context is not accepting requests".to_string(),
            })?;

        match reply.await {
            Ok(Reply::Response(response)) => response
                .into_result()
                .map_err(|message| DispatchError::Remote { message }),
            Ok(Reply::Fault(message)) => Err(DispatchError::ContextFault { message }),
            Err(_) => Err(DispatchError::ContextFault {
                message: "background context terminated".to_string(),
            }),
        }
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok(result)) if result.category() == payload.category() => Ok(result),
        Ok(Ok(result)) => Err(DispatchError::Remote {
            message: format!(
                "expected a {} result, got {}",
                payload.category(),
                result.category()
            ),
        }),
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => {
            handle.cancel(id);
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            Err(DispatchError::Timeout { timeout_ms })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
