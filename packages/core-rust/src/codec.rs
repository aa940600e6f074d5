//! Frame codec for messages crossing a context boundary.
//!
//! Contexts never share memory with their callers: every request and response
//! is encoded into an owned byte frame before it is handed over. Frames are
//! named `MsgPack` (`rmp_serde::to_vec_named()`), so field names survive and
//! frames stay readable by non-Rust peers.

use anyhow::Context as _;
use serde::Serialize;

use crate::messages::{WorkPayload, WorkRequest, WorkResponse};

/// Borrowing mirror of `WorkRequest::Process`; serializes to the same frame
/// without cloning the payload.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum ProcessRef<'a> {
    Process { id: u64, payload: &'a WorkPayload },
}

/// Encodes a request frame.
///
/// # Errors
///
/// Returns an error if the request cannot be serialized.
pub fn encode_request(request: &WorkRequest) -> anyhow::Result<Vec<u8>> {
    rmp_serde::to_vec_named(request)
        .with_context(|| format!("failed to encode request {}", request.id()))
}

/// Encodes a `Process` request frame for a payload the caller keeps.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode_process(id: u64, payload: &WorkPayload) -> anyhow::Result<Vec<u8>> {
    rmp_serde::to_vec_named(&ProcessRef::Process { id, payload })
        .with_context(|| format!("failed to encode request {id}"))
}

/// Decodes a request frame.
///
/// # Errors
///
/// Returns an error if the frame is not a valid request.
pub fn decode_request(frame: &[u8]) -> anyhow::Result<WorkRequest> {
    rmp_serde::from_slice(frame).context("failed to decode request frame")
}

/// Encodes a response frame.
///
/// # Errors
///
/// Returns an error if the response cannot be serialized.
pub fn encode_response(response: &WorkResponse) -> anyhow::Result<Vec<u8>> {
    rmp_serde::to_vec_named(response)
        .with_context(|| format!("failed to encode response {}", response.id()))
}

/// Decodes a response frame.
///
/// # Errors
///
/// Returns an error if the frame is not a valid response.
pub fn decode_response(frame: &[u8]) -> anyhow::Result<WorkResponse> {
    rmp_serde::from_slice(frame).context("failed to decode response frame")
}
