//! Response emission.
//!
//! # Responsibilities
//! - Write the batch envelope, buffered or streamed
//! - Map dispatch failures to an HTTP status and JSON error body
//! - Turn handler panics into a 500
//!
//! # Design Decisions
//! - Streaming writes one chunk per result; the bytes equal the buffered encoding
//! - The status is known before the first byte is written, since aggregation completes first

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Serialize;
use std::any::Any;

use crate::query::{BatchStatus, DispatchError, QueryBatchResponse, QueryResult};

/// How the envelope is written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    /// Serialize the whole envelope, then send it.
    Buffered,
    /// Send the envelope incrementally, one result at a time.
    Streaming,
}

/// Body of a batch-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn batch_status(status: BatchStatus) -> StatusCode {
    match status {
        BatchStatus::Ok => StatusCode::OK,
        BatchStatus::BadRequest => StatusCode::BAD_REQUEST,
    }
}

/// Write a completed envelope.
pub fn emit(response: QueryBatchResponse, mode: EmitMode) -> Response {
    let status = batch_status(response.status);
    match mode {
        EmitMode::Buffered => (status, Json(response)).into_response(),
        EmitMode::Streaming => {
            let mut resp = Response::new(Body::from_stream(envelope_chunks(response)));
            *resp.status_mut() = status;
            resp.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            resp
        }
    }
}

/// The envelope as a chunk stream: opening, one chunk per result, trailer.
fn envelope_chunks(
    response: QueryBatchResponse,
) -> impl Stream<Item = Result<Bytes, serde_json::Error>> + Send + 'static {
    let QueryBatchResponse { results, message, .. } = response;

    let opening = std::iter::once(Ok(Bytes::from_static(b"{\"results\":{")));
    let entries = results
        .into_iter()
        .enumerate()
        .map(|(index, (ref_id, result))| encode_entry(index, &ref_id, &result));
    let trailer = std::iter::once_with(move || encode_trailer(message.as_deref()));

    stream::iter(opening.chain(entries).chain(trailer))
}

fn encode_entry(index: usize, ref_id: &str, result: &QueryResult) -> Result<Bytes, serde_json::Error> {
    let mut buf = Vec::new();
    if index > 0 {
        buf.push(b',');
    }
    serde_json::to_writer(&mut buf, ref_id)?;
    buf.push(b':');
    serde_json::to_writer(&mut buf, result)?;
    Ok(Bytes::from(buf))
}

fn encode_trailer(message: Option<&str>) -> Result<Bytes, serde_json::Error> {
    let mut buf = b"}".to_vec();
    if let Some(message) = message {
        buf.extend_from_slice(b",\"message\":");
        serde_json::to_writer(&mut buf, message)?;
    }
    buf.push(b'}');
    Ok(Bytes::from(buf))
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        let cause = self.cause();
        if self.is_client_error() {
            tracing::warn!(status = status.as_u16(), error = %self, cause = ?cause, "Batch rejected");
        } else {
            tracing::error!(status = status.as_u16(), error = %self, cause = ?cause, "Batch failed");
        }

        let body = ErrorBody {
            message: self.to_string(),
            error: cause,
        };
        (status, Json(body)).into_response()
    }
}

/// Response for a panicking handler.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    tracing::error!(panic = %detail, "Handler panicked");

    let body = ErrorBody {
        message: "Internal Server Error".to_string(),
        error: None,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
