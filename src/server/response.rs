//! Response emitter: one JSON response per request, written at most once.
//!
//! A [`ResponseHandle`] is shared by every task spawned for a request. Its
//! written flag flips false→true exactly once, on the first [`emit`]; later
//! calls are rejected with [`Error::AlreadyWritten`] and never reach the
//! transport.

use may_minihttp::Response;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Transport-side response surface.
pub trait ResponseSink: Send {
    fn set_status(&mut self, code: u16);
    fn set_header(&mut self, name: &str, value: &str);
    fn write_body(&mut self, bytes: &[u8]);
    /// Hand the response to the transport. Nothing may be written afterwards.
    fn finalize(&mut self);
    fn is_writable(&self) -> bool;
}

/// A finalized response as recorded by [`BufferedResponse`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body parsed as JSON, if it is JSON.
    #[must_use]
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Debug, Default)]
struct BufferState {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    finalized: Option<RecordedResponse>,
    finalize_count: usize,
}

/// In-process sink that records what was written.
///
/// The service copies the recorded response to the wire once routing returns.
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferedResponse {
    state: Arc<Mutex<BufferState>>,
}

impl BufferedResponse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The finalized response, if one was produced.
    #[must_use]
    pub fn recorded(&self) -> Option<RecordedResponse> {
        self.lock().finalized.clone()
    }

    /// How many times the response was handed to the transport.
    #[must_use]
    pub fn finalize_count(&self) -> usize {
        self.lock().finalize_count
    }
}

impl ResponseSink for BufferedResponse {
    fn set_status(&mut self, code: u16) {
        self.lock().status = code;
    }

    fn set_header(&mut self, name: &str, value: &str) {
        let mut state = self.lock();
        state.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        state.headers.push((name.to_string(), value.to_string()));
    }

    fn write_body(&mut self, bytes: &[u8]) {
        self.lock().body.extend_from_slice(bytes);
    }

    fn finalize(&mut self) {
        let mut state = self.lock();
        state.finalize_count += 1;
        if state.finalized.is_none() {
            state.finalized = Some(RecordedResponse {
                status: state.status,
                headers: std::mem::take(&mut state.headers),
                body: std::mem::take(&mut state.body),
            });
        }
    }

    fn is_writable(&self) -> bool {
        self.lock().finalized.is_none()
    }
}

struct ResponseInner {
    written: AtomicBool,
    rejected: AtomicUsize,
    sink: Mutex<Box<dyn ResponseSink>>,
}

/// Shared handle to one request's response.
#[derive(Clone)]
pub struct ResponseHandle {
    inner: Arc<ResponseInner>,
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("written", &!self.is_writable())
            .finish()
    }
}

impl ResponseHandle {
    pub fn new(sink: impl ResponseSink + 'static) -> Self {
        Self {
            inner: Arc::new(ResponseInner {
                written: AtomicBool::new(false),
                rejected: AtomicUsize::new(0),
                sink: Mutex::new(Box::new(sink)),
            }),
        }
    }

    /// `false` forever after the first successful [`emit`].
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.inner.written.load(Ordering::Acquire)
    }

    /// Number of emit attempts refused because the response was already written.
    #[must_use]
    pub fn rejected_emits(&self) -> usize {
        self.inner.rejected.load(Ordering::Relaxed)
    }

    /// Method form of [`emit`].
    ///
    /// # Errors
    ///
    /// See [`emit`].
    pub fn emit<T: Serialize + ?Sized>(&self, status: u16, data: &T) -> Result<()> {
        emit(self, status, data)
    }
}

/// Serialize `data` to JSON and write it with `status`, exactly once.
///
/// Pass `&Value::Null` (or `&None::<T>`) for an empty `null` body.
///
/// # Errors
///
/// - [`Error::AlreadyWritten`] when the response was already emitted; the
///   transport is left untouched.
/// - [`Error::InvalidArgument`] when `data` cannot be serialized; the response
///   stays writable so the caller can still send an error.
pub fn emit<T: Serialize + ?Sized>(response: &ResponseHandle, status: u16, data: &T) -> Result<()> {
    let body = serde_json::to_vec(data)
        .map_err(|e| Error::invalid(format!("response body is not serializable: {e}")))?;

    if response.inner.written.swap(true, Ordering::AcqRel) {
        response.inner.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(status, "Response already written; emit ignored");
        return Err(Error::AlreadyWritten);
    }

    let mut sink = response
        .inner
        .sink
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    sink.set_status(status);
    sink.set_header("Content-Type", "application/json");
    sink.write_body(&body);
    sink.finalize();
    debug!(status, body_bytes = body.len(), "Response emitted");
    Ok(())
}

pub(crate) fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

fn content_type_header(value: &str) -> Option<&'static str> {
    match value {
        "application/json" => Some("Content-Type: application/json"),
        "text/plain" => Some("Content-Type: text/plain"),
        _ => None,
    }
}

/// Copy a recorded response onto the `may_minihttp` response.
pub fn write_recorded(res: &mut Response, recorded: &RecordedResponse) {
    res.status_code(recorded.status as usize, status_reason(recorded.status));
    for (name, value) in &recorded.headers {
        if name.eq_ignore_ascii_case("content-type") {
            if let Some(header) = content_type_header(value) {
                res.header(header);
                continue;
            }
        }
        debug!(header = %name, "Dropping header without a static wire form");
    }
    res.body_vec(recorded.body.clone());
}

pub fn write_json_error(res: &mut Response, status: u16, body: Value) {
    let reason = status_reason(status);
    res.status_code(status as usize, reason);
    res.header("Content-Type: application/json");
    res.body_vec(body.to_string().into_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(405), "Method Not Allowed");
    }

    #[test]
    fn test_emit_writes_json_once() {
        let buffer = BufferedResponse::new();
        let handle = ResponseHandle::new(buffer.clone());
        assert!(handle.is_writable());

        emit(&handle, 200, &json!({"id": 1})).unwrap();
        assert!(!handle.is_writable());

        let recorded = buffer.recorded().unwrap();
        assert_eq!(recorded.status, 200);
        assert_eq!(recorded.header("content-type"), Some("application/json"));
        assert_eq!(recorded.json(), Some(json!({"id": 1})));
    }

    #[test]
    fn test_second_emit_rejected_without_touching_transport() {
        let buffer = BufferedResponse::new();
        let handle = ResponseHandle::new(buffer.clone());
        handle.emit(201, &Value::Null).unwrap();

        let err = handle.emit(500, &json!({"error": "late"})).unwrap_err();
        assert!(matches!(err, Error::AlreadyWritten));
        assert_eq!(handle.rejected_emits(), 1);
        assert_eq!(buffer.finalize_count(), 1);

        let recorded = buffer.recorded().unwrap();
        assert_eq!(recorded.status, 201);
        assert_eq!(recorded.body, b"null");
    }

    #[test]
    fn test_buffered_sink_is_not_writable_after_finalize() {
        let mut buffer = BufferedResponse::new();
        assert!(buffer.is_writable());
        buffer.set_status(204);
        buffer.finalize();
        assert!(!buffer.is_writable());
    }
}
