//! # Server Module
//!
//! HTTP transport on `may_minihttp` plus the per-request types handlers see.
//!
//! - [`RequestContext`]: immutable snapshot of one request (method, path,
//!   query, headers, body, pre-parsed JSON), shared by every task spawned for it.
//! - [`ResponseHandle`] and [`emit`]: the one-shot JSON response emitter. The
//!   first emit writes through a [`ResponseSink`]; every later one is rejected.
//! - [`AppService`]: the `HttpService` that parses, answers `GET /health`,
//!   routes, and copies the emitted response to the connection.
//! - [`HttpServer`] / [`ServerHandle`]: start, readiness probe, stop.

mod http_server;
mod request;
mod response;
mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_query_params, parse_request, JsonBody, RequestContext};
pub use response::{
    emit, write_json_error, write_recorded, BufferedResponse, RecordedResponse, ResponseHandle,
    ResponseSink,
};
pub use service::AppService;
