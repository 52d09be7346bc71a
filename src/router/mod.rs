//! # Router Module
//!
//! Ordered, regex-based route table with first-match-wins dispatch.
//!
//! ## Overview
//!
//! - Templates such as `/things/{id}` or `/things/{id:[0-9]+}` compile into
//!   anchored regexes ([`RoutePattern`]) at startup.
//! - [`Router::route`] scans entries in insertion order. The first pattern
//!   that matches the path is selected; its handler for the request method
//!   runs, or the method-not-allowed handler (405) when there is none.
//! - After the scan, a response that is still writable gets the not-found
//!   handler (404). This includes a matched handler that wrote nothing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use http::Method;
//! use tasklane::router::Router;
//! use tasklane::server::{BufferedResponse, RequestContext, ResponseHandle};
//!
//! let mut router = Router::new();
//! router.add("/things/{id}", Method::GET, |_req, caps, res| {
//!     res.emit(200, &serde_json::json!({ "id": caps.name("id") }))
//! })?;
//!
//! let buffer = BufferedResponse::new();
//! let res = ResponseHandle::new(buffer.clone());
//! router.route(&RequestContext::new(Method::GET, "/things/7"), &res);
//! assert_eq!(buffer.recorded().unwrap().status, 200);
//! ```
//!
//! ## Performance
//!
//! Matching is O(n) in the number of entries. Route tables here are small and
//! the scan order is part of the contract, so there is no prefix index.

mod core;
mod pattern;
#[cfg(test)]
mod tests;

pub use self::core::{Dispatch, HandlerFn, RouteEntry, RouteInfo, Router};
pub use pattern::{Captures, ParamVec, RoutePattern};
