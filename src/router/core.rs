use http::Method;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::pattern::{Captures, RoutePattern};
use crate::error::{Error, Result};
use crate::server::{emit, RequestContext, ResponseHandle};

/// Request handler signature.
///
/// A handler may emit synchronously, hand the [`ResponseHandle`] to a spawned
/// task, or do neither. An `Err` is turned into an error response when the
/// response is still writable.
pub type HandlerFn =
    Arc<dyn Fn(&RequestContext, &Captures, &ResponseHandle) -> Result<()> + Send + Sync>;

/// One template and the handlers registered for it, keyed by method.
pub struct RouteEntry {
    pattern: RoutePattern,
    handlers: HashMap<Method, HandlerFn>,
}

impl RouteEntry {
    #[must_use]
    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// Methods with a handler, sorted for stable output.
    #[must_use]
    pub fn methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.keys().cloned().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("template", &self.pattern.template())
            .field("methods", &self.methods())
            .finish()
    }
}

/// What [`Router::route`] did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Template of the first entry whose pattern matched the path
    pub matched: Option<Arc<str>>,
    /// Whether that entry had a handler for the request method
    pub method_allowed: bool,
    /// Whether the not-found handler ran after the scan
    pub not_found: bool,
}

/// Row of [`Router::routes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub template: String,
    pub methods: Vec<String>,
}

/// Ordered route table.
///
/// Entries are scanned in insertion order and the first pattern that matches
/// the path wins, even when a later entry would also match. The table is
/// immutable once built; share it behind an `Arc`.
pub struct Router {
    entries: Vec<RouteEntry>,
    not_found: HandlerFn,
    method_not_allowed: HandlerFn,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("entries", &self.entries)
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn default_not_found() -> HandlerFn {
    Arc::new(|req: &RequestContext, _: &Captures, res: &ResponseHandle| {
        let err = Error::RouteNotFound {
            path: req.path.clone(),
        };
        emit(
            res,
            err.status(),
            &json!({ "error": "Not Found", "method": req.method.as_str(), "path": req.path }),
        )
    })
}

fn default_method_not_allowed() -> HandlerFn {
    Arc::new(|req: &RequestContext, _: &Captures, res: &ResponseHandle| {
        let err = Error::MethodNotAllowed {
            method: req.method.to_string(),
            path: req.path.clone(),
        };
        let body = json!({
            "error": "Method Not Allowed",
            "method": req.method.as_str(),
            "path": req.path,
        });
        emit(res, err.status(), &body)
    })
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            not_found: default_not_found(),
            method_not_allowed: default_method_not_allowed(),
        }
    }

    /// Register `handler` for `method` on `template`.
    ///
    /// Registering another method on a template that already exists extends
    /// that entry and keeps its position. Registering the same method twice
    /// replaces the earlier handler.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when the template does not compile.
    pub fn add<H>(&mut self, template: &str, method: Method, handler: H) -> Result<&mut Self>
    where
        H: Fn(&RequestContext, &Captures, &ResponseHandle) -> Result<()> + Send + Sync + 'static,
    {
        let handler: HandlerFn = Arc::new(handler);
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.pattern.template() == template)
        {
            if entry.handlers.insert(method.clone(), handler).is_some() {
                warn!(template, method = %method, "Replacing existing route handler");
            }
            return Ok(self);
        }

        let pattern = RoutePattern::compile(template)?;
        let mut handlers = HashMap::new();
        handlers.insert(method.clone(), handler);
        self.entries.push(RouteEntry { pattern, handlers });
        debug!(template, method = %method, position = self.entries.len() - 1, "Route added");
        Ok(self)
    }

    pub fn set_not_found<H>(&mut self, handler: H) -> &mut Self
    where
        H: Fn(&RequestContext, &Captures, &ResponseHandle) -> Result<()> + Send + Sync + 'static,
    {
        self.not_found = Arc::new(handler);
        self
    }

    pub fn set_method_not_allowed<H>(&mut self, handler: H) -> &mut Self
    where
        H: Fn(&RequestContext, &Captures, &ResponseHandle) -> Result<()> + Send + Sync + 'static,
    {
        self.method_not_allowed = Arc::new(handler);
        self
    }

    #[must_use]
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Route table in match order.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.entries
            .iter()
            .map(|e| RouteInfo {
                template: e.pattern.template().to_string(),
                methods: e.methods().iter().map(ToString::to_string).collect(),
            })
            .collect()
    }

    /// Print the route table, one line per method, in match order.
    pub fn dump_routes(&self) {
        for entry in &self.entries {
            for method in entry.methods() {
                println!("[route] {} {}", method, entry.pattern.template());
            }
        }
    }

    /// Dispatch one request.
    ///
    /// 1. Scan entries in order; the first whose pattern matches the path is
    ///    selected and the scan stops.
    /// 2. Run the handler for the request method, or the method-not-allowed
    ///    handler when the entry has none.
    /// 3. After the scan, if the response is still writable, run the
    ///    not-found handler.
    ///
    /// Step 3 checks writability rather than whether anything matched. A
    /// handler that matched but neither emitted synchronously nor failed
    /// therefore still produces a 404, and a task it spawned to answer later
    /// finds the response already written.
    pub fn route(&self, req: &RequestContext, res: &ResponseHandle) -> Dispatch {
        let mut dispatch = Dispatch {
            matched: None,
            method_allowed: false,
            not_found: false,
        };

        for entry in &self.entries {
            let Some(captures) = entry.pattern.captures(&req.path) else {
                continue;
            };
            dispatch.matched = Some(entry.pattern.template_arc());
            match entry.handlers.get(&req.method) {
                Some(handler) => {
                    dispatch.method_allowed = true;
                    debug!(
                        request_id = %req.request_id,
                        template = %entry.pattern.template(),
                        method = %req.method,
                        params = ?captures,
                        "Route matched"
                    );
                    self.invoke(handler, req, &captures, res);
                }
                None => {
                    warn!(
                        request_id = %req.request_id,
                        template = %entry.pattern.template(),
                        method = %req.method,
                        "Method not allowed"
                    );
                    self.invoke(&self.method_not_allowed, req, &captures, res);
                }
            }
            break;
        }

        if res.is_writable() {
            if dispatch.matched.is_some() {
                info!(
                    request_id = %req.request_id,
                    method = %req.method,
                    path = %req.path,
                    "Handler left response unwritten; answering 404"
                );
            } else {
                debug!(
                    request_id = %req.request_id,
                    method = %req.method,
                    path = %req.path,
                    "No route matched"
                );
            }
            dispatch.not_found = true;
            self.invoke(&self.not_found, req, &Captures::default(), res);
        }

        dispatch
    }

    fn invoke(
        &self,
        handler: &HandlerFn,
        req: &RequestContext,
        captures: &Captures,
        res: &ResponseHandle,
    ) {
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(req, captures, res)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let status = err.status();
                if status >= 500 {
                    error!(request_id = %req.request_id, error = %err, status, "Handler failed");
                } else {
                    warn!(
                        request_id = %req.request_id,
                        error = %err,
                        status,
                        "Handler rejected request"
                    );
                }
                if res.is_writable() {
                    if let Err(e) = emit(res, status, &json!({ "error": err.to_string() })) {
                        debug!(error = %e, "Error response not written");
                    }
                }
            }
            Err(panic) => {
                error!(request_id = %req.request_id, panic_message = ?panic, "Handler panicked");
                if res.is_writable() {
                    if let Err(e) = emit(res, 500, &json!({ "error": "Internal Server Error" })) {
                        debug!(error = %e, "Error response not written");
                    }
                }
            }
        }
    }
}
