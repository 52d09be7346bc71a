use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::request::parse_request;
use super::response::{write_json_error, write_recorded, BufferedResponse, ResponseHandle};
use crate::router::Router;
use crate::scheduler::Scheduler;

/// `may_minihttp` service: parse, route, then copy the emitted response out.
///
/// Routing runs on the connection's own coroutine. Whatever the router has
/// emitted by the time [`Router::route`] returns is what goes on the wire;
/// a later emit from a spawned task is rejected by the response guard.
#[derive(Clone)]
pub struct AppService {
    pub router: Arc<Router>,
    pub scheduler: Scheduler,
}

impl AppService {
    #[must_use]
    pub fn new(router: Arc<Router>, scheduler: Scheduler) -> Self {
        Self { router, scheduler }
    }
}

/// `GET /health`: liveness plus scheduler counters.
fn health_endpoint(res: &mut Response, scheduler: &Scheduler) {
    let body = json!({ "status": "ok", "tasks": scheduler.stats() });
    res.status_code(200, "OK");
    res.header("Content-Type: application/json");
    res.body_vec(body.to_string().into_bytes());
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let start = Instant::now();
        let ctx = match parse_request(req) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(error = %e, "Rejecting unparseable request");
                write_json_error(res, e.status(), json!({ "error": e.to_string() }));
                return Ok(());
            }
        };

        if ctx.method == http::Method::GET && ctx.path == "/health" {
            health_endpoint(res, &self.scheduler);
            return Ok(());
        }

        let buffer = BufferedResponse::new();
        let handle = ResponseHandle::new(buffer.clone());
        let dispatch = self.router.route(&ctx, &handle);

        let status = match buffer.recorded() {
            Some(recorded) => {
                write_recorded(res, &recorded);
                recorded.status
            }
            None => {
                // The not-found fallback always emits, so this needs a failing fallback handler.
                error!(request_id = %ctx.request_id, "No response emitted");
                write_json_error(res, 500, json!({ "error": "Internal Server Error" }));
                500
            }
        };

        info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            route = ?dispatch.matched,
            status,
            latency_us = start.elapsed().as_micros() as u64,
            "Request complete"
        );
        Ok(())
    }
}
