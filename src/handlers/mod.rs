//! # Handlers Module
//!
//! The `/things` resource: list, fetch, create and update rows in the
//! `things` table through the [`Backend`].
//!
//! | Method | Path           | Success                    | Empty         |
//! |--------|----------------|----------------------------|---------------|
//! | GET    | `/things`      | 200, array of rows         | 404 `null`    |
//! | GET    | `/things/{id}` | 200, row object            | 404 `null`    |
//! | POST   | `/things`      | 201 `null`, insert runs later |            |
//! | PUT    | `/things/{id}` | 201, updated row           | 404 `null`    |
//!
//! POST answers before the insert task has run. PUT hands the update to a
//! task and waits for its result on a capacity-1 [`HandoffChannel`], so the
//! response carries the re-selected row.
//!
//! [`HandoffChannel`]: crate::channel::HandoffChannel

mod things;

use http::Method;
use std::sync::Arc;

use crate::backend::Backend;
use crate::error::Result;
use crate::router::Router;
use crate::scheduler::Scheduler;

pub use things::ThingsApi;

/// Everything handlers need: where to spawn tasks and where to send queries.
#[derive(Debug, Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub backend: Backend,
}

/// Build the application's route table.
///
/// # Errors
///
/// Only if a route template fails to compile.
pub fn build_router(state: AppState) -> Result<Router> {
    let api = Arc::new(ThingsApi::new(state));
    let mut router = Router::new();

    let list = Arc::clone(&api);
    router.add("/things", Method::GET, move |req, _, res| {
        list.list(req, res)
    })?;
    let create = Arc::clone(&api);
    router.add("/things", Method::POST, move |req, _, res| {
        create.create(req, res)
    })?;
    let get = Arc::clone(&api);
    router.add("/things/{id:[0-9]+}", Method::GET, move |req, caps, res| {
        get.get(req, caps, res)
    })?;
    let update = api;
    router.add("/things/{id:[0-9]+}", Method::PUT, move |req, caps, res| {
        update.update(req, caps, res)
    })?;

    Ok(router)
}
