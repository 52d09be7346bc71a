use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

use super::AppState;
use crate::backend::BackendError;
use crate::channel::HandoffChannel;
use crate::error::{Error, Result};
use crate::router::Captures;
use crate::server::{RequestContext, ResponseHandle};

const LIST_THINGS: &str = "SELECT id, name FROM things ORDER BY id";
const SELECT_THING: &str = "SELECT id, name FROM things WHERE id = ?1";
const INSERT_THING: &str = "INSERT INTO things (name) VALUES (?1)";
const UPDATE_THING: &str = "UPDATE things SET name = ?1 WHERE id = ?2";

/// Handlers for the `/things` resource.
#[derive(Debug)]
pub struct ThingsApi {
    state: AppState,
}

fn thing_id(caps: &Captures) -> Result<i64> {
    let raw = caps
        .name("id")
        .ok_or_else(|| Error::invalid("missing thing id"))?;
    raw.parse()
        .map_err(|_| Error::invalid(format!("thing id '{raw}' is out of range")))
}

/// The `name` field exactly as sent; any string is accepted, empty included.
fn thing_name(req: &RequestContext) -> Result<String> {
    Ok(req.json_str_field("name")?.to_string())
}

impl ThingsApi {
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// `GET /things`
    pub fn list(&self, _req: &RequestContext, res: &ResponseHandle) -> Result<()> {
        let rows = self.state.backend.execute(LIST_THINGS, Vec::new())?;
        if rows.is_empty() {
            return res.emit(404, &Value::Null);
        }
        res.emit(200, &rows)
    }

    /// `GET /things/{id}`
    pub fn get(
        &self,
        _req: &RequestContext,
        caps: &Captures,
        res: &ResponseHandle,
    ) -> Result<()> {
        let id = thing_id(caps)?;
        let rows = self.state.backend.execute(SELECT_THING, vec![id.into()])?;
        match rows.first() {
            Some(row) => res.emit(200, row),
            None => res.emit(404, &Value::Null),
        }
    }

    /// `POST /things`: answer 201 at once, insert on a background task.
    pub fn create(&self, req: &RequestContext, res: &ResponseHandle) -> Result<()> {
        let name = thing_name(req)?;
        res.emit(201, &Value::Null)?;

        let backend = self.state.backend.clone();
        let request_id = req.request_id;
        self.state.scheduler.spawn("insert-thing", move |task| {
            let task_id = task.id();
            let started = Instant::now();
            task.defer(move || {
                info!(
                    %task_id,
                    %request_id,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "Insert task finished"
                );
            });
            task.query(&backend, INSERT_THING, vec![name.into()])?;
            Ok(())
        });
        Ok(())
    }

    /// `PUT /things/{id}`: update on a task, wait for it, then re-select.
    pub fn update(
        &self,
        req: &RequestContext,
        caps: &Captures,
        res: &ResponseHandle,
    ) -> Result<()> {
        let id = thing_id(caps)?;
        let name = thing_name(req)?;

        let handoff: HandoffChannel<std::result::Result<(), BackendError>> =
            HandoffChannel::new(1)?;
        let done = handoff.clone();
        let backend = self.state.backend.clone();
        let request_id = req.request_id;
        self.state.scheduler.spawn("update-thing", move |task| {
            let task_id = task.id();
            task.defer(move || {
                debug!(%task_id, %request_id, thing_id = id, "Update task finished");
            });
            let outcome = task
                .query(&backend, UPDATE_THING, vec![name.into(), id.into()])
                .map(|_| ());
            task.push(&done, outcome.clone());
            outcome.map_err(Error::from)
        });

        handoff.pop()?;
        let rows = self.state.backend.execute(SELECT_THING, vec![id.into()])?;
        match rows.first() {
            Some(row) => res.emit(201, row),
            None => res.emit(404, &Value::Null),
        }
    }
}
