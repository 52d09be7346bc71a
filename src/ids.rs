//! Identifiers carried through logs.

use serde::Serialize;
use std::fmt::{Display, Formatter};
use ulid::Ulid;

/// Correlates every log line of one request, including lines written by the
/// tasks it spawned.
///
/// Taken from the client's `X-Request-Id` header when that holds a ULID,
/// minted otherwise.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(pub Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Reuse the client's id if it parses as a ULID, otherwise mint one.
    #[must_use]
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        match header_value.map(|v| Ulid::from_string(v.trim())) {
            Some(Ok(ulid)) => Self(ulid),
            _ => Self::new(),
        }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Process-unique task identifier, allocated by the scheduler in spawn order.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct TaskId(pub u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}
