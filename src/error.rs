//! Error taxonomy shared by the scheduler, channels, router and emitter.

use std::fmt;

use crate::backend::BackendError;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the concurrency core and the routing layer.
///
/// Errors raised inside a spawned task never propagate to the spawner. They are
/// either turned into a response by the task that owns it, or logged when the
/// task terminates.
#[derive(Debug)]
pub enum Error {
    /// No route pattern matched the request path
    RouteNotFound {
        /// Request path that failed to match
        path: String,
    },
    /// A route pattern matched but no handler exists for the request method
    MethodNotAllowed {
        /// Request method
        method: String,
        /// Request path
        path: String,
    },
    /// Query execution failed in the backend collaborator
    Backend(BackendError),
    /// Malformed input: channel capacity, route template, JSON body, etc.
    InvalidArgument(String),
    /// The response for this request has already been emitted
    AlreadyWritten,
    /// Transport-level failure
    Io(std::io::Error),
}

impl Error {
    /// Convenience constructor for [`Error::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// HTTP status code this error maps to when it reaches a writable response.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Error::RouteNotFound { .. } => 404,
            Error::MethodNotAllowed { .. } => 405,
            Error::InvalidArgument(_) => 400,
            Error::Backend(_) | Error::AlreadyWritten | Error::Io(_) => 500,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RouteNotFound { path } => write!(f, "no route matches path '{path}'"),
            Error::MethodNotAllowed { method, path } => {
                write!(f, "method {method} is not allowed on '{path}'")
            }
            Error::Backend(e) => write!(f, "backend error: {e}"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::AlreadyWritten => write!(f, "response has already been written"),
            Error::Io(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Backend(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for Error {
    fn from(e: BackendError) -> Self {
        Error::Backend(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
