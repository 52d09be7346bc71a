//! Per-task deferred callback stack.

use std::fmt;
use tracing::error;

use crate::ids::TaskId;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Callbacks registered by a task body, run when the body finishes.
///
/// Run order is last-registered-first. A callback that panics is logged and the
/// rest of the stack still runs.
#[derive(Default)]
pub struct DeferStack {
    callbacks: Vec<Callback>,
}

impl fmt::Debug for DeferStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferStack")
            .field("pending", &self.callbacks.len())
            .finish()
    }
}

impl DeferStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Drain the stack LIFO. Returns how many callbacks panicked.
    pub fn run(&mut self, task_id: TaskId) -> usize {
        let mut panicked = 0;
        while let Some(callback) = self.callbacks.pop() {
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
                panicked += 1;
                error!(
                    task_id = %task_id,
                    panic_message = ?panic,
                    "Deferred callback panicked"
                );
            }
        }
        panicked
    }
}
