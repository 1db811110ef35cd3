use std::any::Any;
use std::fmt;

/// The piece of handler-pool machinery that was running when a task panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// The `init` closure supplied when a cell was created.
    Init,
    /// A `when` combine callback.
    Combine,
    /// A key's `resolve` or `fallback` call.
    Resolver,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Init => "init",
            TaskKind::Combine => "combine",
            TaskKind::Resolver => "resolver",
        })
    }
}

/// A task submitted to the handler pool panicked instead of completing.
///
/// The pool catches panics at task boundaries (per `spec.md` §4.3's
/// "individual task failures (e.g. a panic) must not corrupt pool state or
/// deadlock other cells") and routes them here instead of letting them
/// unwind across worker threads.
#[derive(thiserror::Error)]
#[error("{kind} task panicked: {message}")]
pub struct TaskError {
    kind: TaskKind,
    message: String,
    payload: Box<dyn Any + Send + 'static>,
}

impl TaskError {
    pub(crate) fn new(kind: TaskKind, payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = panic_message(&payload);
        Self { kind, message, payload }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// The raw panic payload, for callers that want to downcast it further.
    pub fn payload(&self) -> &(dyn Any + Send + 'static) {
        &*self.payload
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send + 'static)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
