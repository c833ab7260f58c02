//! Units of work executed by processes
//!
//! A task is a boxed `FnOnce` closure. It runs exactly once, on its own host
//! thread, and whatever happens (a value, an error, a panic) is captured as a
//! [`TaskResult`]; nothing escapes into the kernel loop.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use nos_api::Pid;

use crate::sync::{AtomicBool, Ordering};

/// Outcome of a task: an optional printable result, or an error message
pub type TaskResult = std::result::Result<Option<String>, String>;

type TaskFn = Box<dyn FnOnce(&TaskContext) -> TaskResult + Send + 'static>;

/// Cooperative cancellation flag shared between a process and its task
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a lowered flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the flag has been raised
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a running task can see of its process
#[derive(Debug, Clone)]
pub struct TaskContext {
    pid: Pid,
    args: Arc<[String]>,
    cancel: CancelFlag,
}

impl TaskContext {
    pub(crate) fn new(pid: Pid, args: Arc<[String]>, cancel: CancelFlag) -> Self {
        Self { pid, args, cancel }
    }

    /// Pid of the owning process
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Arguments given at spawn time
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Set once the process is terminated or killed
    ///
    /// The kernel cannot preempt a task; long-running work should poll this
    /// and return early.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A process's unit of work
pub struct Task {
    work: TaskFn,
}

impl Task {
    /// Wrap a closure that receives the task context
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce(&TaskContext) -> TaskResult + Send + 'static,
    {
        Self { work: Box::new(work) }
    }

    /// Wrap a closure with no context and no result
    pub fn from_fn<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move |_| {
            work();
            Ok(None)
        })
    }

    /// A task that finishes immediately
    pub fn noop() -> Self {
        Self::new(|_| Ok(None))
    }

    /// Run to completion, converting a panic into an error
    pub(crate) fn run(self, ctx: &TaskContext) -> TaskResult {
        let work = self.work;
        match panic::catch_unwind(AssertUnwindSafe(|| work(ctx))) {
            Ok(result) => result,
            Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
