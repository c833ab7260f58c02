//! Process model
//!
//! A [`Process`] is shared as `Arc<Process>` between the process table, the
//! scheduler and the worker thread running its task. Identity fields are
//! immutable; everything that changes lives behind the `control` lock, which
//! is the innermost lock in the kernel.

pub mod task;

pub use task::{CancelFlag, Task, TaskContext, TaskResult};

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, SystemTime};

use hashbrown::HashMap;
use serde::Serialize;

use nos_api::{Pid, Priority, ProcessState, Signal, Size};

use crate::signal::SignalHandler;
use crate::sync::Mutex;

// ============================================================================
// Types
// ============================================================================

/// Options accepted by `Kernel::spawn`
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Scheduling priority, config default when `None`
    pub priority: Option<Priority>,
    /// Bytes to reserve, config default when `None`
    pub memory: Option<Size>,
    /// Parent process, if any
    pub parent_pid: Option<Pid>,
    /// Arguments visible to the task
    pub args: Vec<String>,
}

impl SpawnOptions {
    /// Options with every field defaulted
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the memory reservation
    pub fn memory(mut self, bytes: Size) -> Self {
        self.memory = Some(bytes);
        self
    }

    /// Set the parent pid
    pub fn parent(mut self, pid: Pid) -> Self {
        self.parent_pid = Some(pid);
        self
    }

    /// Set the task arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// One entry of a process's syscall log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyscallRecord {
    /// Syscall name
    pub name: String,
    /// Time spent in the call
    pub duration: Duration,
}

/// Mutable process state
pub(crate) struct ProcessControl {
    pub(crate) state: ProcessState,
    pub(crate) cpu_time: Duration,
    pub(crate) result: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) pending_signals: Vec<Signal>,
    pub(crate) signal_handlers: HashMap<Signal, SignalHandler>,
    pub(crate) voluntary_switches: u64,
    pub(crate) involuntary_switches: u64,
    pub(crate) read_bytes: u64,
    pub(crate) write_bytes: u64,
    pub(crate) syscall_count: u64,
    pub(crate) syscall_log: Vec<SyscallRecord>,
}

impl ProcessControl {
    fn new() -> Self {
        Self {
            state: ProcessState::New,
            cpu_time: Duration::ZERO,
            result: None,
            error: None,
            pending_signals: Vec::new(),
            signal_handlers: HashMap::new(),
            voluntary_switches: 0,
            involuntary_switches: 0,
            read_bytes: 0,
            write_bytes: 0,
            syscall_count: 0,
            syscall_log: Vec::new(),
        }
    }
}

/// A simulated process
pub struct Process {
    pid: Pid,
    name: String,
    priority: Priority,
    created_at: SystemTime,
    parent_pid: Option<Pid>,
    memory_usage: Size,
    args: Arc<[String]>,
    cancel: CancelFlag,
    control: Mutex<ProcessControl>,
    task: Mutex<Option<Task>>,
    /// Completion channel of a task that outlived its quantum
    inflight: Mutex<Option<Receiver<()>>>,
}

/// Point-in-time view of a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: String,
    pub state: ProcessState,
    pub priority: Priority,
    pub created_at: SystemTime,
    pub parent_pid: Option<Pid>,
    pub args: Vec<String>,
    pub cpu_time: Duration,
    pub memory_usage: Size,
    pub result: Option<String>,
    pub error: Option<String>,
    pub pending_signals: Vec<Signal>,
    /// Signals with a registered handler, sorted
    pub handled_signals: Vec<Signal>,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub syscall_count: u64,
}

// ============================================================================
// Process
// ============================================================================

impl Process {
    /// Create a process in the `New` state
    pub fn new(
        pid: Pid,
        name: impl Into<String>,
        task: Task,
        priority: Priority,
        memory_usage: Size,
    ) -> Self {
        Self::with_options(pid, name.into(), task, priority, memory_usage, None, Vec::new())
    }

    pub(crate) fn with_options(
        pid: Pid,
        name: String,
        task: Task,
        priority: Priority,
        memory_usage: Size,
        parent_pid: Option<Pid>,
        args: Vec<String>,
    ) -> Self {
        Self {
            pid,
            name,
            priority,
            created_at: SystemTime::now(),
            parent_pid,
            memory_usage,
            args: Arc::from(args),
            cancel: CancelFlag::new(),
            control: Mutex::new(ProcessControl::new()),
            task: Mutex::new(Some(task)),
            inflight: Mutex::new(None),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn parent_pid(&self) -> Option<Pid> {
        self.parent_pid
    }

    /// Bytes reserved at creation
    pub fn memory_usage(&self) -> Size {
        self.memory_usage
    }

    pub fn state(&self) -> ProcessState {
        self.control.lock().state
    }

    /// Whether termination has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Snapshot of every field
    pub fn info(&self) -> ProcessInfo {
        let control = self.control.lock();
        let mut handled_signals: Vec<Signal> = control.signal_handlers.keys().copied().collect();
        handled_signals.sort();
        ProcessInfo {
            pid: self.pid,
            name: self.name.clone(),
            state: control.state,
            priority: self.priority,
            created_at: self.created_at,
            parent_pid: self.parent_pid,
            args: self.args.to_vec(),
            cpu_time: control.cpu_time,
            memory_usage: self.memory_usage,
            result: control.result.clone(),
            error: control.error.clone(),
            pending_signals: control.pending_signals.clone(),
            handled_signals,
            voluntary_switches: control.voluntary_switches,
            involuntary_switches: control.involuntary_switches,
            read_bytes: control.read_bytes,
            write_bytes: control.write_bytes,
            syscall_count: control.syscall_count,
        }
    }

    // ------------------------------------------------------------------------
    // State transitions
    // ------------------------------------------------------------------------

    /// Move `from -> to` iff the current state satisfies `from`
    ///
    /// Returns the previous state on success. `Terminated` is never left.
    pub(crate) fn transition(
        &self,
        from: impl Fn(ProcessState) -> bool,
        to: ProcessState,
    ) -> Option<ProcessState> {
        let mut control = self.control.lock();
        let prev = control.state;
        if prev.is_terminal() || !from(prev) {
            return None;
        }
        control.state = to;
        Some(prev)
    }

    /// `New | Ready -> Ready`
    ///
    /// A stopped or running process is left alone; resuming goes through an
    /// explicit `Stopped -> Ready` transition first.
    pub(crate) fn admit(&self) -> bool {
        self.transition(
            |s| matches!(s, ProcessState::New | ProcessState::Ready),
            ProcessState::Ready,
        )
        .is_some()
    }

    /// Force `Terminated` and raise the cancellation flag
    ///
    /// Returns false if the process was already terminated.
    pub(crate) fn force_terminate(&self) -> bool {
        self.cancel.cancel();
        let mut control = self.control.lock();
        if control.state.is_terminal() {
            return false;
        }
        control.state = ProcessState::Terminated;
        true
    }

    /// Record the task's outcome and terminate
    pub(crate) fn complete(&self, outcome: TaskResult, elapsed: Duration) {
        let mut control = self.control.lock();
        control.cpu_time += elapsed;
        match outcome {
            Ok(result) => control.result = result,
            Err(error) => control.error = Some(error),
        }
        control.state = ProcessState::Terminated;
    }

    /// Terminate without having run, e.g. when no worker could be started
    pub(crate) fn fail(&self, error: String) {
        let mut control = self.control.lock();
        control.error = Some(error);
        control.state = ProcessState::Terminated;
    }

    // ------------------------------------------------------------------------
    // Task handling
    // ------------------------------------------------------------------------

    pub(crate) fn task_context(&self) -> TaskContext {
        TaskContext::new(self.pid, Arc::clone(&self.args), self.cancel.clone())
    }

    /// Take the task if it has not started yet
    pub(crate) fn take_task(&self) -> Option<Task> {
        self.task.lock().take()
    }

    pub(crate) fn take_inflight(&self) -> Option<Receiver<()>> {
        self.inflight.lock().take()
    }

    pub(crate) fn store_inflight(&self, done: Receiver<()>) {
        *self.inflight.lock() = Some(done);
    }

    // ------------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------------

    pub(crate) fn with_control<R>(&self, f: impl FnOnce(&mut ProcessControl) -> R) -> R {
        f(&mut self.control.lock())
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_process_defaults() {
        let p = Process::new(1, "init", Task::noop(), 5, 1024);
        let info = p.info();
        assert_eq!(info.pid, 1);
        assert_eq!(info.name, "init");
        assert_eq!(info.state, ProcessState::New);
        assert_eq!(info.memory_usage, 1024);
        assert_eq!(info.cpu_time, Duration::ZERO);
        assert!(info.result.is_none() && info.error.is_none());
    }

    #[test]
    fn test_terminated_is_absorbing() {
        let p = Process::new(1, "sh", Task::noop(), 5, 0);
        assert!(p.admit());
        assert!(p.force_terminate());
        assert!(!p.force_terminate());
        assert!(!p.admit());
        assert!(p.transition(|_| true, ProcessState::Running).is_none());
        assert_eq!(p.state(), ProcessState::Terminated);
        assert!(p.is_cancelled());
    }

    #[test]
    fn test_guarded_transition() {
        let p = Process::new(2, "cat", Task::noop(), 5, 0);
        p.admit();
        let prev = p.transition(|s| s == ProcessState::Running, ProcessState::Stopped);
        assert!(prev.is_none());
        let prev = p.transition(|s| s == ProcessState::Ready, ProcessState::Running);
        assert_eq!(prev, Some(ProcessState::Ready));
        assert_eq!(p.state(), ProcessState::Running);
    }

    #[test]
    fn test_complete_records_outcome() {
        let p = Process::new(3, "job", Task::noop(), 5, 0);
        p.complete(Err("exit 1".into()), Duration::from_millis(4));
        let info = p.info();
        assert_eq!(info.state, ProcessState::Terminated);
        assert_eq!(info.error.as_deref(), Some("exit 1"));
        assert_eq!(info.cpu_time, Duration::from_millis(4));
    }

    #[test]
    fn test_admit_leaves_stopped_alone() {
        let p = Process::new(5, "fg", Task::noop(), 5, 0);
        assert!(p.admit());
        assert!(p.admit());
        p.transition(|_| true, ProcessState::Stopped);
        assert!(!p.admit());
        assert_eq!(p.state(), ProcessState::Stopped);
        p.transition(|_| true, ProcessState::Running);
        assert!(!p.admit());
        assert_eq!(p.state(), ProcessState::Running);
    }

    #[test]
    fn test_task_taken_once() {
        let p = Process::new(4, "once", Task::noop(), 5, 0);
        assert!(p.take_task().is_some());
        assert!(p.take_task().is_none());
    }

    #[test]
    fn test_spawn_options_builder() {
        let opts = SpawnOptions::new().priority(1).memory(64).parent(9).args(["a", "b"]);
        assert_eq!(opts.priority, Some(1));
        assert_eq!(opts.memory, Some(64));
        assert_eq!(opts.parent_pid, Some(9));
        assert_eq!(opts.args, vec!["a".to_string(), "b".to_string()]);
    }
}
