//! The hosted kernel
//!
//! [`Kernel`] owns the process table and composes the memory ledger, the
//! scheduler and the IPC registry. A background loop thread repeatedly asks
//! the scheduler for a process and lets its task run for one quantum:
//!
//! - a task that has not started gets a fresh worker thread;
//! - the loop waits at most one quantum for the worker to report back;
//! - if the worker is still busy, its completion channel is parked on the
//!   process and the next turn simply waits on it again.
//!
//! Tasks cannot be preempted. Terminating a process flips its state, frees
//! its memory and raises its cancellation flag; the worker thread keeps
//! running until the task returns.

pub mod stats;

pub use stats::{CpuStats, IoOp, IoStats, SystemInfo};

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hashbrown::HashMap;

use nos_api::{Error, MemoryAccounting, MemoryStats, Pid, Priority, ProcessState, Result, Size};
use nos_memory_management::MemoryManager;

use crate::config::KernelConfig;
use crate::ipc::IpcManager;
use crate::process::{Process, ProcessInfo, SpawnOptions, SyscallRecord, Task};
use crate::sched::Scheduler;
use crate::sync::{AtomicBool, AtomicU32, Mutex, Ordering, Sleeplock};
use crate::{kernel_debug, kernel_error, kernel_info, kernel_warn};
use stats::KernelStats;

/// First pid handed out
pub const FIRST_PID: Pid = 1;

/// Hosted kernel instance
pub struct Kernel {
    config: KernelConfig,
    memory: Arc<dyn MemoryAccounting>,
    scheduler: Scheduler,
    ipc: Arc<IpcManager>,
    processes: Mutex<HashMap<Pid, Arc<Process>>>,
    next_pid: AtomicU32,
    running: AtomicBool,
    boot_time: Mutex<Option<Instant>>,
    loop_thread: Sleeplock<Option<LoopHandle>>,
    stats: KernelStats,
}

/// The loop thread plus a channel that disconnects when it exits
struct LoopHandle {
    thread: JoinHandle<()>,
    exited: Receiver<()>,
}

impl Kernel {
    /// Create a kernel with its own memory ledger and IPC registry
    pub fn new(config: KernelConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let memory: Arc<dyn MemoryAccounting> = Arc::new(MemoryManager::new(config.total_memory));
        let ipc = Arc::new(IpcManager::new(config.ipc.clone()));
        Self::with_components(config, memory, ipc)
    }

    /// Create a kernel around existing collaborators
    pub fn with_components(
        config: KernelConfig,
        memory: Arc<dyn MemoryAccounting>,
        ipc: Arc<IpcManager>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let scheduler = Scheduler::new(config.time_quantum(), config.idle_poll());
        Ok(Arc::new(Self {
            config,
            memory,
            scheduler,
            ipc,
            processes: Mutex::new(HashMap::new()),
            next_pid: AtomicU32::new(FIRST_PID),
            running: AtomicBool::new(false),
            boot_time: Mutex::new(None),
            loop_thread: Sleeplock::new(None),
            stats: KernelStats::default(),
        }))
    }

    // ========================================================================
    // Lifecycle of the kernel itself
    // ========================================================================

    /// Start the background scheduling loop
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.loop_thread.lock();
        if slot.is_some() {
            return Err(Error::InvalidState("kernel already running".into()));
        }
        self.running.store(true, Ordering::Release);
        self.boot_time.lock().get_or_insert_with(Instant::now);

        let kernel = Arc::downgrade(self);
        let (exit_tx, exited) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("nos-kernel".into())
            .spawn(move || {
                // Dropped on return or unwind, which disconnects `exited`
                let _exit = exit_tx;
                kernel_loop(kernel);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                Error::InvalidState(format!("cannot spawn kernel loop: {}", e))
            })?;
        *slot = Some(LoopHandle { thread, exited });
        kernel_info!(
            "kernel started: {} bytes, quantum {:?}",
            self.memory.total_memory(),
            self.config.time_quantum()
        );
        Ok(())
    }

    /// Stop the loop, waiting up to the configured shutdown timeout
    ///
    /// A loop stuck waiting on a worker past the timeout is detached.
    pub fn stop(&self) {
        let Some(handle) = self.loop_thread.lock().take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        self.scheduler.wake();

        let timeout = self.config.shutdown_timeout();
        match handle.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.thread.join().is_err() {
                    kernel_error!("kernel loop panicked");
                }
                kernel_info!("kernel stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                kernel_warn!("kernel loop still busy after {:?}, detaching", timeout);
            }
        }
    }

    /// Whether the loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one scheduling round on the calling thread
    ///
    /// Returns whether a process was dispatched. The background loop is just
    /// this in a loop.
    pub fn run_once(&self) -> bool {
        let idle_from = Instant::now();
        let Some(process) = self.scheduler.schedule() else {
            self.stats.add_idle(idle_from.elapsed());
            return false;
        };
        let busy_from = Instant::now();
        self.dispatch(&process);
        self.stats.add_busy(busy_from.elapsed());
        true
    }

    fn dispatch(&self, process: &Arc<Process>) {
        // Killed between being picked and being dispatched
        if process.is_cancelled() {
            return;
        }
        if let Some(task) = process.take_task() {
            match self.start_worker(process, task) {
                Ok(done) => self.await_worker(process, done),
                Err(e) => {
                    kernel_error!("pid {}: {}", process.pid(), e);
                    self.memory.free(process.pid());
                    self.ipc.detach_all(process.pid());
                    process.fail(e.to_string());
                }
            }
        } else if let Some(done) = process.take_inflight() {
            self.await_worker(process, done);
        }
    }

    fn start_worker(&self, process: &Arc<Process>, task: Task) -> Result<Receiver<()>> {
        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(process);
        let memory = Arc::clone(&self.memory);
        let ipc = Arc::clone(&self.ipc);
        thread::Builder::new()
            .name(format!("pid-{}", process.pid()))
            .spawn(move || {
                run_task(&worker, task, memory.as_ref(), &ipc);
                let _ = tx.send(());
            })
            .map_err(|e| Error::InvalidState(format!("cannot spawn worker: {}", e)))?;
        kernel_debug!("pid {} ({}) dispatched", process.pid(), process.name());
        Ok(rx)
    }

    fn await_worker(&self, process: &Arc<Process>, done: Receiver<()>) {
        match done.recv_timeout(self.scheduler.time_quantum()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                process.with_control(|c| c.voluntary_switches += 1);
            }
            Err(RecvTimeoutError::Timeout) => {
                process.with_control(|c| c.involuntary_switches += 1);
                self.stats.quantum_expired();
                kernel_debug!("pid {} used its full quantum", process.pid());
                process.store_inflight(done);
            }
        }
    }

    // ========================================================================
    // Process management
    // ========================================================================

    /// Create a process and hand it to the scheduler
    ///
    /// The memory is reserved first; on `OutOfMemory` nothing is inserted.
    pub fn create_process(
        &self,
        name: &str,
        task: Task,
        priority: Priority,
        memory: Size,
    ) -> Result<Pid> {
        self.spawn(name, task, SpawnOptions::new().priority(priority).memory(memory))
    }

    /// Create a process, taking unset options from the config
    pub fn spawn(&self, name: &str, task: Task, options: SpawnOptions) -> Result<Pid> {
        if let Some(ppid) = options.parent_pid {
            if !self.processes.lock().contains_key(&ppid) {
                return Err(Error::NotFound(format!("parent pid {}", ppid)));
            }
        }
        let priority = options.priority.unwrap_or(self.config.default_priority);
        let memory = options.memory.unwrap_or(self.config.default_process_memory);

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.memory.allocate(pid, memory) {
            kernel_warn!("cannot create '{}': {}", name, e);
            return Err(e);
        }

        let process = Arc::new(Process::with_options(
            pid,
            name.to_string(),
            task,
            priority,
            memory,
            options.parent_pid,
            options.args,
        ));
        self.processes.lock().insert(pid, Arc::clone(&process));
        self.scheduler.add_process(process);
        kernel_info!("pid {} ({}) created with {} bytes", pid, name, memory);
        Ok(pid)
    }

    /// Terminate a process
    ///
    /// Memory is freed and shared memory detached even if the process had
    /// already terminated.
    pub fn terminate_process(&self, pid: Pid) -> Result<()> {
        let process = self.lookup(pid)?;
        self.terminate(&process);
        Ok(())
    }

    pub(crate) fn terminate(&self, process: &Process) {
        let pid = process.pid();
        let newly = process.force_terminate();
        let freed = self.memory.free(pid);
        self.ipc.detach_all(pid);
        if newly {
            kernel_info!("pid {} terminated, {} bytes freed", pid, freed);
        }
    }

    /// `Running | Ready -> Stopped`
    pub fn suspend_process(&self, pid: Pid) -> Result<()> {
        let process = self.lookup(pid)?;
        if self.job_stop(&process) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "pid {} is {}, cannot suspend",
                pid,
                process.state()
            )))
        }
    }

    /// `Stopped -> Ready`, back on the run queue
    pub fn resume_process(&self, pid: Pid) -> Result<()> {
        let process = self.lookup(pid)?;
        if self.job_continue(&process) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "pid {} is {}, cannot resume",
                pid,
                process.state()
            )))
        }
    }

    pub(crate) fn job_stop(&self, process: &Process) -> bool {
        let stopped = process
            .transition(
                |s| matches!(s, ProcessState::Running | ProcessState::Ready),
                ProcessState::Stopped,
            )
            .is_some();
        if stopped {
            kernel_debug!("pid {} stopped", process.pid());
        }
        stopped
    }

    pub(crate) fn job_continue(&self, process: &Arc<Process>) -> bool {
        let resumed = process
            .transition(|s| s == ProcessState::Stopped, ProcessState::Ready)
            .is_some();
        if resumed {
            self.scheduler.add_process(Arc::clone(process));
            kernel_debug!("pid {} continued", process.pid());
        }
        resumed
    }

    /// Remove a terminated process from the table
    pub fn reap_process(&self, pid: Pid) -> Result<ProcessInfo> {
        let mut table = self.processes.lock();
        let process = table
            .get(&pid)
            .ok_or_else(|| Error::NotFound(format!("pid {}", pid)))?;
        if !process.state().is_terminal() {
            return Err(Error::InvalidState(format!("pid {} has not terminated", pid)));
        }
        let info = process.info();
        table.remove(&pid);
        Ok(info)
    }

    pub(crate) fn lookup(&self, pid: Pid) -> Result<Arc<Process>> {
        self.processes
            .lock()
            .get(&pid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("pid {}", pid)))
    }

    fn snapshot(&self) -> Vec<Arc<Process>> {
        self.processes.lock().values().cloned().collect()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_process(&self, pid: Pid) -> Option<ProcessInfo> {
        self.lookup(pid).ok().map(|p| p.info())
    }

    /// Every process in the table, zombies included, ordered by pid
    pub fn list_processes(&self) -> Vec<ProcessInfo> {
        let mut infos: Vec<ProcessInfo> = self.snapshot().iter().map(|p| p.info()).collect();
        infos.sort_by_key(|info| info.pid);
        infos
    }

    /// Time since the first `start`, zero before it
    pub fn get_uptime(&self) -> Duration {
        self.boot_time
            .lock()
            .map_or(Duration::ZERO, |boot| boot.elapsed())
    }

    pub fn get_system_info(&self) -> SystemInfo {
        let memory = self.memory.stats();
        let states: Vec<ProcessState> = self.snapshot().iter().map(|p| p.state()).collect();
        let count = |state: ProcessState| states.iter().filter(|&&s| s == state).count();
        SystemInfo {
            total_memory: memory.total,
            free_memory: memory.free,
            used_memory: memory.used,
            peak_memory: memory.peak_used,
            process_count: states.len(),
            running_processes: count(ProcessState::Running),
            ready_processes: count(ProcessState::Ready),
            stopped_processes: count(ProcessState::Stopped),
            zombie_processes: count(ProcessState::Terminated),
            uptime: self.get_uptime(),
            context_switches: self.scheduler.context_switches(),
            io: self.stats.io(),
            cpu: self.get_cpu_stats(),
        }
    }

    // ========================================================================
    // Accounting
    // ========================================================================

    /// Count an I/O operation system-wide and against `pid` if it exists
    pub fn record_io(&self, pid: Pid, op: IoOp, bytes: u64) {
        self.stats.record_io(op, bytes);
        if let Ok(process) = self.lookup(pid) {
            process.with_control(|c| match op {
                IoOp::Read => c.read_bytes += bytes,
                IoOp::Write => c.write_bytes += bytes,
            });
        }
    }

    /// Count a syscall against `pid`; the log keeps the first entries only
    pub fn record_syscall(&self, pid: Pid, name: &str, duration: Duration) {
        let Ok(process) = self.lookup(pid) else {
            return;
        };
        let limit = self.config.syscall_log_limit;
        process.with_control(|c| {
            c.syscall_count += 1;
            if c.syscall_log.len() < limit {
                c.syscall_log.push(SyscallRecord {
                    name: name.to_string(),
                    duration,
                });
            }
        });
    }

    pub fn get_syscall_log(&self, pid: Pid) -> Option<Vec<SyscallRecord>> {
        let process = self.lookup(pid).ok()?;
        Some(process.with_control(|c| c.syscall_log.clone()))
    }

    pub fn get_io_stats(&self) -> IoStats {
        self.stats.io()
    }

    pub fn get_cpu_stats(&self) -> CpuStats {
        self.stats.cpu(self.scheduler.context_switches())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn ipc(&self) -> &Arc<IpcManager> {
        &self.ipc
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.memory.stats()
    }

    pub fn free_memory(&self) -> Size {
        self.memory.free_memory()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

impl core::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kernel")
            .field("running", &self.is_running())
            .field("processes", &self.processes.lock().len())
            .field("free_memory", &self.memory.free_memory())
            .finish_non_exhaustive()
    }
}

fn kernel_loop(weak: Weak<Kernel>) {
    kernel_debug!("kernel loop entered");
    while let Some(kernel) = weak.upgrade() {
        if !kernel.is_running() {
            break;
        }
        kernel.run_once();
    }
    kernel_debug!("kernel loop exited");
}

/// Worker body: run the task, release resources, then record the outcome
///
/// Resources go first so that once a process reads as `Terminated` its
/// memory is already back in the pool.
fn run_task(process: &Process, task: Task, memory: &dyn MemoryAccounting, ipc: &IpcManager) {
    let pid = process.pid();
    let context = process.task_context();
    let started = Instant::now();
    let outcome = task.run(&context);
    let elapsed = started.elapsed();

    if let Err(e) = &outcome {
        kernel_warn!("pid {} failed: {}", pid, e);
    }
    let freed = memory.free(pid);
    ipc.detach_all(pid);
    process.complete(outcome, elapsed);
    kernel_debug!("pid {} exited after {:?}, {} bytes freed", pid, elapsed, freed);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> Arc<Kernel> {
        Kernel::new(KernelConfig::default().with_total_memory(1 << 20)).unwrap()
    }

    #[test]
    fn test_pids_start_at_one_and_increase() {
        let k = kernel();
        let a = k.create_process("a", Task::noop(), 5, 0).unwrap();
        let b = k.create_process("b", Task::noop(), 5, 0).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(k.get_process(a).unwrap().state, ProcessState::Ready);
    }

    #[test]
    fn test_out_of_memory_not_inserted() {
        let k = kernel();
        let err = k.create_process("big", Task::noop(), 5, 2 << 20).unwrap_err();
        assert!(matches!(err, Error::OutOfMemory { .. }));
        assert!(k.list_processes().is_empty());
        assert_eq!(k.scheduler().ready_count(), 0);
    }

    #[test]
    fn test_run_once_completes_short_task() {
        let k = kernel();
        let pid = k
            .create_process("echo", Task::new(|_| Ok(Some("hi".into()))), 5, 4096)
            .unwrap();
        assert!(k.run_once());
        let info = k.get_process(pid).unwrap();
        assert_eq!(info.state, ProcessState::Terminated);
        assert_eq!(info.result.as_deref(), Some("hi"));
        assert_eq!(k.free_memory(), 1 << 20);
    }

    #[test]
    fn test_unknown_pid() {
        let k = kernel();
        assert!(matches!(k.terminate_process(42), Err(Error::NotFound(_))));
        assert!(matches!(k.suspend_process(42), Err(Error::NotFound(_))));
        assert!(k.get_process(42).is_none());
    }

    #[test]
    fn test_reap_only_terminated() {
        let k = kernel();
        let pid = k.create_process("z", Task::noop(), 5, 0).unwrap();
        assert!(matches!(k.reap_process(pid), Err(Error::InvalidState(_))));
        k.terminate_process(pid).unwrap();
        assert_eq!(k.reap_process(pid).unwrap().pid, pid);
        assert!(k.get_process(pid).is_none());
    }

    #[test]
    fn test_syscall_log_capped() {
        let mut config = KernelConfig::default();
        config.syscall_log_limit = 2;
        let k = Kernel::new(config).unwrap();
        let pid = k.create_process("s", Task::noop(), 5, 0).unwrap();
        for name in ["open", "read", "close"] {
            k.record_syscall(pid, name, Duration::from_micros(5));
        }
        assert_eq!(k.get_process(pid).unwrap().syscall_count, 3);
        let log = k.get_syscall_log(pid).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].name, "read");
    }

    #[test]
    fn test_stop_joins_loop_while_task_runs() {
        let mut config = KernelConfig::default();
        config.time_quantum_ms = 10;
        config.idle_poll_ms = 2;
        config.shutdown_timeout_ms = 2000;
        let k = Kernel::new(config).unwrap();
        let pid = k
            .create_process(
                "sleeper",
                Task::new(|ctx| {
                    while !ctx.is_cancelled() {
                        thread::sleep(Duration::from_millis(1));
                    }
                    Ok(None)
                }),
                5,
                0,
            )
            .unwrap();
        k.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while k.get_process(pid).unwrap().state != ProcessState::Running && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let started = Instant::now();
        k.stop();
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert!(!k.is_running());
        assert!(k.loop_thread.lock().is_none());
        // The kernel can be started again after a clean stop
        k.start().unwrap();
        k.stop();
        k.terminate_process(pid).unwrap();
    }

    #[test]
    fn test_uptime_zero_before_start() {
        let k = kernel();
        assert_eq!(k.get_uptime(), Duration::ZERO);
        assert!(!k.is_running());
    }
}
