//! NOS Kernel Library
//!
//! A hosted, in-process kernel: processes are closures run on host threads,
//! scheduled round-robin by a background loop, with per-process memory
//! accounting, POSIX-style signals and four IPC primitives.
//!
//! # Architecture
//!
//! - **Kernel** (`kernel`): process table, scheduling loop, accounting
//! - **Process Management** (`process`, `sched`): process model, tasks and the round-robin scheduler
//! - **Signals** (`signal`): lifecycle signals and catchable-signal handlers
//! - **IPC** (`ipc`): pipes, message queues, shared memory, semaphores and their registry
//! - **Memory Management**: the `nos-memory-management` ledger behind `nos_api::MemoryAccounting`
//!
//! # Usage
//!
//! ```no_run
//! use nos_kernel::{Kernel, KernelConfig, Signal, Task};
//!
//! let kernel = Kernel::new(KernelConfig::default()).unwrap();
//! kernel.start().unwrap();
//!
//! let pid = kernel
//!     .create_process("worker", Task::new(|ctx| Ok(Some(format!("pid {}", ctx.pid())))), 5, 4096)
//!     .unwrap();
//! kernel.send_signal(pid, Signal::Usr1).unwrap();
//! kernel.stop();
//! ```
//!
//! # Features
//!
//! - `log` (default): emit diagnostics through the `log` facade

pub mod config;
pub mod ipc;
pub mod kernel;
pub mod logging;
pub mod process;
pub mod sched;
pub mod signal;
pub mod sync;

pub use config::{IpcConfig, KernelConfig};
pub use ipc::{IpcListing, IpcManager, Message, MessageQueue, Pipe, PipeEnd, Semaphore, SharedMemory};
pub use kernel::{CpuStats, IoOp, IoStats, Kernel, SystemInfo};
pub use process::{Process, ProcessInfo, SpawnOptions, Task, TaskContext, TaskResult};
pub use sched::Scheduler;
pub use signal::SignalHandler;

pub use nos_api::{Error, MemoryAccounting, MemoryStats, Pid, Priority, ProcessState, Result, Signal};
pub use nos_memory_management::MemoryManager;

static_assertions::assert_impl_all!(Kernel: Send, Sync);
static_assertions::assert_impl_all!(IpcManager: Send, Sync);
static_assertions::assert_impl_all!(Process: Send, Sync);
static_assertions::assert_impl_all!(Scheduler: Send, Sync);
