//! Common test utilities for kernel integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nos_kernel::{Kernel, KernelConfig, Pid, ProcessState, Task};

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * 1024;

/// Generous bound for anything that waits on the background loop
pub const SETTLE: Duration = Duration::from_secs(5);

/// Small quantum and idle poll so tests move quickly
pub fn test_config() -> KernelConfig {
    KernelConfig {
        time_quantum_ms: 20,
        idle_poll_ms: 2,
        shutdown_timeout_ms: 1000,
        ..KernelConfig::default()
    }
}

pub fn test_kernel() -> Arc<Kernel> {
    Kernel::new(test_config()).expect("test config is valid")
}

pub fn running_kernel() -> Arc<Kernel> {
    let kernel = test_kernel();
    kernel.start().expect("kernel loop starts");
    kernel
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn wait_for_state(kernel: &Kernel, pid: Pid, state: ProcessState) -> bool {
    wait_until(SETTLE, || {
        kernel.get_process(pid).map(|p| p.state) == Some(state)
    })
}

/// A task that blocks until the returned gate is opened
pub fn gated_task() -> (Task, Arc<AtomicBool>) {
    let gate = Arc::new(AtomicBool::new(false));
    let open = Arc::clone(&gate);
    let task = Task::new(move |_| {
        while !open.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(Some("released".into()))
    });
    (task, gate)
}

pub fn open(gate: &AtomicBool) {
    gate.store(true, Ordering::SeqCst);
}
