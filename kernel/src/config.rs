//! Kernel configuration
//!
//! Every tunable of the hosted kernel lives here. Defaults reproduce a small
//! workstation: 100 MiB of accounted memory and a 100 ms quantum. A config can
//! also be loaded from JSON; missing fields fall back to their defaults.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use nos_api::{Error, Priority, Result, Size};

/// IPC limits and descriptor numbering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// First descriptor handed out by `create_pipe`
    pub pipe_fd_base: u32,
    /// Pipe buffer capacity in bytes
    pub pipe_buffer_size: usize,
    /// Default message queue depth
    pub mq_max_messages: usize,
    /// Default per-message size limit
    pub mq_max_msg_size: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            pipe_fd_base: 100,
            pipe_buffer_size: 64 * 1024,
            mq_max_messages: 10,
            mq_max_msg_size: 8192,
        }
    }
}

/// Kernel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Memory budget shared by all processes, in bytes
    pub total_memory: Size,
    /// Time slice a task may occupy before the loop moves on
    pub time_quantum_ms: u64,
    /// Longest the loop idles waiting for a runnable process
    pub idle_poll_ms: u64,
    /// How long `stop` waits for the loop thread
    pub shutdown_timeout_ms: u64,
    /// Priority used by `spawn` when none is given
    pub default_priority: Priority,
    /// Memory reserved by `spawn` when none is given
    pub default_process_memory: Size,
    /// Per-process cap on recorded syscalls
    pub syscall_log_limit: usize,
    /// IPC limits
    pub ipc: IpcConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            total_memory: 100 * 1024 * 1024,
            time_quantum_ms: 100,
            idle_poll_ms: 10,
            shutdown_timeout_ms: 2000,
            default_priority: 5,
            default_process_memory: 1024 * 1024,
            syscall_log_limit: 200,
            ipc: IpcConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Parse a JSON document; absent fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        let config: KernelConfig = serde_json::from_str(text)
            .map_err(|e| Error::ConfigError(format!("invalid kernel config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the kernel cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.total_memory == 0 {
            return Err(Error::ConfigError("total_memory must be non-zero".into()));
        }
        if self.time_quantum_ms == 0 {
            return Err(Error::ConfigError("time_quantum_ms must be non-zero".into()));
        }
        if self.idle_poll_ms == 0 {
            return Err(Error::ConfigError("idle_poll_ms must be non-zero".into()));
        }
        if self.ipc.pipe_buffer_size == 0 || self.ipc.mq_max_messages == 0 {
            return Err(Error::ConfigError("IPC capacities must be non-zero".into()));
        }
        Ok(())
    }

    /// Time quantum as a duration
    pub fn time_quantum(&self) -> Duration {
        Duration::from_millis(self.time_quantum_ms)
    }

    /// Idle poll interval as a duration
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Shutdown timeout as a duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Builder-style override of the memory budget
    pub fn with_total_memory(mut self, bytes: Size) -> Self {
        self.total_memory = bytes;
        self
    }

    /// Builder-style override of the time quantum
    pub fn with_time_quantum(mut self, quantum: Duration) -> Self {
        self.time_quantum_ms = u64::try_from(quantum.as_millis()).unwrap_or(u64::MAX).max(1);
        self
    }
}
