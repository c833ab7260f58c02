//! Kernel-wide counters and the snapshots built from them

use core::time::Duration;

use serde::Serialize;

use nos_api::Size;

use crate::sync::{AtomicU64, Ordering};

/// Direction of a recorded I/O operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IoOp {
    Read,
    Write,
}

/// System-wide I/O totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IoStats {
    pub reads: u64,
    pub writes: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Where the kernel loop spent its time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuStats {
    /// Time spent waiting on workers
    pub busy: Duration,
    /// Time spent with nothing runnable
    pub idle: Duration,
    pub context_switches: u64,
    /// Quanta that expired with the task still running
    pub quantum_expiries: u64,
}

/// Aggregate view returned by `Kernel::get_system_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub total_memory: Size,
    pub free_memory: Size,
    pub used_memory: Size,
    pub peak_memory: Size,
    pub process_count: usize,
    pub running_processes: usize,
    pub ready_processes: usize,
    pub stopped_processes: usize,
    pub zombie_processes: usize,
    pub uptime: Duration,
    pub context_switches: u64,
    pub io: IoStats,
    pub cpu: CpuStats,
}

#[derive(Debug, Default)]
pub(crate) struct KernelStats {
    reads: AtomicU64,
    writes: AtomicU64,
    read_bytes: AtomicU64,
    write_bytes: AtomicU64,
    busy_ns: AtomicU64,
    idle_ns: AtomicU64,
    quantum_expiries: AtomicU64,
}

impl KernelStats {
    pub(crate) fn record_io(&self, op: IoOp, bytes: u64) {
        let (ops, total) = match op {
            IoOp::Read => (&self.reads, &self.read_bytes),
            IoOp::Write => (&self.writes, &self.write_bytes),
        };
        ops.fetch_add(1, Ordering::Relaxed);
        total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_busy(&self, elapsed: Duration) {
        self.busy_ns.fetch_add(nanos(elapsed), Ordering::Relaxed);
    }

    pub(crate) fn add_idle(&self, elapsed: Duration) {
        self.idle_ns.fetch_add(nanos(elapsed), Ordering::Relaxed);
    }

    pub(crate) fn quantum_expired(&self) {
        self.quantum_expiries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn io(&self) -> IoStats {
        IoStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            read_bytes: self.read_bytes.load(Ordering::Relaxed),
            write_bytes: self.write_bytes.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn cpu(&self, context_switches: u64) -> CpuStats {
        CpuStats {
            busy: Duration::from_nanos(self.busy_ns.load(Ordering::Relaxed)),
            idle: Duration::from_nanos(self.idle_ns.load(Ordering::Relaxed)),
            context_switches,
            quantum_expiries: self.quantum_expiries.load(Ordering::Relaxed),
        }
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
