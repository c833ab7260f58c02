//! Memory accounting interface

use crate::core::types::{Pid, Size};
use crate::error::Result;
use serde::Serialize;

/// Trait for a per-process memory ledger
///
/// Implementations must keep `used_memory() == Σ process_memory(pid)` at
/// every observable point, and `allocate` must be all-or-nothing.
pub trait MemoryAccounting: Send + Sync {
    /// Reserves `bytes` for `pid`, accumulating with earlier reservations
    fn allocate(&self, pid: Pid, bytes: Size) -> Result<()>;

    /// Releases everything reserved by `pid`, returning the byte count
    fn free(&self, pid: Pid) -> Size;

    /// Bytes still available
    fn free_memory(&self) -> Size;

    /// Bytes reserved by `pid`
    fn process_memory(&self, pid: Pid) -> Size;

    /// Total budget
    fn total_memory(&self) -> Size;

    /// Bytes currently reserved
    fn used_memory(&self) -> Size;

    /// Snapshot of the ledger counters
    fn stats(&self) -> MemoryStats;
}

/// Memory ledger statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// Total budget in bytes
    pub total: Size,
    /// Bytes reserved
    pub used: Size,
    /// Bytes available
    pub free: Size,
    /// High-water mark of `used`
    pub peak_used: Size,
    /// Number of successful allocations
    pub allocation_count: u64,
    /// Number of pids holding a reservation
    pub tracked_pids: usize,
}
