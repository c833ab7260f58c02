//! Per-process memory ledger
//!
//! The ledger does not hand out addresses. It only tracks how many bytes of a
//! fixed budget each process has reserved, which is all the hosted kernel
//! needs to refuse process creation under memory pressure and to report
//! `free`-style figures.

use hashbrown::HashMap;
use spin::Mutex;

use nos_api::{Error, MemoryAccounting, MemoryStats, Pid, Result, Size};

/// Default budget: 100 MiB
pub const DEFAULT_TOTAL_MEMORY: Size = 100 * 1024 * 1024;

/// Ledger state guarded by a single lock.
#[derive(Debug, Default)]
struct LedgerState {
    used: Size,
    peak_used: Size,
    allocation_count: u64,
    allocations: HashMap<Pid, Size>,
}

/// Fixed-budget memory manager with a per-pid ledger
///
/// Invariant: `used_memory() == Σ allocations`, checked under one lock, so no
/// partially applied allocation is ever observable.
#[derive(Debug)]
pub struct MemoryManager {
    total: Size,
    state: Mutex<LedgerState>,
}

impl MemoryManager {
    /// Create a ledger with a budget of `total` bytes
    pub fn new(total: Size) -> Self {
        Self {
            total,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Reserve `bytes` for `pid`
    ///
    /// Succeeds iff `used + bytes <= total`; repeated reservations for the
    /// same pid accumulate.
    pub fn allocate(&self, pid: Pid, bytes: Size) -> Result<()> {
        let mut state = self.state.lock();
        let available = self.total - state.used;
        if bytes > available {
            #[cfg(feature = "log")]
            log::debug!("mm: pid {} denied {} bytes ({} available)", pid, bytes, available);
            return Err(Error::OutOfMemory { requested: bytes, available });
        }
        *state.allocations.entry(pid).or_insert(0) += bytes;
        state.used += bytes;
        state.allocation_count += 1;
        if state.used > state.peak_used {
            state.peak_used = state.used;
        }
        #[cfg(feature = "log")]
        log::trace!("mm: pid {} reserved {} bytes, used {}", pid, bytes, state.used);
        Ok(())
    }

    /// Release every byte held by `pid`, returning how many were freed
    ///
    /// Freeing a pid with no reservation is a no-op returning 0, which makes
    /// repeated termination paths harmless.
    pub fn free(&self, pid: Pid) -> Size {
        let mut state = self.state.lock();
        let freed = state.allocations.remove(&pid).unwrap_or(0);
        state.used -= freed;
        freed
    }

    /// Bytes still available
    pub fn get_free_memory(&self) -> Size {
        self.total - self.state.lock().used
    }

    /// Bytes reserved by `pid`
    pub fn get_process_memory(&self, pid: Pid) -> Size {
        self.state.lock().allocations.get(&pid).copied().unwrap_or(0)
    }

    /// Total budget
    pub fn total_memory(&self) -> Size {
        self.total
    }

    /// Bytes currently reserved
    pub fn used_memory(&self) -> Size {
        self.state.lock().used
    }

    /// Snapshot of the ledger counters
    pub fn stats(&self) -> MemoryStats {
        let state = self.state.lock();
        MemoryStats {
            total: self.total,
            used: state.used,
            free: self.total - state.used,
            peak_used: state.peak_used,
            allocation_count: state.allocation_count,
            tracked_pids: state.allocations.len(),
        }
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_MEMORY)
    }
}

impl MemoryAccounting for MemoryManager {
    fn allocate(&self, pid: Pid, bytes: Size) -> Result<()> {
        MemoryManager::allocate(self, pid, bytes)
    }

    fn free(&self, pid: Pid) -> Size {
        MemoryManager::free(self, pid)
    }

    fn free_memory(&self) -> Size {
        self.get_free_memory()
    }

    fn process_memory(&self, pid: Pid) -> Size {
        self.get_process_memory(pid)
    }

    fn total_memory(&self) -> Size {
        self.total
    }

    fn used_memory(&self) -> Size {
        MemoryManager::used_memory(self)
    }

    fn stats(&self) -> MemoryStats {
        MemoryManager::stats(self)
    }
}
