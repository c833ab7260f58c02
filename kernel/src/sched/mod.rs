//! Round-robin scheduler
//!
//! A FIFO ready queue plus a single current process. `schedule()` is the only
//! place a process becomes `Running`, and it is serialized by a switch lock so
//! at most one process is `Running` at any time.
//!
//! The queue may hold stale entries: a process stopped or killed while queued
//! keeps its slot until it reaches the front, where it is dropped. A set of
//! queued pids keeps a process from being queued twice.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashSet;

use nos_api::{Pid, ProcessState};

use crate::process::Process;
use crate::sync::{AtomicU64, Condvar, Ordering, Sleeplock};

#[derive(Default)]
struct ReadyQueue {
    queue: VecDeque<Arc<Process>>,
    queued: HashSet<Pid>,
}

impl ReadyQueue {
    fn push(&mut self, process: Arc<Process>) -> bool {
        if !self.queued.insert(process.pid()) {
            return false;
        }
        self.queue.push_back(process);
        true
    }

    fn pop(&mut self) -> Option<Arc<Process>> {
        let process = self.queue.pop_front()?;
        self.queued.remove(&process.pid());
        Some(process)
    }
}

/// Scheduler counters
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub context_switches: AtomicU64,
    pub preemptions: AtomicU64,
    pub stale_skips: AtomicU64,
    pub idle_waits: AtomicU64,
}

/// Round-robin scheduler over [`Process`]es
pub struct Scheduler {
    time_quantum: Duration,
    idle_poll: Duration,
    switch: Sleeplock<()>,
    current: Sleeplock<Option<Arc<Process>>>,
    ready: Sleeplock<ReadyQueue>,
    available: Condvar,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Create a scheduler with the given quantum and idle wait bound
    pub fn new(time_quantum: Duration, idle_poll: Duration) -> Self {
        Self {
            time_quantum,
            idle_poll,
            switch: Sleeplock::new(()),
            current: Sleeplock::new(None),
            ready: Sleeplock::new(ReadyQueue::default()),
            available: Condvar::new(),
            stats: SchedulerStats::default(),
        }
    }

    /// Mark `process` ready and queue it
    ///
    /// Only `New` and `Ready` processes are queued; anything else (stopped,
    /// running or terminated) returns false. A process already in the queue
    /// keeps its position.
    pub fn add_process(&self, process: Arc<Process>) -> bool {
        if !process.admit() {
            return false;
        }
        if self.ready.lock().push(process) {
            self.available.notify_one();
        }
        true
    }

    /// Pick the next process to run
    ///
    /// The current process, if still `Running`, goes to the back of the
    /// queue first. Waits at most `idle_poll` for something runnable.
    pub fn schedule(&self) -> Option<Arc<Process>> {
        let _switch = self.switch.lock();

        let prev = self.current.lock().take();
        if let Some(prev) = prev {
            let demoted = prev
                .transition(|s| s == ProcessState::Running, ProcessState::Ready)
                .is_some();
            if demoted {
                self.stats.preemptions.fetch_add(1, Ordering::Relaxed);
                self.ready.lock().push(prev);
            }
        }

        let next = self.next_ready();
        if next.is_some() {
            self.stats.context_switches.fetch_add(1, Ordering::Relaxed);
        }
        *self.current.lock() = next.clone();
        next
    }

    fn next_ready(&self) -> Option<Arc<Process>> {
        let deadline = Instant::now() + self.idle_poll;
        let mut ready = self.ready.lock();
        loop {
            while let Some(process) = ready.pop() {
                let promoted = process
                    .transition(|s| s == ProcessState::Ready, ProcessState::Running)
                    .is_some();
                if promoted {
                    return Some(process);
                }
                self.stats.stale_skips.fetch_add(1, Ordering::Relaxed);
            }
            if Instant::now() >= deadline {
                return None;
            }
            self.stats.idle_waits.fetch_add(1, Ordering::Relaxed);
            // Spurious and timed-out wakeups both loop back to re-check
            self.available.wait_until(&mut ready, deadline);
        }
    }

    /// Wake an idle `schedule()` call early
    pub fn wake(&self) {
        self.available.notify_all();
    }

    /// Pid of the process most recently handed out
    pub fn current_pid(&self) -> Option<Pid> {
        self.current.lock().as_ref().map(|p| p.pid())
    }

    /// Number of queue entries, stale ones included
    pub fn ready_count(&self) -> usize {
        self.ready.lock().queue.len()
    }

    pub fn time_quantum(&self) -> Duration {
        self.time_quantum
    }

    pub fn context_switches(&self) -> u64 {
        self.stats.context_switches.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}
