//! Synchronization primitives for the hosted kernel
//!
//! Two kinds of lock are used. `Mutex` (spin) guards short, non-blocking
//! critical sections: tables, ledgers, pipe buffers. `Sleeplock` plus
//! `Condvar` (parking_lot) back the operations that park a host thread:
//! semaphore waits, message-queue receives and the scheduler's idle wait.

pub use spin::Mutex;
pub use parking_lot::Condvar;

/// Lock that parks the calling thread instead of spinning
pub type Sleeplock<T> = parking_lot::Mutex<T>;

pub use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
