//! NOS Memory Management
//!
//! This crate provides the memory accounting used by the hosted kernel: a
//! fixed byte budget shared by every process, with a per-pid ledger.
//! Virtual memory and paging are out of scope.

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export API types
pub use nos_api::{MemoryAccounting, MemoryStats, Pid, Size};

// Memory management modules
pub mod ledger;

// Re-export commonly used types
pub use ledger::{MemoryManager, DEFAULT_TOTAL_MEMORY};
