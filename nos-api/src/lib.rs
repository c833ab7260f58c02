//! NOS API - Core interfaces and types for the NOS operating system
//!
//! This crate provides the vocabulary shared by the NOS kernel crates:
//! identifiers, process and signal types, the error taxonomy, and the
//! memory accounting interface the kernel is written against.
//!
//! # Architecture
//!
//! - **Core**: Fundamental types (`Pid`, `ProcessState`, `Signal`, ...)
//! - **Error**: Common error type and result alias
//! - **Memory**: Memory accounting abstraction
//!
//! # Usage
//!
//! ```rust
//! use nos_api::{Error, Result, Signal};
//!
//! fn parse(number: i32) -> Result<Signal> {
//!     Signal::try_from(number)
//! }
//!
//! assert_eq!(parse(9).unwrap(), Signal::Kill);
//! assert!(matches!(parse(99), Err(Error::InvalidArgument(_))));
//! ```

#![no_std]

extern crate alloc;

// Core modules
pub mod core;
pub mod error;
pub mod memory;

// Re-export commonly used types
pub use crate::core::types::*;
pub use crate::error::{Error, Result};
pub use crate::memory::interface::{MemoryAccounting, MemoryStats};
