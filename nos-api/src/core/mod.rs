//! Core module containing fundamental types shared by every NOS crate

pub mod types;

// Re-export commonly used items
pub use types::*;
