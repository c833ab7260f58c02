//! Unified logging support for the hosted kernel
//!
//! Thin wrappers over the `log` facade. With the `log` feature disabled the
//! macros still type-check their arguments but emit nothing. The library
//! never installs a logger; the embedding application picks one.

/// Log target used by every kernel message
pub const TARGET: &str = "nos_kernel";

/// Unified trace-level logging
#[macro_export]
macro_rules! kernel_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::trace!(target: $crate::logging::TARGET, $($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Unified debug-level logging
#[macro_export]
macro_rules! kernel_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::debug!(target: $crate::logging::TARGET, $($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Unified info-level logging
#[macro_export]
macro_rules! kernel_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::info!(target: $crate::logging::TARGET, $($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Unified warn-level logging
#[macro_export]
macro_rules! kernel_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::warn!(target: $crate::logging::TARGET, $($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Unified error-level logging
#[macro_export]
macro_rules! kernel_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::error!(target: $crate::logging::TARGET, $($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($arg)*);
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_expand_in_expression_position() {
        let pid = 7;
        let outcome = match pid {
            0 => kernel_warn!("pid {} is reserved", pid),
            _ => kernel_debug!("pid {} accepted", pid),
        };
        let () = outcome;
        kernel_trace!("trace {}", 1);
        kernel_info!("info");
        kernel_error!("error {:?}", Some(pid));
    }
}
