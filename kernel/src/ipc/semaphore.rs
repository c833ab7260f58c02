//! Counting semaphore
//!
//! `0 <= value <= max_value` always holds. A post at the maximum is refused
//! rather than clamped, so the caller learns the post had no effect.

use std::time::{Duration, Instant};

use crate::sync::{Condvar, Sleeplock};

/// Named counting semaphore with a ceiling
pub struct Semaphore {
    name: String,
    max_value: u32,
    value: Sleeplock<u32>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore; `initial` is clamped to `max_value`
    pub fn new(name: impl Into<String>, initial: u32, max_value: u32) -> Self {
        Self {
            name: name.into(),
            max_value,
            value: Sleeplock::new(initial.min(max_value)),
            available: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decrement, blocking while the value is zero
    ///
    /// Returns false if `timeout` elapsed first; the value is then untouched.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut value = self.value.lock();
        while *value == 0 {
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut value, deadline).timed_out() && *value == 0 {
                        return false;
                    }
                }
                None => self.available.wait(&mut value),
            }
        }
        *value -= 1;
        true
    }

    /// Decrement only if that can happen immediately
    pub fn try_wait(&self) -> bool {
        let mut value = self.value.lock();
        if *value == 0 {
            return false;
        }
        *value -= 1;
        true
    }

    /// Increment and wake one waiter; false at the ceiling
    pub fn post(&self) -> bool {
        let mut value = self.value.lock();
        if *value >= self.max_value {
            return false;
        }
        *value += 1;
        drop(value);
        self.available.notify_one();
        true
    }

    pub fn value(&self) -> u32 {
        *self.value.lock()
    }

    pub fn max_value(&self) -> u32 {
        self.max_value
    }
}

impl core::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Semaphore")
            .field("name", &self.name)
            .field("value", &self.value())
            .field("max_value", &self.max_value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_wait_post() {
        let sem = Semaphore::new("s", 1, 1);
        assert!(sem.wait(None));
        assert_eq!(sem.value(), 0);
        assert!(sem.post());
        assert_eq!(sem.value(), 1);
    }

    #[test]
    fn test_post_at_max_refused() {
        let sem = Semaphore::new("s", 2, 2);
        assert!(!sem.post());
        assert_eq!(sem.value(), 2);
    }

    #[test]
    fn test_wait_times_out() {
        let sem = Semaphore::new("s", 0, 1);
        let started = Instant::now();
        assert!(!sem.wait(Some(Duration::from_millis(10))));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(10));
        assert!(elapsed < Duration::from_secs(1));
        assert_eq!(sem.value(), 0);
        assert!(!sem.try_wait());
    }

    #[test]
    fn test_second_wait_blocks_until_post() {
        let sem = Arc::new(Semaphore::new("s", 1, 1));
        assert!(sem.wait(None));

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let sem = Arc::clone(&sem);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let ok = sem.wait(Some(Duration::from_secs(5)));
                acquired.store(true, Ordering::SeqCst);
                ok
            })
        };

        thread::sleep(Duration::from_millis(30));
        assert!(!acquired.load(Ordering::SeqCst));
        assert!(sem.post());
        assert!(waiter.join().unwrap());
        assert_eq!(sem.value(), 0);
    }
}
