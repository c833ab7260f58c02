//! Priority message queue
//!
//! Delivery order is highest priority first, FIFO among equal priorities.
//! `send` never blocks: a full queue is reported as `Error::QueueFull` so the
//! sender sees the back-pressure. `receive` blocks up to a timeout.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use nos_api::{Error, Priority, Result};

use crate::sync::{Condvar, Sleeplock};

/// Default queue depth
pub const MQ_MAX_MESSAGES: usize = 10;
/// Default per-message size limit
pub const MQ_MAX_MSG_SIZE: usize = 8192;

/// A received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub priority: Priority,
    pub payload: Vec<u8>,
}

struct Entry {
    priority: Priority,
    seq: u64,
    payload: Vec<u8>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Max-heap: higher priority wins, then the older sequence number
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

/// Bounded message queue with blocking receive
pub struct MessageQueue {
    name: String,
    max_messages: usize,
    max_msg_size: usize,
    state: Sleeplock<QueueState>,
    not_empty: Condvar,
}

impl MessageQueue {
    /// Create an empty queue
    pub fn new(name: impl Into<String>, max_messages: usize, max_msg_size: usize) -> Self {
        Self {
            name: name.into(),
            max_messages,
            max_msg_size,
            state: Sleeplock::new(QueueState::default()),
            not_empty: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn max_msg_size(&self) -> usize {
        self.max_msg_size
    }

    /// Enqueue a message without blocking
    pub fn send(&self, payload: impl Into<Vec<u8>>, priority: Priority) -> Result<()> {
        let payload = payload.into();
        if payload.len() > self.max_msg_size {
            return Err(Error::MessageTooLarge {
                size: payload.len(),
                max: self.max_msg_size,
            });
        }
        let mut state = self.state.lock();
        if state.heap.len() >= self.max_messages {
            return Err(Error::QueueFull {
                capacity: self.max_messages,
            });
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry { priority, seq, payload });
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the next message, waiting up to `timeout` (forever for `None`)
    pub fn receive(&self, timeout: Option<Duration>) -> Option<Message> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if let Some(entry) = state.heap.pop() {
                return Some(Message {
                    priority: entry.priority,
                    payload: entry.payload,
                });
            }
            match deadline {
                Some(deadline) => {
                    if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                        return state.heap.pop().map(|entry| Message {
                            priority: entry.priority,
                            payload: entry.payload,
                        });
                    }
                }
                None => self.not_empty.wait(&mut state),
            }
        }
    }

    /// Dequeue the next message if one is waiting
    pub fn try_receive(&self) -> Option<Message> {
        self.receive(Some(Duration::ZERO))
    }

    /// Messages currently buffered
    pub fn size(&self) -> usize {
        self.state.lock().heap.len()
    }
}

impl core::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("name", &self.name)
            .field("size", &self.size())
            .field("max_messages", &self.max_messages)
            .finish()
    }
}
