//! Inter-process communication
//!
//! Four primitives with no dependencies on the rest of the kernel:
//! - [`Pipe`]: bounded byte buffer with independently closable ends
//! - [`MessageQueue`]: bounded priority queue with blocking receive
//! - [`SharedMemory`]: fixed byte segment plus an attach set
//! - [`Semaphore`]: counting semaphore with a ceiling
//!
//! [`IpcManager`] registers them by descriptor (pipes) or by name.

pub mod manager;
pub mod message_queue;
pub mod pipe;
pub mod semaphore;
pub mod shared_memory;

pub use manager::{
    IpcId, IpcListing, IpcManager, MessageQueueListing, PipeListing, SemaphoreListing,
    SharedMemoryListing,
};
pub use message_queue::{MQ_MAX_MESSAGES, MQ_MAX_MSG_SIZE, Message, MessageQueue};
pub use pipe::{PIPE_BUF_SIZE, Pipe, PipeEnd};
pub use semaphore::Semaphore;
pub use shared_memory::SharedMemory;
