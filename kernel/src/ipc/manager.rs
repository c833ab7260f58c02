//! IPC object registry
//!
//! Pipes are reached through descriptors, the other objects by name. Each
//! map has its own lock and no two are ever held together.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::Serialize;

use nos_api::{Error, Fd, Pid, Result};

use super::{MessageQueue, Pipe, PipeEnd, Semaphore, SharedMemory};
use crate::config::IpcConfig;
use crate::sync::{AtomicU32, AtomicU64, Mutex, Ordering};
use crate::{kernel_debug, kernel_info};

/// Registry-wide object identifier
pub type IpcId = u64;

/// Summary of one pipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipeListing {
    pub id: IpcId,
    pub read_fd: Fd,
    pub write_fd: Fd,
    pub available: usize,
    pub max_size: usize,
}

/// Summary of one message queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageQueueListing {
    pub id: IpcId,
    pub name: String,
    pub messages: usize,
    pub max_messages: usize,
    pub max_msg_size: usize,
}

/// Summary of one shared memory segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedMemoryListing {
    pub id: IpcId,
    pub name: String,
    pub size: usize,
    pub attached: Vec<Pid>,
}

/// Summary of one semaphore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemaphoreListing {
    pub id: IpcId,
    pub name: String,
    pub value: u32,
    pub max_value: u32,
}

/// Everything registered, as shown by `ipcs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IpcListing {
    pub pipes: Vec<PipeListing>,
    pub message_queues: Vec<MessageQueueListing>,
    pub shared_memory: Vec<SharedMemoryListing>,
    pub semaphores: Vec<SemaphoreListing>,
}

impl IpcListing {
    /// Total number of objects
    pub fn len(&self) -> usize {
        self.pipes.len() + self.message_queues.len() + self.shared_memory.len() + self.semaphores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type Named<T> = Mutex<HashMap<String, (IpcId, Arc<T>)>>;

/// Registry and factory for pipes, message queues, shared memory and semaphores
pub struct IpcManager {
    config: IpcConfig,
    next_id: AtomicU64,
    next_fd: AtomicU32,
    pipes: Mutex<HashMap<IpcId, Arc<Pipe>>>,
    fds: Mutex<HashMap<Fd, (IpcId, PipeEnd)>>,
    message_queues: Named<MessageQueue>,
    shared_memory: Named<SharedMemory>,
    semaphores: Named<Semaphore>,
}

impl IpcManager {
    /// Create an empty registry
    pub fn new(config: IpcConfig) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            next_fd: AtomicU32::new(config.pipe_fd_base),
            config,
            pipes: Mutex::new(HashMap::new()),
            fds: Mutex::new(HashMap::new()),
            message_queues: Mutex::new(HashMap::new()),
            shared_memory: Mutex::new(HashMap::new()),
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    fn alloc_id(&self) -> IpcId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ------------------------------------------------------------------------
    // Pipes
    // ------------------------------------------------------------------------

    /// Create a pipe, returning `(read_fd, write_fd)`
    pub fn create_pipe(&self) -> (Fd, Fd) {
        let read_fd = self.next_fd.fetch_add(2, Ordering::Relaxed);
        let write_fd = read_fd + 1;
        let id = self.alloc_id();
        let pipe = Arc::new(Pipe::new(read_fd, write_fd, self.config.pipe_buffer_size));

        self.pipes.lock().insert(id, pipe);
        {
            let mut fds = self.fds.lock();
            fds.insert(read_fd, (id, PipeEnd::Read));
            fds.insert(write_fd, (id, PipeEnd::Write));
        }
        kernel_debug!("ipc: pipe {} created (fds {}, {})", id, read_fd, write_fd);
        (read_fd, write_fd)
    }

    /// Resolve a descriptor to its pipe and end
    pub fn get_pipe_by_fd(&self, fd: Fd) -> Option<(Arc<Pipe>, PipeEnd)> {
        let (id, end) = self.fds.lock().get(&fd).copied()?;
        let pipe = self.pipes.lock().get(&id).cloned()?;
        Some((pipe, end))
    }

    /// Close the end `fd` refers to and release the descriptor
    ///
    /// The pipe leaves the registry once both of its ends are closed.
    pub fn close_pipe_fd(&self, fd: Fd) -> Result<()> {
        let (id, end) = self
            .fds
            .lock()
            .remove(&fd)
            .ok_or_else(|| Error::NotFound(format!("pipe fd {}", fd)))?;
        let pipe = self.pipes.lock().get(&id).cloned();
        if let Some(pipe) = pipe {
            pipe.close(end);
            if pipe.is_fully_closed() {
                self.pipes.lock().remove(&id);
                kernel_debug!("ipc: pipe {} released", id);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Message queues
    // ------------------------------------------------------------------------

    /// Create a named message queue
    pub fn create_message_queue(
        &self,
        name: &str,
        max_messages: usize,
        max_msg_size: usize,
    ) -> Result<IpcId> {
        if max_messages == 0 {
            return Err(Error::InvalidArgument("max_messages must be non-zero".into()));
        }
        let queue = Arc::new(MessageQueue::new(name, max_messages, max_msg_size));
        let id = insert_named(&self.message_queues, name, queue, || self.alloc_id())?;
        kernel_info!("ipc: message queue '{}' created (id {})", name, id);
        Ok(id)
    }

    /// Create a named message queue with the configured limits
    pub fn create_message_queue_with_defaults(&self, name: &str) -> Result<IpcId> {
        self.create_message_queue(name, self.config.mq_max_messages, self.config.mq_max_msg_size)
    }

    pub fn get_message_queue(&self, name: &str) -> Option<Arc<MessageQueue>> {
        self.message_queues.lock().get(name).map(|(_, q)| Arc::clone(q))
    }

    /// Remove a queue by name; blocked receivers keep their handle
    pub fn remove_message_queue(&self, name: &str) -> Result<()> {
        self.message_queues
            .lock()
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("message queue '{}'", name)))?;
        kernel_info!("ipc: message queue '{}' removed", name);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Shared memory
    // ------------------------------------------------------------------------

    /// Create a zeroed shared memory segment
    pub fn create_shared_memory(&self, name: &str, size: usize) -> Result<IpcId> {
        if size == 0 {
            return Err(Error::InvalidArgument("shared memory size must be non-zero".into()));
        }
        let segment = Arc::new(SharedMemory::new(name, size));
        let id = insert_named(&self.shared_memory, name, segment, || self.alloc_id())?;
        kernel_info!("ipc: shared memory '{}' created ({} bytes, id {})", name, size, id);
        Ok(id)
    }

    pub fn get_shared_memory(&self, name: &str) -> Option<Arc<SharedMemory>> {
        self.shared_memory.lock().get(name).map(|(_, s)| Arc::clone(s))
    }

    /// Remove a segment; refused while any pid is attached
    pub fn remove_shared_memory(&self, name: &str) -> Result<()> {
        let mut segments = self.shared_memory.lock();
        let attached = match segments.get(name) {
            Some((_, segment)) => segment.attach_count(),
            None => return Err(Error::NotFound(format!("shared memory '{}'", name))),
        };
        if attached > 0 {
            return Err(Error::Busy(format!(
                "shared memory '{}' has {} attached process(es)",
                name, attached
            )));
        }
        segments.remove(name);
        drop(segments);
        kernel_info!("ipc: shared memory '{}' removed", name);
        Ok(())
    }

    /// Detach `pid` from every segment, returning how many it left
    pub fn detach_all(&self, pid: Pid) -> usize {
        let segments: Vec<Arc<SharedMemory>> = self
            .shared_memory
            .lock()
            .values()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        let detached = segments.iter().filter(|s| s.detach(pid)).count();
        if detached > 0 {
            kernel_debug!("ipc: pid {} detached from {} segment(s)", pid, detached);
        }
        detached
    }

    // ------------------------------------------------------------------------
    // Semaphores
    // ------------------------------------------------------------------------

    /// Create a named semaphore
    pub fn create_semaphore(&self, name: &str, initial: u32, max_value: u32) -> Result<IpcId> {
        if initial > max_value {
            return Err(Error::InvalidArgument(format!(
                "initial value {} exceeds maximum {}",
                initial, max_value
            )));
        }
        let sem = Arc::new(Semaphore::new(name, initial, max_value));
        let id = insert_named(&self.semaphores, name, sem, || self.alloc_id())?;
        kernel_info!("ipc: semaphore '{}' created ({}/{}, id {})", name, initial, max_value, id);
        Ok(id)
    }

    pub fn get_semaphore(&self, name: &str) -> Option<Arc<Semaphore>> {
        self.semaphores.lock().get(name).map(|(_, s)| Arc::clone(s))
    }

    /// Remove a semaphore by name; blocked waiters keep their handle
    pub fn remove_semaphore(&self, name: &str) -> Result<()> {
        self.semaphores
            .lock()
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("semaphore '{}'", name)))?;
        kernel_info!("ipc: semaphore '{}' removed", name);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------------

    /// Snapshot of every registered object, each kind sorted by id
    pub fn list_all(&self) -> IpcListing {
        let mut pipes: Vec<PipeListing> = self
            .pipes
            .lock()
            .iter()
            .map(|(&id, pipe)| PipeListing {
                id,
                read_fd: pipe.read_fd(),
                write_fd: pipe.write_fd(),
                available: pipe.available(),
                max_size: pipe.max_size(),
            })
            .collect();
        pipes.sort_by_key(|p| p.id);

        let mut message_queues: Vec<MessageQueueListing> = self
            .message_queues
            .lock()
            .iter()
            .map(|(name, (id, q))| MessageQueueListing {
                id: *id,
                name: name.clone(),
                messages: q.size(),
                max_messages: q.max_messages(),
                max_msg_size: q.max_msg_size(),
            })
            .collect();
        message_queues.sort_by_key(|q| q.id);

        let mut shared_memory: Vec<SharedMemoryListing> = self
            .shared_memory
            .lock()
            .iter()
            .map(|(name, (id, s))| SharedMemoryListing {
                id: *id,
                name: name.clone(),
                size: s.size(),
                attached: s.attached_pids(),
            })
            .collect();
        shared_memory.sort_by_key(|s| s.id);

        let mut semaphores: Vec<SemaphoreListing> = self
            .semaphores
            .lock()
            .iter()
            .map(|(name, (id, s))| SemaphoreListing {
                id: *id,
                name: name.clone(),
                value: s.value(),
                max_value: s.max_value(),
            })
            .collect();
        semaphores.sort_by_key(|s| s.id);

        IpcListing {
            pipes,
            message_queues,
            shared_memory,
            semaphores,
        }
    }

    pub fn config(&self) -> &IpcConfig {
        &self.config
    }
}

impl Default for IpcManager {
    fn default() -> Self {
        Self::new(IpcConfig::default())
    }
}

/// Insert under the map's lock so the existence check and insert are atomic
fn insert_named<T>(
    map: &Named<T>,
    name: &str,
    object: Arc<T>,
    alloc_id: impl FnOnce() -> IpcId,
) -> Result<IpcId> {
    let mut map = map.lock();
    if map.contains_key(name) {
        return Err(Error::AlreadyExists(name.to_string()));
    }
    let id = alloc_id();
    map.insert(name.to_string(), (id, object));
    Ok(id)
}
