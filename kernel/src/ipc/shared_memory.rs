//! Shared memory segments
//!
//! A segment is a fixed, zero-initialized byte buffer plus the set of pids
//! attached to it. Accesses are clipped to the segment; an offset at or past
//! the end is an error.

use hashbrown::HashSet;

use nos_api::{Error, Pid, Result};

use crate::sync::Mutex;

struct SegmentState {
    data: Vec<u8>,
    attached: HashSet<Pid>,
}

/// Named shared memory segment
pub struct SharedMemory {
    name: String,
    size: usize,
    state: Mutex<SegmentState>,
}

impl SharedMemory {
    /// Create a zeroed segment of `size` bytes
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            state: Mutex::new(SegmentState {
                data: vec![0; size],
                attached: HashSet::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Attach `pid`; false if it was already attached
    pub fn attach(&self, pid: Pid) -> bool {
        self.state.lock().attached.insert(pid)
    }

    /// Detach `pid`; false if it was not attached
    pub fn detach(&self, pid: Pid) -> bool {
        self.state.lock().attached.remove(&pid)
    }

    /// Attached pids in ascending order
    pub fn attached_pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.state.lock().attached.iter().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn attach_count(&self) -> usize {
        self.state.lock().attached.len()
    }

    /// Copy `data` in at `offset`, returning the byte count written
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<usize> {
        self.check_offset(offset)?;
        let n = data.len().min(self.size - offset);
        self.state.lock().data[offset..offset + n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    /// Copy out up to `len` bytes starting at `offset`
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.check_offset(offset)?;
        let n = len.min(self.size - offset);
        Ok(self.state.lock().data[offset..offset + n].to_vec())
    }

    fn check_offset(&self, offset: usize) -> Result<()> {
        if offset >= self.size {
            return Err(Error::OutOfBounds {
                offset,
                size: self.size,
            });
        }
        Ok(())
    }
}

impl core::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("attached", &self.attached_pids())
            .finish()
    }
}
