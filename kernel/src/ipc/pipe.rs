//! Bounded byte pipe
//!
//! Writes never block: a write larger than the free space is truncated and
//! the short count returned. Reads never block either; an empty pipe reads as
//! an empty vector.

use std::collections::VecDeque;

use nos_api::{Error, Fd, Result};

use crate::sync::Mutex;

/// Default pipe capacity
pub const PIPE_BUF_SIZE: usize = 64 * 1024;

/// Which end of a pipe a descriptor refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipeEnd {
    Read,
    Write,
}

struct PipeState {
    buffer: VecDeque<u8>,
    closed_read: bool,
    closed_write: bool,
}

/// Unidirectional byte channel with a fixed capacity
pub struct Pipe {
    read_fd: Fd,
    write_fd: Fd,
    max_size: usize,
    state: Mutex<PipeState>,
}

impl Pipe {
    /// Create an empty pipe
    pub fn new(read_fd: Fd, write_fd: Fd, max_size: usize) -> Self {
        Self {
            read_fd,
            write_fd,
            max_size,
            state: Mutex::new(PipeState {
                buffer: VecDeque::new(),
                closed_read: false,
                closed_write: false,
            }),
        }
    }

    pub fn read_fd(&self) -> Fd {
        self.read_fd
    }

    pub fn write_fd(&self) -> Fd {
        self.write_fd
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Append as much of `data` as fits, returning the byte count written
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if state.closed_write {
            return Err(Error::BrokenPipe);
        }
        let room = self.max_size - state.buffer.len();
        let n = data.len().min(room);
        state.buffer.extend(&data[..n]);
        Ok(n)
    }

    /// Drain up to `size` bytes from the front, or everything for `None`
    pub fn read(&self, size: Option<usize>) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        if state.closed_read {
            return Err(Error::Closed("read end of pipe".into()));
        }
        let n = size.map_or(state.buffer.len(), |s| s.min(state.buffer.len()));
        Ok(state.buffer.drain(..n).collect())
    }

    /// Bytes waiting to be read
    pub fn available(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn close_read(&self) {
        self.state.lock().closed_read = true;
    }

    pub fn close_write(&self) {
        self.state.lock().closed_write = true;
    }

    /// Close one end
    pub fn close(&self, end: PipeEnd) {
        match end {
            PipeEnd::Read => self.close_read(),
            PipeEnd::Write => self.close_write(),
        }
    }

    pub fn is_fully_closed(&self) -> bool {
        let state = self.state.lock();
        state.closed_read && state.closed_write
    }
}

impl core::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipe")
            .field("read_fd", &self.read_fd)
            .field("write_fd", &self.write_fd)
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_all() {
        let pipe = Pipe::new(100, 101, PIPE_BUF_SIZE);
        assert_eq!(pipe.write(b"hello").unwrap(), 5);
        assert_eq!(pipe.read(None).unwrap(), b"hello");
        assert_eq!(pipe.available(), 0);
    }

    #[test]
    fn test_partial_read() {
        let pipe = Pipe::new(100, 101, PIPE_BUF_SIZE);
        pipe.write(b"0123456789").unwrap();
        assert_eq!(pipe.available(), 10);
        assert_eq!(pipe.read(Some(5)).unwrap(), b"01234");
        assert_eq!(pipe.available(), 5);
        assert_eq!(pipe.read(Some(100)).unwrap(), b"56789");
    }

    #[test]
    fn test_write_truncates_at_capacity() {
        let pipe = Pipe::new(100, 101, 8);
        assert_eq!(pipe.write(b"abcdef").unwrap(), 6);
        assert_eq!(pipe.write(b"ghijkl").unwrap(), 2);
        assert_eq!(pipe.write(b"m").unwrap(), 0);
        assert_eq!(pipe.read(None).unwrap(), b"abcdefgh");
    }

    #[test]
    fn test_closed_ends() {
        let pipe = Pipe::new(100, 101, 16);
        pipe.write(b"xy").unwrap();
        pipe.close_write();
        assert_eq!(pipe.write(b"z"), Err(Error::BrokenPipe));
        // Buffered data stays readable after the writer goes away
        assert_eq!(pipe.read(None).unwrap(), b"xy");
        assert!(!pipe.is_fully_closed());

        pipe.close(PipeEnd::Read);
        assert!(matches!(pipe.read(None), Err(Error::Closed(_))));
        assert!(pipe.is_fully_closed());
    }

    #[test]
    fn test_empty_read() {
        let pipe = Pipe::new(100, 101, 16);
        assert!(pipe.read(None).unwrap().is_empty());
        assert!(pipe.read(Some(4)).unwrap().is_empty());
    }
}
