//! Core types used throughout NOS operating system

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Process identifier type
pub type Pid = u32;

/// File descriptor type
pub type Fd = u32;

/// Scheduling priority (informational, lower is more urgent by convention)
pub type Priority = i32;

/// Size type
pub type Size = usize;

/// Represents a process state
///
/// `New -> Ready -> Running -> {Waiting | Stopped | Terminated}`.
/// `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Process has been created but not yet admitted
    New,
    /// Process is ready to run
    Ready,
    /// Process is running
    Running,
    /// Process is blocked on a resource
    Waiting,
    /// Process was stopped by job control
    Stopped,
    /// Process has terminated
    Terminated,
}

impl ProcessState {
    /// Returns true once the process can never run again
    pub fn is_terminal(self) -> bool {
        self == ProcessState::Terminated
    }

    /// Short lowercase name, as shown by `ps`
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::New => "new",
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Waiting => "waiting",
            ProcessState::Stopped => "stopped",
            ProcessState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// POSIX signals understood by the kernel
///
/// Discriminants are the POSIX signal numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum Signal {
    /// Hangup
    #[serde(rename = "SIGHUP")]
    Hup = 1,
    /// Interrupt
    #[serde(rename = "SIGINT")]
    Int = 2,
    /// Quit
    #[serde(rename = "SIGQUIT")]
    Quit = 3,
    /// Kill (cannot be caught)
    #[serde(rename = "SIGKILL")]
    Kill = 9,
    /// User-defined 1
    #[serde(rename = "SIGUSR1")]
    Usr1 = 10,
    /// User-defined 2
    #[serde(rename = "SIGUSR2")]
    Usr2 = 12,
    /// Termination
    #[serde(rename = "SIGTERM")]
    Term = 15,
    /// Continue
    #[serde(rename = "SIGCONT")]
    Cont = 18,
    /// Stop (cannot be caught)
    #[serde(rename = "SIGSTOP")]
    Stop = 19,
    /// Terminal stop
    #[serde(rename = "SIGTSTP")]
    Tstp = 20,
}

impl Signal {
    /// Every signal the kernel knows about, in numeric order
    pub const ALL: [Signal; 10] = [
        Signal::Hup,
        Signal::Int,
        Signal::Quit,
        Signal::Kill,
        Signal::Usr1,
        Signal::Usr2,
        Signal::Term,
        Signal::Cont,
        Signal::Stop,
        Signal::Tstp,
    ];

    /// POSIX signal number
    pub fn number(self) -> i32 {
        self as i32
    }

    /// Look up a signal by number
    pub fn from_number(number: i32) -> Option<Signal> {
        Signal::ALL.iter().copied().find(|sig| sig.number() == number)
    }

    /// Look up a signal by name, with or without the `SIG` prefix
    pub fn from_name(name: &str) -> Option<Signal> {
        let bare = match name.get(..3) {
            Some(prefix) if prefix.eq_ignore_ascii_case("SIG") => &name[3..],
            _ => name,
        };
        Signal::ALL
            .iter()
            .copied()
            .find(|sig| sig.name()[3..].eq_ignore_ascii_case(bare))
    }

    /// Canonical `SIGxxx` name
    pub fn name(self) -> &'static str {
        match self {
            Signal::Hup => "SIGHUP",
            Signal::Int => "SIGINT",
            Signal::Quit => "SIGQUIT",
            Signal::Kill => "SIGKILL",
            Signal::Usr1 => "SIGUSR1",
            Signal::Usr2 => "SIGUSR2",
            Signal::Term => "SIGTERM",
            Signal::Cont => "SIGCONT",
            Signal::Stop => "SIGSTOP",
            Signal::Tstp => "SIGTSTP",
        }
    }

    /// Signals that force a lifecycle transition and can never be handled
    pub fn is_lifecycle(self) -> bool {
        matches!(
            self,
            Signal::Kill | Signal::Term | Signal::Stop | Signal::Tstp | Signal::Cont
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for Signal {
    type Error = crate::error::Error;

    fn try_from(number: i32) -> Result<Self> {
        Signal::from_number(number).ok_or(crate::error::Error::InvalidArgument(
            alloc::format!("unknown signal number {}", number),
        ))
    }
}
