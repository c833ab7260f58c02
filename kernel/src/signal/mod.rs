//! Signal delivery
//!
//! Lifecycle signals are dispatched on identity and can never be caught:
//!
//! - SIGKILL, SIGTERM: terminate, exactly as `terminate_process`
//! - SIGSTOP, SIGTSTP: a running or ready process is stopped, else no-op
//! - SIGCONT: a stopped process is made ready and queued, else no-op
//!
//! Every other signal runs the registered handler on the sender's thread with
//! no kernel lock held, or is queued as pending when there is none.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use nos_api::{Error, Pid, Result, Signal};

use crate::kernel::Kernel;
use crate::process::task::panic_message;
use crate::{kernel_debug, kernel_warn};

/// Signal handler callback
pub type SignalHandler = Arc<dyn Fn(Signal) + Send + Sync>;

/// Wrap a closure as a [`SignalHandler`]
pub fn handler<F>(f: F) -> SignalHandler
where
    F: Fn(Signal) + Send + Sync + 'static,
{
    Arc::new(f)
}

impl Kernel {
    /// Deliver `signal` to `pid`
    pub fn send_signal(&self, pid: Pid, signal: Signal) -> Result<()> {
        let process = self.lookup(pid)?;
        kernel_debug!("pid {} <- {}", pid, signal);

        match signal {
            Signal::Kill | Signal::Term => self.terminate(&process),
            Signal::Stop | Signal::Tstp => {
                self.job_stop(&process);
            }
            Signal::Cont => {
                self.job_continue(&process);
            }
            _ => {
                let handler = process.with_control(|c| {
                    let handler = c.signal_handlers.get(&signal).cloned();
                    if handler.is_none() {
                        c.pending_signals.push(signal);
                    }
                    handler
                });
                if let Some(handler) = handler {
                    run_handler(pid, signal, &handler);
                }
            }
        }
        Ok(())
    }

    /// Install or clear (`None`) the handler for a catchable signal
    pub fn register_signal_handler(
        &self,
        pid: Pid,
        signal: Signal,
        handler: Option<SignalHandler>,
    ) -> Result<()> {
        if signal.is_lifecycle() {
            return Err(Error::InvalidArgument(format!("{} cannot be caught", signal)));
        }
        let process = self.lookup(pid)?;
        process.with_control(|c| match handler {
            Some(handler) => {
                c.signal_handlers.insert(signal, handler);
            }
            None => {
                c.signal_handlers.remove(&signal);
            }
        });
        Ok(())
    }

    /// Take every pending signal, oldest first
    pub fn get_pending_signals(&self, pid: Pid) -> Result<Vec<Signal>> {
        let process = self.lookup(pid)?;
        Ok(process.with_control(|c| std::mem::take(&mut c.pending_signals)))
    }
}

fn run_handler(pid: Pid, signal: Signal, handler: &SignalHandler) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(signal))) {
        kernel_warn!(
            "pid {}: {} handler panicked: {}",
            pid,
            signal,
            panic_message(payload.as_ref())
        );
    }
}
