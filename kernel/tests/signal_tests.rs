//! Signal delivery tests
//! Tests for lifecycle signals, handlers, and pending signal queues

#![cfg(test)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;
use nos_kernel::signal::handler;
use nos_kernel::{Error, ProcessState, Signal, Task};

#[cfg(test)]
mod lifecycle_signal_tests {
    use super::*;

    #[test]
    fn test_sigstop_then_sigcont_on_running_process() {
        let kernel = test_kernel();
        let (task, gate) = gated_task();
        let pid = kernel.create_process("vim", task, 5, 4 * KIB).unwrap();
        kernel.run_once();
        assert_eq!(kernel.get_process(pid).unwrap().state, ProcessState::Running);

        kernel.send_signal(pid, Signal::Stop).unwrap();
        assert_eq!(kernel.get_process(pid).unwrap().state, ProcessState::Stopped);
        // Stopped survives the next scheduling round
        assert!(!kernel.run_once());
        assert_eq!(kernel.get_process(pid).unwrap().state, ProcessState::Stopped);

        kernel.send_signal(pid, Signal::Cont).unwrap();
        assert_eq!(kernel.get_process(pid).unwrap().state, ProcessState::Ready);
        assert!(kernel.run_once());
        assert_eq!(kernel.scheduler().current_pid(), Some(pid));

        open(&gate);
        assert!(kernel.run_once());
        assert_eq!(kernel.get_process(pid).unwrap().state, ProcessState::Terminated);
    }

    #[test]
    fn test_sigtstp_stops_ready_process() {
        let kernel = test_kernel();
        let pid = kernel.create_process("less", Task::noop(), 5, 0).unwrap();
        kernel.send_signal(pid, Signal::Tstp).unwrap();
        assert_eq!(kernel.get_process(pid).unwrap().state, ProcessState::Stopped);
        assert!(!kernel.run_once());
    }

    #[test]
    fn test_repeated_stop_cont_queues_once() {
        let kernel = test_kernel();
        let pid = kernel.create_process("top", Task::noop(), 5, 0).unwrap();
        for _ in 0..3 {
            kernel.send_signal(pid, Signal::Stop).unwrap();
            kernel.send_signal(pid, Signal::Cont).unwrap();
        }
        assert_eq!(kernel.scheduler().ready_count(), 1);
    }

    #[test]
    fn test_sigkill_idempotent_frees_once() {
        let kernel = test_kernel();
        let total = kernel.free_memory();
        let pid = kernel.create_process("victim", Task::noop(), 5, 16 * KIB).unwrap();
        let bystander = kernel.create_process("bystander", Task::noop(), 5, 8 * KIB).unwrap();

        kernel.send_signal(pid, Signal::Kill).unwrap();
        kernel.send_signal(pid, Signal::Kill).unwrap();
        kernel.send_signal(pid, Signal::Term).unwrap();

        assert_eq!(kernel.get_process(pid).unwrap().state, ProcessState::Terminated);
        assert_eq!(kernel.free_memory(), total - 8 * KIB);
        assert_eq!(kernel.memory_stats().used, 8 * KIB);
        assert_eq!(kernel.get_process(bystander).unwrap().state, ProcessState::Ready);
    }

    #[test]
    fn test_lifecycle_signals_on_terminated_are_noops() {
        let kernel = test_kernel();
        let pid = kernel.create_process("gone", Task::noop(), 5, 0).unwrap();
        kernel.terminate_process(pid).unwrap();

        for sig in [Signal::Stop, Signal::Tstp, Signal::Cont, Signal::Term] {
            assert!(kernel.send_signal(pid, sig).is_ok());
            assert_eq!(kernel.get_process(pid).unwrap().state, ProcessState::Terminated);
        }
    }

    #[test]
    fn test_sigcont_on_ready_is_noop() {
        let kernel = test_kernel();
        let pid = kernel.create_process("busy", Task::noop(), 5, 0).unwrap();
        kernel.send_signal(pid, Signal::Cont).unwrap();
        assert_eq!(kernel.get_process(pid).unwrap().state, ProcessState::Ready);
        assert!(kernel.get_pending_signals(pid).unwrap().is_empty());
    }

    #[test]
    fn test_kill_detaches_shared_memory() {
        let kernel = test_kernel();
        let pid = kernel.create_process("shm-user", Task::noop(), 5, 0).unwrap();
        kernel.ipc().create_shared_memory("frame", 64).unwrap();
        let segment = kernel.ipc().get_shared_memory("frame").unwrap();
        segment.attach(pid);

        kernel.send_signal(pid, Signal::Kill).unwrap();
        assert!(segment.attached_pids().is_empty());
        assert!(kernel.ipc().remove_shared_memory("frame").is_ok());
    }
}

#[cfg(test)]
mod handler_tests {
    use super::*;

    #[test]
    fn test_handler_runs_on_sender_thread() {
        let kernel = test_kernel();
        let pid = kernel.create_process("nginx", Task::noop(), 5, 0).unwrap();
        let reloads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reloads);
        kernel
            .register_signal_handler(
                pid,
                Signal::Hup,
                Some(handler(move |sig| {
                    assert_eq!(sig, Signal::Hup);
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();

        kernel.send_signal(pid, Signal::Hup).unwrap();
        kernel.send_signal(pid, Signal::Hup).unwrap();
        assert_eq!(reloads.load(Ordering::SeqCst), 2);
        assert_eq!(
            kernel.get_process(pid).unwrap().handled_signals,
            vec![Signal::Hup]
        );
    }

    #[test]
    fn test_pending_signals_ordered_and_drained() {
        let kernel = test_kernel();
        let pid = kernel.create_process("app", Task::noop(), 5, 0).unwrap();
        for sig in [Signal::Usr1, Signal::Int, Signal::Usr1, Signal::Quit] {
            kernel.send_signal(pid, sig).unwrap();
        }
        assert_eq!(
            kernel.get_process(pid).unwrap().pending_signals,
            vec![Signal::Usr1, Signal::Int, Signal::Usr1, Signal::Quit]
        );
        assert_eq!(kernel.get_pending_signals(pid).unwrap().len(), 4);
        assert!(kernel.get_pending_signals(pid).unwrap().is_empty());
    }

    #[test]
    fn test_sigkill_cannot_be_caught() {
        let kernel = test_kernel();
        let pid = kernel.create_process("stubborn", Task::noop(), 5, 0).unwrap();
        let err = kernel
            .register_signal_handler(pid, Signal::Kill, Some(handler(|_| {})))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        kernel.send_signal(pid, Signal::Kill).unwrap();
        assert_eq!(kernel.get_process(pid).unwrap().state, ProcessState::Terminated);
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let kernel = test_kernel();
        let pid = kernel.create_process("fragile", Task::noop(), 5, 0).unwrap();
        kernel
            .register_signal_handler(pid, Signal::Usr1, Some(handler(|_| panic!("handler bug"))))
            .unwrap();

        assert!(kernel.send_signal(pid, Signal::Usr1).is_ok());
        assert!(kernel.get_pending_signals(pid).unwrap().is_empty());
        assert!(kernel.send_signal(pid, Signal::Usr2).is_ok());
        assert_eq!(kernel.get_pending_signals(pid).unwrap(), vec![Signal::Usr2]);
    }

    #[test]
    fn test_unknown_pid_errors() {
        let kernel = test_kernel();
        assert!(matches!(kernel.send_signal(77, Signal::Term), Err(Error::NotFound(_))));
        assert!(matches!(
            kernel.register_signal_handler(77, Signal::Usr1, None),
            Err(Error::NotFound(_))
        ));
    }
}
