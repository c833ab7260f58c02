//! Memory ledger tests
//!
//! Property tests for the ledger invariants plus a concurrency check.

use std::sync::Arc;
use std::thread;

use nos_memory_management::{MemoryAccounting, MemoryManager};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Allocate(u32, usize),
    Free(u32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..8, 0usize..4096).prop_map(|(pid, bytes)| Op::Allocate(pid, bytes)),
        (1u32..8).prop_map(Op::Free),
    ]
}

proptest! {
    /// used == Σ allocations and used <= total after any operation sequence
    #[test]
    fn ledger_balances(ops in proptest::collection::vec(op_strategy(), 1..64)) {
        let mm = MemoryManager::new(16 * 1024);
        let mut model = std::collections::HashMap::<u32, usize>::new();

        for op in ops {
            match op {
                Op::Allocate(pid, bytes) => {
                    let before = mm.used_memory();
                    match mm.allocate(pid, bytes) {
                        Ok(()) => *model.entry(pid).or_insert(0) += bytes,
                        Err(_) => prop_assert_eq!(mm.used_memory(), before),
                    }
                }
                Op::Free(pid) => {
                    let expected = model.remove(&pid).unwrap_or(0);
                    prop_assert_eq!(mm.free(pid), expected);
                }
            }

            let sum: usize = model.values().sum();
            prop_assert_eq!(mm.used_memory(), sum);
            prop_assert!(mm.used_memory() <= mm.total_memory());
            prop_assert_eq!(mm.get_free_memory(), mm.total_memory() - sum);
        }
    }

    /// A denied allocation never changes any pid's reservation
    #[test]
    fn denied_allocation_is_invisible(first in 1usize..1024, second in 1usize..2048) {
        let mm = MemoryManager::new(1024);
        mm.allocate(1, first).unwrap();
        let result = mm.allocate(2, second);
        if first + second > 1024 {
            prop_assert!(result.is_err());
            prop_assert_eq!(mm.get_process_memory(2), 0);
        } else {
            prop_assert!(result.is_ok());
            prop_assert_eq!(mm.get_process_memory(2), second);
        }
        prop_assert_eq!(mm.used_memory(), mm.get_process_memory(1) + mm.get_process_memory(2));
    }
}

#[test]
fn test_concurrent_allocations_never_exceed_budget() {
    let mm = Arc::new(MemoryManager::new(64 * 1024));
    let handles: Vec<_> = (1..=16u32)
        .map(|pid| {
            let mm = Arc::clone(&mm);
            thread::spawn(move || {
                let mut granted = 0usize;
                for _ in 0..64 {
                    if mm.allocate(pid, 128).is_ok() {
                        granted += 128;
                    }
                }
                granted
            })
        })
        .collect();

    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(granted, 64 * 1024);
    assert_eq!(mm.used_memory(), granted);
    assert_eq!(mm.get_free_memory(), 0);

    let stats = MemoryAccounting::stats(mm.as_ref());
    assert!(stats.tracked_pids <= 16);
    assert_eq!(stats.peak_used, 64 * 1024);
}
