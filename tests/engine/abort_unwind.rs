//! Aborts leave no trace
//!
//! Whatever a transaction staged, locked, or reserved, aborting it must
//! restore the store to exactly its previous state.

use crate::common::*;
use proptest::prelude::*;

const PARTS: [usize; 3] = [0, 1, 2];

#[derive(Debug, Clone)]
enum Op {
    Read(u64, usize),
    Write(u64, usize, i64),
    Delta(u64, usize, i64),
    Insert(u64, usize),
    Delete(u64, usize),
}

fn op() -> impl Strategy<Value = Op> {
    let k = 0u64..4;
    let p = 0usize..3;
    prop_oneof![
        (k.clone(), p.clone()).prop_map(|(k, p)| Op::Read(k, p)),
        (k.clone(), p.clone(), -50i64..50).prop_map(|(k, p, v)| Op::Write(k, p, v)),
        (k.clone(), p.clone(), -50i64..50).prop_map(|(k, p, v)| Op::Delta(k, p, v)),
        (100u64..103, p.clone()).prop_map(|(k, p)| Op::Insert(k, p)),
        (k, p).prop_map(|(k, p)| Op::Delete(k, p)),
    ]
}

fn mixed_bed() -> Testbed {
    bank(
        Testbed::builder().partition_protocols(vec![Protocol::Partition, Protocol::Locking, Protocol::Occ]),
        4,
        100,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn abort_restores_store(ops in prop::collection::vec(op(), 0..12), explicit in any::<bool>()) {
        let bed = mixed_bed();
        let before = dump(&bed);
        {
            let mut w = bed.worker(0).unwrap();
            let mut txn = w.begin_on(&PARTS).unwrap();
            for op in ops {
                // not-found and duplicate errors leave the transaction open
                let _ = match op {
                    Op::Read(k, p) => txn.read(ACCOUNTS, &key(k), p, BALANCE).map(|_| ()),
                    Op::Write(k, p, v) => txn.write(ACCOUNTS, &key(k), p, BALANCE, Value::Int(v)),
                    Op::Delta(k, p, v) => txn.delta(ACCOUNTS, &key(k), p, BALANCE, Value::Int(v)),
                    Op::Insert(k, p) => txn.insert(ACCOUNTS, key(k), p, account(1)),
                    Op::Delete(k, p) => txn.delete(ACCOUNTS, &key(k), p),
                };
                prop_assert!(txn.is_active());
            }
            if explicit {
                txn.abort();
            } else {
                drop(txn);
            }
        }
        prop_assert_eq!(dump(&bed), before);
        prop_assert_eq!(bed.store().pending_reservations(), 0);
        prop_assert_eq!(bed.manager().router().gate().active(), 0);
        assert_all_writable(&bed);
    }
}

// ============================================================================
// Conflict-driven aborts
// ============================================================================

#[test]
fn failed_commit_unwinds_every_protocol() {
    let bed = mixed_bed();
    let before = dump(&bed);
    let mut w0 = bed.worker(0).unwrap();
    let mut w1 = bed.worker(1).unwrap();

    let mut txn = w0.begin_on(&PARTS).unwrap();
    txn.delta(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(-5)).unwrap();
    txn.delta(ACCOUNTS, &key(0), 1, BALANCE, Value::Int(5)).unwrap();
    txn.read(ACCOUNTS, &key(1), 2, BALANCE).unwrap();
    txn.write(ACCOUNTS, &key(2), 2, BALANCE, Value::Int(0)).unwrap();
    txn.insert(ACCOUNTS, key(50), 1, account(7)).unwrap();
    txn.delete(ACCOUNTS, &key(3), 2).unwrap();

    // invalidate the OCC read
    w1.run(|t| t.delta(ACCOUNTS, &key(1), 2, BALANCE, Value::Int(1))).unwrap();

    let err = txn.commit().unwrap_err();
    assert_eq!(err.abort_reason(), Some(AbortReason::ReadChanged));

    let after = dump(&bed);
    let changed: Vec<_> = before.iter().zip(&after).filter(|(a, b)| a != b).collect();
    assert_eq!(changed.len(), 1, "only the concurrent delta is visible");
    assert_eq!(balance(&bed, 1, 2), 101);
    assert!(!bed.contains(ACCOUNTS, &key(50), 1));
    assert!(bed.contains(ACCOUNTS, &key(3), 2));
    assert_eq!(bed.store().pending_reservations(), 0);
    assert_all_writable(&bed);
}

#[test]
fn lock_failure_mid_transaction_unwinds_earlier_locks() {
    let bed = bank(Testbed::builder().protocol(Protocol::Locking).partitions(1).lock_trial(2), 3, 10);
    let mut w0 = bed.worker(0).unwrap();
    let mut w1 = bed.worker(1).unwrap();

    let mut holder = w1.begin().unwrap();
    holder.write(ACCOUNTS, &key(2), 0, BALANCE, Value::Int(0)).unwrap();

    let mut txn = w0.begin().unwrap();
    txn.write(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(99)).unwrap();
    txn.read(ACCOUNTS, &key(1), 0, BALANCE).unwrap();
    let err = txn.write(ACCOUNTS, &key(2), 0, BALANCE, Value::Int(99)).unwrap_err();
    assert_eq!(err.abort_reason(), Some(AbortReason::WriteLock));
    assert!(!txn.is_active());
    // later calls see a closed transaction
    assert!(txn.read(ACCOUNTS, &key(0), 0, BALANCE).is_err());
    drop(txn);

    holder.abort();
    assert_eq!(balance(&bed, 0, 0), 10);
    assert_all_writable(&bed);
}
