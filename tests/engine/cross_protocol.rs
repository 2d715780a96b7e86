//! One transaction spanning partitions under different protocols

use crate::common::*;

fn version(bed: &Testbed, k: u64, partition: usize) -> Tid {
    let record = bed.store().get_record(ACCOUNTS, &key(k), partition).unwrap();
    record.occ().unwrap().is_unlocked().1
}

#[test]
fn commit_lock_failure_rolls_back_locked_partition() {
    let bed = bank(
        Testbed::builder()
            .partition_protocols(vec![Protocol::Locking, Protocol::Occ])
            .occ_lock_policy(OccLockPolicy::NoWait),
        2,
        10,
    );
    let mut w = bed.worker(0).unwrap();

    let mut txn = w.begin().unwrap();
    txn.delta(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(-4)).unwrap();
    txn.delta(ACCOUNTS, &key(0), 1, BALANCE, Value::Int(4)).unwrap();

    // someone else is mid-commit on the OCC side
    let contended = bed.store().get_record(ACCOUNTS, &key(0), 1).unwrap();
    let (locked, old) = contended.occ().unwrap().lock(1);
    assert!(locked);

    let err = txn.commit().unwrap_err();
    assert_eq!(err.abort_reason(), Some(AbortReason::CommitLock));
    contended.occ().unwrap().unlock(old);

    assert_eq!(balance(&bed, 0, 0), 10);
    assert_eq!(balance(&bed, 0, 1), 10);
    assert_eq!(bed.stats().aborts_for(AbortReason::CommitLock), 1);
    assert_all_writable(&bed);
}

#[test]
fn transfer_across_protocols_is_atomic() {
    let bed = bank(Testbed::builder().partition_protocols(vec![Protocol::Locking, Protocol::Occ]), 2, 10);
    let mut w = bed.worker(0).unwrap();

    let mut txn = w.begin().unwrap();
    txn.delta(ACCOUNTS, &key(1), 0, BALANCE, Value::Int(-3)).unwrap();
    txn.delta(ACCOUNTS, &key(1), 1, BALANCE, Value::Int(3)).unwrap();
    // nothing visible before commit
    assert_eq!(balance(&bed, 1, 0), 10);
    assert_eq!(balance(&bed, 1, 1), 10);
    let tid = txn.commit().unwrap();

    assert_eq!(balance(&bed, 1, 0), 7);
    assert_eq!(balance(&bed, 1, 1), 13);
    // both sides publish the same commit version
    assert_eq!(version(&bed, 1, 0), tid);
    assert_eq!(version(&bed, 1, 1), tid);
}

#[test]
fn occ_validation_failure_releases_two_phase_locks() {
    let bed = bank(Testbed::builder().partition_protocols(vec![Protocol::Locking, Protocol::Occ]), 2, 10);
    let mut w0 = bed.worker(0).unwrap();
    let mut w1 = bed.worker(1).unwrap();

    let mut txn = w0.begin().unwrap();
    let seen = txn.read(ACCOUNTS, &key(0), 1, BALANCE).unwrap();
    txn.write(ACCOUNTS, &key(0), 0, BALANCE, seen).unwrap();

    w1.run(|t| t.write(ACCOUNTS, &key(0), 1, BALANCE, Value::Int(50))).unwrap();

    let err = txn.commit().unwrap_err();
    assert_eq!(err.abort_reason(), Some(AbortReason::ReadChanged));
    assert_eq!(balance(&bed, 0, 0), 10);
    assert_all_writable(&bed);
}

#[test]
fn pcc_partition_joins_mixed_transaction() {
    let bed = bank(
        Testbed::builder().partition_protocols(vec![Protocol::Partition, Protocol::Locking, Protocol::Occ]),
        1,
        30,
    );
    let mut w = bed.worker(0).unwrap();
    w.run_on(&[0], |txn| {
        for p in 0..3 {
            txn.delta(ACCOUNTS, &key(0), p, BALANCE, Value::Int(-10))?;
        }
        txn.insert(ACCOUNTS, key(9), 0, account(30))
    })
    .unwrap();

    for p in 0..3 {
        assert_eq!(balance(&bed, 0, p), 20);
    }
    assert_eq!(balance(&bed, 9, 0), 30);
    assert_eq!(bed.sum_int(ACCOUNTS, BALANCE).unwrap(), 90);

    let stats = bed.stats();
    assert_eq!(stats.cross_partition, 1);
    // the partition latch went back with the transaction
    assert!(!bed.store().partition_latch(0).unwrap().is_locked());
}

#[test]
fn protocols_are_reported_per_partition() {
    let bed = bank(Testbed::builder().partition_protocols(vec![Protocol::Occ, Protocol::Partition]), 1, 0);
    let mut w = bed.worker(0).unwrap();
    let txn = w.begin_on(&[1]).unwrap();
    assert_eq!(txn.protocol(0).unwrap(), Protocol::Occ);
    assert_eq!(txn.protocol(1).unwrap(), Protocol::Partition);
    assert!(txn.protocol(2).is_err());
    assert!(bed.store().partition_latch(1).unwrap().is_locked());
    txn.commit().unwrap();
    assert!(!bed.store().partition_latch(1).unwrap().is_locked());
}
