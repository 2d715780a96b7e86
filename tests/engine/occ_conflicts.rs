//! OCC read validation and commit locking

use crate::common::*;
use std::sync::atomic::{AtomicU64, Ordering};

fn occ_bed(policy: OccLockPolicy) -> Testbed {
    bank(Testbed::builder().mode(SystemMode::Occ).partitions(1).occ_lock_policy(policy), 4, 10)
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn second_writer_of_same_key_fails_validation() {
    let bed = occ_bed(OccLockPolicy::Wait);
    let mut w1 = bed.worker(1).unwrap();
    let mut w2 = bed.worker(2).unwrap();

    let mut t1 = w1.begin().unwrap();
    let mut t2 = w2.begin().unwrap();
    assert_eq!(t1.read(ACCOUNTS, &key(0), 0, BALANCE).unwrap(), Value::Int(10));
    assert_eq!(t2.read(ACCOUNTS, &key(0), 0, BALANCE).unwrap(), Value::Int(10));
    t1.write(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(11)).unwrap();
    t2.write(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(12)).unwrap();

    t1.commit().unwrap();
    let err = t2.commit().unwrap_err();
    assert_eq!(err.abort_reason(), Some(AbortReason::ReadChanged));
    assert_eq!(balance(&bed, 0, 0), 11);
}

#[test]
fn blind_writes_do_not_conflict() {
    let bed = occ_bed(OccLockPolicy::Wait);
    let mut w1 = bed.worker(1).unwrap();
    let mut w2 = bed.worker(2).unwrap();

    let mut t1 = w1.begin().unwrap();
    let mut t2 = w2.begin().unwrap();
    t1.write(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(1)).unwrap();
    t2.write(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(2)).unwrap();
    t1.commit().unwrap();
    t2.commit().unwrap();
    // last committer wins
    assert_eq!(balance(&bed, 0, 0), 2);
}

#[test]
fn read_your_own_writes() {
    let bed = occ_bed(OccLockPolicy::Wait);
    let mut w = bed.worker(0).unwrap();
    let mut txn = w.begin().unwrap();
    txn.delta(ACCOUNTS, &key(1), 0, BALANCE, Value::Int(5)).unwrap();
    assert_eq!(txn.read(ACCOUNTS, &key(1), 0, BALANCE).unwrap(), Value::Int(15));
    txn.delta(ACCOUNTS, &key(1), 0, BALANCE, Value::Int(5)).unwrap();
    assert_eq!(txn.read(ACCOUNTS, &key(1), 0, BALANCE).unwrap(), Value::Int(20));
    // still invisible outside
    assert_eq!(balance(&bed, 1, 0), 10);
    txn.commit().unwrap();
    assert_eq!(balance(&bed, 1, 0), 20);
}

#[test]
fn reader_of_untouched_key_commits_alongside_writer() {
    let bed = occ_bed(OccLockPolicy::Wait);
    let mut w1 = bed.worker(1).unwrap();
    let mut w2 = bed.worker(2).unwrap();

    let mut reader = w1.begin().unwrap();
    reader.read(ACCOUNTS, &key(2), 0, BALANCE).unwrap();
    w2.run(|txn| txn.write(ACCOUNTS, &key(3), 0, BALANCE, Value::Int(0))).unwrap();
    reader.commit().unwrap();
}

#[test]
fn stats_count_validation_aborts() {
    let bed = occ_bed(OccLockPolicy::Wait);
    let mut w1 = bed.worker(1).unwrap();
    let mut w2 = bed.worker(2).unwrap();

    let mut t1 = w1.begin().unwrap();
    t1.read(ACCOUNTS, &key(0), 0, BALANCE).unwrap();
    w2.run(|txn| txn.delta(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(1))).unwrap();
    t1.write(ACCOUNTS, &key(0), 0, OWNER, Value::from("late")).unwrap();
    assert!(t1.commit().is_err());

    let stats = bed.stats();
    assert_eq!(stats.aborts_for(AbortReason::ReadChanged), 1);
    assert_eq!(stats.commits, 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_increments_are_not_lost() {
    for policy in [OccLockPolicy::Wait, OccLockPolicy::NoWait] {
        let bed = bank(
            Testbed::builder()
                .mode(SystemMode::Occ)
                .partitions(1)
                .occ_lock_policy(policy)
                .max_retries(1_000_000),
            1,
            0,
        );
        let commits = AtomicU64::new(0);
        bed.run_parallel(4, |w| {
            for _ in 0..250 {
                w.run(|txn| {
                    let v = txn.read(ACCOUNTS, &key(0), 0, BALANCE)?;
                    let next = v.as_int().unwrap_or_default() + 1;
                    txn.write(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(next))
                })
                .unwrap();
                commits.fetch_add(1, Ordering::Relaxed);
            }
        })
        .unwrap();
        assert_eq!(balance(&bed, 0, 0), commits.load(Ordering::Relaxed) as i64);
        assert_eq!(balance(&bed, 0, 0), 1000);
    }
}
