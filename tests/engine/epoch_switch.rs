//! Protocol switches between epochs

use crate::common::*;
use adaptcc::{FixedController, ThresholdController};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[test]
fn switch_waits_for_in_flight_transactions() {
    let bed = bank(Testbed::builder().partitions(2), 1, 10);
    let mut w = bed.worker(0).unwrap();

    let mut txn = w.begin().unwrap();
    txn.delta(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(1)).unwrap();

    let switched = AtomicBool::new(false);
    std::thread::scope(|s| {
        let handle = s.spawn(|| {
            let generation = bed.switch_protocols(vec![Protocol::Locking, Protocol::Locking]).unwrap();
            switched.store(true, Ordering::SeqCst);
            generation
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!switched.load(Ordering::SeqCst), "switch must drain the open transaction");
        // the open transaction still runs under the table it started with
        assert_eq!(txn.generation(), 0);
        assert_eq!(txn.protocol(0).unwrap(), Protocol::Occ);
        txn.commit().unwrap();

        assert_eq!(handle.join().unwrap(), 1);
    });

    assert!(switched.load(Ordering::SeqCst));
    assert_eq!(bed.routes().protocols(), &[Protocol::Locking, Protocol::Locking]);
    assert_eq!(balance(&bed, 0, 0), 11);

    let txn = w.begin().unwrap();
    assert_eq!(txn.generation(), 1);
    assert_eq!(txn.protocol(0).unwrap(), Protocol::Locking);
}

#[test]
fn switches_under_load_keep_totals() {
    let bed = bank(Testbed::builder().partitions(3).max_retries(1_000_000), 4, 100);
    let total = bed.sum_int(ACCOUNTS, BALANCE).unwrap();
    let running = AtomicBool::new(true);
    let committed = AtomicU64::new(0);

    let plans = [
        vec![Protocol::Locking, Protocol::Occ, Protocol::Partition],
        vec![Protocol::Partition, Protocol::Partition, Protocol::Locking],
        vec![Protocol::Occ, Protocol::Locking, Protocol::Occ],
        vec![Protocol::Partition, Protocol::Occ, Protocol::Locking],
    ];

    std::thread::scope(|s| {
        for id in 0..3 {
            let bed = &bed;
            let running = &running;
            let committed = &committed;
            s.spawn(move || {
                let mut w = bed.worker(id).unwrap();
                let mut n = 0u64;
                while running.load(Ordering::Relaxed) {
                    let from = (n % 4, (n as usize + id) % 3);
                    let to = ((n + 1) % 4, (n as usize + id + 1) % 3);
                    w.run_on(&[from.1, to.1], |txn| {
                        txn.delta(ACCOUNTS, &key(from.0), from.1, BALANCE, Value::Int(-1))?;
                        txn.delta(ACCOUNTS, &key(to.0), to.1, BALANCE, Value::Int(1))
                    })
                    .unwrap();
                    committed.fetch_add(1, Ordering::Relaxed);
                    n += 1;
                }
            });
        }

        for (i, plan) in plans.iter().cycle().take(12).enumerate() {
            std::thread::sleep(Duration::from_millis(5));
            assert_eq!(bed.switch_protocols(plan.clone()).unwrap(), i as u64 + 1);
        }
        running.store(false, Ordering::Relaxed);
    });

    assert!(committed.load(Ordering::Relaxed) > 0);
    assert_eq!(bed.routes().generation(), 12);
    assert_eq!(bed.sum_int(ACCOUNTS, BALANCE).unwrap(), total);
    assert_eq!(bed.manager().router().gate().active(), 0);
    assert_all_writable(&bed);
}

#[test]
fn controller_moves_single_partition_workload_to_pcc() {
    let bed = bank(Testbed::builder().partitions(2), 2, 10);
    let mut w = bed.worker(0).unwrap();
    for n in 0..20u64 {
        let p = (n % 2) as usize;
        w.run(|txn| txn.delta(ACCOUNTS, &key(n % 2), p, BALANCE, Value::Int(1))).unwrap();
    }

    let features = bed.features();
    assert_eq!(features.mean_partitions, 1.0);
    assert_eq!(features.conflict_rate, 0.0);

    let generation = bed.run_epoch(&ThresholdController::default(), &[0, 1]).unwrap();
    assert_eq!(generation, 1);
    assert_eq!(bed.routes().protocols(), &[Protocol::Partition, Protocol::Partition]);

    // partitioned execution from here on
    w.run_on(&[0, 1], |txn| {
        txn.delta(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(-5))?;
        txn.delta(ACCOUNTS, &key(0), 1, BALANCE, Value::Int(5))
    })
    .unwrap();
    assert_eq!(bed.sum_int(ACCOUNTS, BALANCE).unwrap(), 60);
}

#[test]
fn contended_workload_moves_to_locking() {
    let bed = bank(Testbed::builder().partitions(2), 1, 0);
    let mut w0 = bed.worker(0).unwrap();
    let mut w1 = bed.worker(1).unwrap();
    for _ in 0..10 {
        let mut a = w0.begin().unwrap();
        let mut b = w1.begin().unwrap();
        for p in 0..2 {
            a.read(ACCOUNTS, &key(0), p, BALANCE).unwrap();
            b.read(ACCOUNTS, &key(0), p, BALANCE).unwrap();
            a.delta(ACCOUNTS, &key(0), p, BALANCE, Value::Int(1)).unwrap();
            b.delta(ACCOUNTS, &key(0), p, BALANCE, Value::Int(1)).unwrap();
        }
        a.commit().unwrap();
        assert!(b.commit().is_err());
    }

    let features = bed.features();
    assert_eq!(features.mean_partitions, 2.0);
    assert!(features.conflict_rate >= 0.5);
    bed.run_epoch(&ThresholdController::default(), &[0, 1]).unwrap();
    assert_eq!(bed.routes().protocols(), &[Protocol::Locking, Protocol::Locking]);

    // the switch opened a fresh epoch
    assert_eq!(bed.epoch_stats().txns, 0);
    assert_eq!(bed.stats().txns, 20);

    bed.run_epoch(&FixedController(Protocol::Occ), &[1]).unwrap();
    assert_eq!(bed.routes().protocols(), &[Protocol::Locking, Protocol::Occ]);
    assert_eq!(bed.routes().generation(), 2);
}

#[test]
fn switch_rejects_inadmissible_protocol() {
    let bed = bank(Testbed::builder().mode(SystemMode::Occ).partitions(1), 1, 0);
    assert!(bed.switch_protocols(vec![Protocol::Locking]).is_err());
    assert!(bed.switch_protocols(vec![Protocol::Occ, Protocol::Occ]).is_err());
    assert_eq!(bed.routes().generation(), 0);
}
