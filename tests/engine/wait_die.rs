//! Wait-die 2PL across threads

use crate::common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::time::{Duration, Instant};

fn wait_die_bed(timeout: Duration) -> Testbed {
    bank(
        Testbed::builder()
            .mode(SystemMode::Locking)
            .partitions(1)
            .two_pl_policy(TwoPlPolicy::WaitDie)
            .wait_die_timeout(timeout),
        2,
        10,
    )
}

#[test]
fn older_transaction_waits_for_younger_holder() {
    let bed = wait_die_bed(Duration::from_secs(10));
    let mut w0 = bed.worker(0).unwrap();
    let mut w1 = bed.worker(1).unwrap();

    // same counter, lower worker id: w0's transaction is older
    let mut old = w0.begin().unwrap();
    let mut young = w1.begin().unwrap();
    assert!(old.start_tid() < young.start_tid());

    young.write(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(1)).unwrap();

    let granted = AtomicBool::new(false);
    let ready = Barrier::new(2);
    std::thread::scope(|s| {
        let granted = &granted;
        let ready = &ready;
        s.spawn(move || {
            ready.wait();
            old.write(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(2)).unwrap();
            granted.store(true, Ordering::SeqCst);
            old.commit().unwrap();
        });

        ready.wait();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!granted.load(Ordering::SeqCst), "older request must queue behind the holder");
        young.commit().unwrap();
    });

    assert!(granted.load(Ordering::SeqCst));
    assert_eq!(balance(&bed, 0, 0), 2);
}

#[test]
fn younger_transaction_dies_on_older_holder() {
    let bed = wait_die_bed(Duration::from_secs(10));
    let mut w0 = bed.worker(0).unwrap();
    let mut w1 = bed.worker(1).unwrap();

    let mut old = w0.begin().unwrap();
    let mut young = w1.begin().unwrap();
    old.read(ACCOUNTS, &key(1), 0, BALANCE).unwrap();

    let started = Instant::now();
    let err = young.write(ACCOUNTS, &key(1), 0, BALANCE, Value::Int(0)).unwrap_err();
    assert_eq!(err.abort_reason(), Some(AbortReason::WriteLock));
    assert!(started.elapsed() < Duration::from_secs(5), "younger requests never wait");
    assert!(!young.is_active());
    drop(young);

    old.commit().unwrap();
    assert_all_writable(&bed);
}

#[test]
fn shared_holders_coexist() {
    let bed = wait_die_bed(Duration::from_secs(10));
    let mut w0 = bed.worker(0).unwrap();
    let mut w1 = bed.worker(1).unwrap();

    let mut a = w0.begin().unwrap();
    let mut b = w1.begin().unwrap();
    assert_eq!(a.read(ACCOUNTS, &key(0), 0, BALANCE).unwrap(), Value::Int(10));
    assert_eq!(b.read(ACCOUNTS, &key(0), 0, BALANCE).unwrap(), Value::Int(10));
    a.commit().unwrap();
    b.commit().unwrap();
}

#[test]
fn waiting_request_times_out() {
    let bed = wait_die_bed(Duration::from_millis(30));
    let mut w0 = bed.worker(0).unwrap();
    let mut w1 = bed.worker(1).unwrap();

    let mut old = w0.begin().unwrap();
    let mut young = w1.begin().unwrap();
    young.write(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(1)).unwrap();

    let started = Instant::now();
    let err = old.write(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(2)).unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert_eq!(err.abort_reason(), Some(AbortReason::WriteLock));
    drop(old);

    // the cancelled request left nothing queued behind the holder
    young.commit().unwrap();
    assert_eq!(balance(&bed, 0, 0), 1);
    assert_all_writable(&bed);
}
