//! Concurrent transfers conserve money under every protocol mix

use crate::common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ACCOUNTS_PER_PARTITION: u64 = 8;
const START: i64 = 1_000;

fn transfers(bed: &Testbed, workers: usize, per_worker: usize) -> Vec<u64> {
    let partitions = bed.config().partitions;
    bed.run_parallel(workers, |w| {
        let mut rng = StdRng::seed_from_u64(w.id() as u64);
        let mut committed = 0u64;
        for _ in 0..per_worker {
            let from = (rng.gen_range(0..ACCOUNTS_PER_PARTITION), rng.gen_range(0..partitions));
            let to = (rng.gen_range(0..ACCOUNTS_PER_PARTITION), rng.gen_range(0..partitions));
            let amount = rng.gen_range(1..20);
            w.run_on(&[from.1, to.1], |txn| {
                let have = txn.read(ACCOUNTS, &key(from.0), from.1, BALANCE)?;
                if have.as_int().unwrap_or_default() < amount {
                    return Ok(());
                }
                txn.delta(ACCOUNTS, &key(from.0), from.1, BALANCE, Value::Int(-amount))?;
                txn.delta(ACCOUNTS, &key(to.0), to.1, BALANCE, Value::Int(amount))
            })
            .unwrap();
            committed += 1;
        }
        committed
    })
    .unwrap()
}

fn check_conserved(builder: TestbedBuilder) {
    let bed = bank(builder.max_retries(1_000_000), ACCOUNTS_PER_PARTITION, START);
    let total = bed.sum_int(ACCOUNTS, BALANCE).unwrap();

    let committed: u64 = transfers(&bed, 4, 300).iter().sum();

    assert_eq!(committed, 1_200);
    assert_eq!(bed.sum_int(ACCOUNTS, BALANCE).unwrap(), total);
    for p in 0..bed.config().partitions {
        for k in 0..ACCOUNTS_PER_PARTITION {
            assert!(balance(&bed, k, p) >= 0, "account {k}@{p} overdrawn");
        }
    }
    let stats = bed.stats();
    assert_eq!(stats.commits, 1_200);
    assert_eq!(stats.txns, stats.commits + stats.total_aborts());
    assert_all_writable(&bed);
}

#[test]
fn occ_conserves_total() {
    check_conserved(Testbed::builder().mode(SystemMode::Occ).partitions(4));
}

#[test]
fn bounded_spin_locking_conserves_total() {
    check_conserved(Testbed::builder().protocol(Protocol::Locking).partitions(4));
}

#[test]
fn wait_die_locking_conserves_total() {
    check_conserved(
        Testbed::builder()
            .mode(SystemMode::Locking)
            .partitions(4)
            .two_pl_policy(TwoPlPolicy::WaitDie)
            .wait_die_timeout(std::time::Duration::from_millis(100)),
    );
}

#[test]
fn partitioned_conserves_total() {
    check_conserved(Testbed::builder().protocol(Protocol::Partition).partitions(4));
}

#[test]
fn mixed_protocols_conserve_total() {
    check_conserved(Testbed::builder().partition_protocols(vec![
        Protocol::Partition,
        Protocol::Locking,
        Protocol::Occ,
        Protocol::Occ,
    ]));
}

#[test]
fn no_wait_commit_locking_conserves_total() {
    check_conserved(
        Testbed::builder()
            .partition_protocols(vec![Protocol::Occ, Protocol::Locking, Protocol::Occ])
            .occ_lock_policy(OccLockPolicy::NoWait),
    );
}
