//! Commit TIDs grow per worker and dominate every version observed

use crate::common::*;
use proptest::prelude::*;
use std::collections::HashSet;

fn version(bed: &Testbed, k: u64) -> Tid {
    let record = bed.store().get_record(ACCOUNTS, &key(k), 0).unwrap();
    record.occ().unwrap().is_unlocked().1
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn commit_tids_increase_and_dominate_reads(
        locking in any::<bool>(),
        steps in prop::collection::vec((0usize..3, prop::collection::vec((0u64..6, any::<bool>()), 1..5)), 1..24),
    ) {
        let protocol = if locking { Protocol::Locking } else { Protocol::Occ };
        let bed = bank(Testbed::builder().protocol(protocol).partitions(1), 6, 0);
        let mut workers: Vec<Worker> = (0..3).map(|id| bed.worker(id).unwrap()).collect();
        let mut last = [Tid::ZERO; 3];
        let mut seen = HashSet::new();

        for (w, accesses) in steps {
            let observed = accesses.iter().map(|&(k, _)| version(&bed, k)).max().unwrap_or_default();
            let mut written = Vec::new();
            let mut txn = workers[w].begin().unwrap();
            for (k, write) in accesses {
                if write {
                    txn.delta(ACCOUNTS, &key(k), 0, BALANCE, Value::Int(1)).unwrap();
                    written.push(k);
                } else {
                    txn.read(ACCOUNTS, &key(k), 0, BALANCE).unwrap();
                }
            }
            let tid = txn.commit().unwrap();

            prop_assert!(tid > last[w]);
            prop_assert!(tid > observed);
            prop_assert_eq!(tid.worker(), w as u64);
            prop_assert!(seen.insert(tid));
            for k in written {
                prop_assert_eq!(version(&bed, k), tid);
            }
            last[w] = tid;
        }
    }
}

#[test]
fn fresh_worker_jumps_past_hot_versions() {
    let bed = bank(Testbed::builder().protocol(Protocol::Occ).partitions(1), 1, 0);
    let mut busy = bed.worker(0).unwrap();
    for _ in 0..300 {
        busy.run(|t| t.delta(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(1))).unwrap();
    }
    let hot = version(&bed, 0);
    assert!(hot.counter() >= 300);

    let mut idle = bed.worker(1).unwrap();
    let mut txn = idle.begin().unwrap();
    assert!(txn.start_tid() < hot);
    txn.read(ACCOUNTS, &key(0), 0, BALANCE).unwrap();
    let tid = txn.commit().unwrap();
    assert!(tid > hot);

    // the generator stays ahead afterwards
    let next = idle.begin().unwrap();
    assert!(next.start_tid() > tid);
}

#[test]
fn worker_ids_never_share_tids() {
    let bed = bank(Testbed::builder().protocol(Protocol::Occ).partitions(1), 1, 0);
    let mut first = bed.worker(0).unwrap();
    // 256 shares worker 0's low byte and would mint the same TIDs
    assert!(matches!(bed.worker(256), Err(Error::Config(_))));
    assert!(matches!(bed.worker(0), Err(Error::Config(_))));

    let mut seen = HashSet::new();
    for _ in 0..20 {
        let mut txn = first.begin().unwrap();
        txn.delta(ACCOUNTS, &key(0), 0, BALANCE, Value::Int(1)).unwrap();
        seen.insert(txn.commit().unwrap());
    }
    drop(first);

    let mut second = bed.worker(0).unwrap();
    for _ in 0..20 {
        let tid = second.begin().unwrap().commit().unwrap();
        assert!(seen.insert(tid), "reissued {tid}");
    }
}
