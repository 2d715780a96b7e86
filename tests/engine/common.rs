//! Shared fixtures: a bank of accounts spread over partitions.

#![allow(dead_code)]

pub use adaptcc::prelude::*;
pub use adaptcc::{AbortReason, MemStore, Store, Tuple, Worker};
pub use std::sync::Arc;

/// Table holding the accounts
pub const ACCOUNTS: usize = 0;

/// Balance column
pub const BALANCE: usize = 0;

/// Owner column
pub const OWNER: usize = 1;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .try_init();
}

pub fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![ColumnType::Int, ColumnType::String]))
}

pub fn account(balance: i64) -> Box<dyn Tuple> {
    Box::new(ColumnTuple::new(schema(), vec![Value::Int(balance), Value::from("owner")]).unwrap())
}

pub fn key(n: u64) -> Key {
    Key::from_u64(n)
}

/// Build `builder` and load `per_partition` accounts of `balance` into
/// every partition
pub fn bank(builder: TestbedBuilder, per_partition: u64, balance: i64) -> Testbed {
    init_tracing();
    let bed = builder.build().unwrap();
    for p in 0..bed.config().partitions {
        for n in 0..per_partition {
            bed.load(ACCOUNTS, key(n), p, account(balance)).unwrap();
        }
    }
    bed
}

pub fn balance(bed: &Testbed, n: u64, partition: usize) -> i64 {
    bed.value(ACCOUNTS, &key(n), partition, BALANCE).unwrap().as_int().unwrap()
}

/// Every committed row, by partition then key
pub fn dump(bed: &Testbed) -> Vec<(usize, Key, Vec<Value>)> {
    let store = bed.store();
    let mut rows = Vec::new();
    for p in 0..store.partitions() {
        let mut keys = store.keys(ACCOUNTS, p);
        keys.sort();
        for k in keys {
            let record = store.get_record(ACCOUNTS, &k, p).unwrap();
            rows.push((p, k, record.snapshot()));
        }
    }
    rows
}

/// Commit one write to every account, proving no lock was left behind
pub fn assert_all_writable(bed: &Testbed) {
    let mut w = bed.worker(200).unwrap();
    let parts: Vec<usize> = (0..bed.config().partitions).collect();
    let mut txn = w.begin_on(&parts).unwrap();
    for p in 0..bed.config().partitions {
        for k in bed.store().keys(ACCOUNTS, p) {
            txn.write(ACCOUNTS, &k, p, OWNER, Value::from("sweep")).unwrap();
        }
    }
    txn.commit().unwrap();
}
