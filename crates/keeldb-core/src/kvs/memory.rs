use crate::{
    key::TupleKey,
    kvs::{
        KeyValueStore, KvsError, KvsTransaction, ReadOptions, RemoveOptions, ScanEntry,
        ScanOptions, WriteOptions,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{
        Arc, Mutex as SyncMutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Pairs = BTreeMap<TupleKey, Value>;

///
/// MemoryKvs
///
/// In-process ordered store used for the `memory:` URL scheme and in tests.
/// Transactions take a process-wide writer lock and stage against a snapshot
/// of the committed state, which is swapped in atomically on commit, so a
/// transaction observes its own writes and nothing of concurrent ones.
///

pub struct MemoryKvs {
    state: Arc<MemoryState>,
}

struct MemoryState {
    committed: Mutex<Pairs>,
    writer: Arc<Mutex<()>>,
}

impl MemoryKvs {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(MemoryState {
                committed: Mutex::new(BTreeMap::new()),
                writer: Arc::new(Mutex::new(())),
            }),
        }
    }
}

impl Default for MemoryKvs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvs {
    async fn get(&self, key: &TupleKey, opts: ReadOptions) -> Result<Option<Value>, KvsError> {
        let map = self.state.committed.lock().await;
        read_one(&map, key, opts)
    }

    async fn put(&self, key: &TupleKey, value: Value, opts: WriteOptions) -> Result<(), KvsError> {
        let _writer = self.state.writer.lock().await;
        let mut map = self.state.committed.lock().await;
        write_one(&mut map, key, value, opts)
    }

    async fn delete(&self, key: &TupleKey, opts: RemoveOptions) -> Result<bool, KvsError> {
        let _writer = self.state.writer.lock().await;
        let mut map = self.state.committed.lock().await;
        remove_one(&mut map, key, opts)
    }

    async fn get_many(
        &self,
        keys: &[TupleKey],
        opts: ReadOptions,
    ) -> Result<Vec<Option<Value>>, KvsError> {
        let map = self.state.committed.lock().await;
        keys.iter().map(|key| read_one(&map, key, opts)).collect()
    }

    async fn find(&self, opts: ScanOptions) -> Result<Vec<ScanEntry>, KvsError> {
        let map = self.state.committed.lock().await;
        Ok(scan(&map, &opts))
    }

    async fn count(&self, opts: ScanOptions) -> Result<u64, KvsError> {
        let map = self.state.committed.lock().await;
        let counted = scan(
            &map,
            &ScanOptions {
                return_values: false,
                ..opts
            },
        );
        Ok(counted.len() as u64)
    }

    async fn find_and_delete(&self, opts: ScanOptions) -> Result<u64, KvsError> {
        let _writer = self.state.writer.lock().await;
        let mut map = self.state.committed.lock().await;
        Ok(drain(&mut map, &opts))
    }

    async fn begin(&self) -> Result<Arc<dyn KvsTransaction>, KvsError> {
        let writer = Arc::clone(&self.state.writer).lock_owned().await;
        let snapshot = self.state.committed.lock().await.clone();

        Ok(Arc::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            working: Mutex::new(snapshot),
            writer: SyncMutex::new(Some(writer)),
            completed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), KvsError> {
        Ok(())
    }
}

///
/// MemoryTransaction
///

struct MemoryTransaction {
    state: Arc<MemoryState>,
    working: Mutex<Pairs>,
    writer: SyncMutex<Option<OwnedMutexGuard<()>>>,
    completed: AtomicBool,
}

impl MemoryTransaction {
    fn check_open(&self) -> Result<(), KvsError> {
        if self.completed.load(Ordering::Acquire) {
            return Err(KvsError::TransactionCompleted);
        }
        Ok(())
    }

    fn release_writer(&self) {
        self.writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }
}

#[async_trait]
impl KeyValueStore for MemoryTransaction {
    async fn get(&self, key: &TupleKey, opts: ReadOptions) -> Result<Option<Value>, KvsError> {
        self.check_open()?;
        let map = self.working.lock().await;
        read_one(&map, key, opts)
    }

    async fn put(&self, key: &TupleKey, value: Value, opts: WriteOptions) -> Result<(), KvsError> {
        self.check_open()?;
        let mut map = self.working.lock().await;
        write_one(&mut map, key, value, opts)
    }

    async fn delete(&self, key: &TupleKey, opts: RemoveOptions) -> Result<bool, KvsError> {
        self.check_open()?;
        let mut map = self.working.lock().await;
        remove_one(&mut map, key, opts)
    }

    async fn get_many(
        &self,
        keys: &[TupleKey],
        opts: ReadOptions,
    ) -> Result<Vec<Option<Value>>, KvsError> {
        self.check_open()?;
        let map = self.working.lock().await;
        keys.iter().map(|key| read_one(&map, key, opts)).collect()
    }

    async fn find(&self, opts: ScanOptions) -> Result<Vec<ScanEntry>, KvsError> {
        self.check_open()?;
        let map = self.working.lock().await;
        Ok(scan(&map, &opts))
    }

    async fn count(&self, opts: ScanOptions) -> Result<u64, KvsError> {
        self.check_open()?;
        let map = self.working.lock().await;
        let counted = scan(
            &map,
            &ScanOptions {
                return_values: false,
                ..opts
            },
        );
        Ok(counted.len() as u64)
    }

    async fn find_and_delete(&self, opts: ScanOptions) -> Result<u64, KvsError> {
        self.check_open()?;
        let mut map = self.working.lock().await;
        Ok(drain(&mut map, &opts))
    }

    async fn begin(&self) -> Result<Arc<dyn KvsTransaction>, KvsError> {
        Err(KvsError::NestedTransaction)
    }

    async fn close(&self) -> Result<(), KvsError> {
        Ok(())
    }
}

#[async_trait]
impl KvsTransaction for MemoryTransaction {
    async fn commit(&self) -> Result<(), KvsError> {
        if self.completed.swap(true, Ordering::AcqRel) {
            return Err(KvsError::TransactionCompleted);
        }

        let staged = std::mem::take(&mut *self.working.lock().await);
        *self.state.committed.lock().await = staged;
        self.release_writer();
        Ok(())
    }

    async fn rollback(&self) -> Result<(), KvsError> {
        if self.completed.swap(true, Ordering::AcqRel) {
            return Err(KvsError::TransactionCompleted);
        }

        self.working.lock().await.clear();
        self.release_writer();
        Ok(())
    }

    fn as_kvs(&self) -> &dyn KeyValueStore {
        self
    }
}

///
/// Shared point/range logic
///

fn read_one(map: &Pairs, key: &TupleKey, opts: ReadOptions) -> Result<Option<Value>, KvsError> {
    match map.get(key) {
        Some(value) => Ok(Some(value.clone())),
        None if opts.error_if_missing => Err(KvsError::KeyNotFound {
            key: key.to_string(),
        }),
        None => Ok(None),
    }
}

fn write_one(
    map: &mut Pairs,
    key: &TupleKey,
    value: Value,
    opts: WriteOptions,
) -> Result<(), KvsError> {
    let exists = map.contains_key(key);

    if exists && opts.error_if_exists {
        return Err(KvsError::KeyExists {
            key: key.to_string(),
        });
    }
    if !exists && !opts.create_if_missing {
        return Err(KvsError::KeyNotFound {
            key: key.to_string(),
        });
    }

    map.insert(key.clone(), value);
    Ok(())
}

fn remove_one(map: &mut Pairs, key: &TupleKey, opts: RemoveOptions) -> Result<bool, KvsError> {
    let removed = map.remove(key).is_some();
    if !removed && opts.error_if_missing {
        return Err(KvsError::KeyNotFound {
            key: key.to_string(),
        });
    }
    Ok(removed)
}

/// Walk the range described by `opts` in tuple order.
///
/// A cursor tuple that is a strict prefix of stored keys covers its whole
/// extension run: extensions sort contiguously right after the prefix
/// itself, so runs are skipped (`start_after`) or retained (`end`) whole.
fn scan(map: &Pairs, opts: &ScanOptions) -> Vec<ScanEntry> {
    let prefix = opts.prefix.clone().unwrap_or_default();

    let start = opts.start.as_ref().map(|s| prefix.join(s));
    let start_after = opts.start_after.as_ref().map(|s| prefix.join(s));
    let end = opts.end.as_ref().map(|e| prefix.join(e));
    let end_before = opts.end_before.as_ref().map(|e| prefix.join(e));

    let lower = start
        .clone()
        .or_else(|| start_after.clone())
        .unwrap_or_else(|| prefix.clone());

    let mut out = Vec::new();
    for (key, value) in map.range((Bound::Included(lower), Bound::Unbounded)) {
        if !key.starts_with(&prefix) {
            break;
        }
        if let Some(sa) = &start_after
            && (key == sa || key.starts_with(sa))
        {
            continue;
        }
        if let Some(eb) = &end_before
            && key >= eb
        {
            break;
        }
        if let Some(e) = &end
            && key > e
            && !key.starts_with(e)
        {
            break;
        }

        out.push(ScanEntry {
            key: key.clone(),
            value: opts.return_values.then(|| value.clone()),
        });
    }

    if opts.reverse {
        out.reverse();
    }
    if let Some(limit) = opts.limit {
        out.truncate(limit);
    }
    out
}

fn drain(map: &mut Pairs, opts: &ScanOptions) -> u64 {
    let doomed = scan(
        map,
        &ScanOptions {
            return_values: false,
            ..opts.clone()
        },
    );
    for entry in &doomed {
        map.remove(&entry.key);
    }
    doomed.len() as u64
}

///
/// TESTS
///
