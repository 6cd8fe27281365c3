use crate::{
    error::{Error, ErrorKind},
    index::IndexMaintainer,
    key::{DocKey, KeyCodec, TupleKey},
    kvs::{KeyValueStore, ReadOptions, ScanOptions, WriteOptions},
    model::{CollectionModel, IndexModel},
    obs::{EventSink, StoreEvent},
    schema::{
        SCHEMA_VERSION, Statistics, StoreStatistics,
        record::{CollectionRecord, IndexRecord, SchemaRecord},
    },
};
use std::{collections::BTreeSet, time::Duration};
use tracing::{debug, info, warn};

/// Wait between attempts to take the persisted schema lock.
pub(crate) const LOCK_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Documents per scan batch while backfilling an index.
const REBUILD_BATCH: usize = 250;

///
/// SchemaEngine
///
/// Reconciles the declared schema with the persisted record. Runs against
/// the root (non-transactional) KVS handle; the only transactional pieces
/// are record creation and lock acquisition. Index backfills run outside
/// any transaction and rely on the persisted `is_creating`/`is_deleting`
/// flags to survive a crash: the next initialisation resumes them in
/// `verify` before diffing.
///

pub(crate) struct SchemaEngine<'a> {
    kvs: &'a dyn KeyValueStore,
    codec: &'a KeyCodec,
    collections: &'a [CollectionModel],
    events: &'a dyn EventSink,
    migrated: bool,
}

impl<'a> SchemaEngine<'a> {
    pub const fn new(
        kvs: &'a dyn KeyValueStore,
        codec: &'a KeyCodec,
        collections: &'a [CollectionModel],
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            kvs,
            codec,
            collections,
            events,
            migrated: false,
        }
    }

    /// Bring the persisted schema in line with the declared one.
    /// Idempotent: a second run against an up-to-date record only takes and
    /// releases the lock.
    pub async fn initialize(mut self) -> Result<(), Error> {
        if self.try_create().await? {
            self.events.emit(StoreEvent::DidCreate);
            return Ok(());
        }

        self.acquire_lock().await?;

        let outcome = self.run_locked().await;
        let released = self.release_lock().await;
        outcome.and(released)?;

        if self.migrated {
            self.events.emit(StoreEvent::DidMigrate);
        }
        Ok(())
    }

    /// Purge collections previously retired by a migration: delete their
    /// document ranges and drop them from the record.
    pub async fn remove_collections_marked_as_removed(&self) -> Result<(), Error> {
        let mut record = self.read_record().await?;

        let removed: Vec<String> = record
            .collections
            .iter()
            .filter(|c| c.has_been_removed)
            .map(|c| c.name.clone())
            .collect();

        for name in &removed {
            let purged = self
                .kvs
                .find_and_delete(ScanOptions::prefix(self.codec.document_prefix(name)))
                .await?;
            info!(store = self.codec.store_name(), collection = %name, purged, "purged removed collection");
        }

        if !removed.is_empty() {
            record.collections.retain(|c| !c.has_been_removed);
            self.save_record(&record).await?;
        }
        Ok(())
    }

    pub async fn statistics(&self) -> Result<Statistics, Error> {
        let record = self.read_record().await?;

        let removed = record
            .collections
            .iter()
            .filter(|c| c.has_been_removed)
            .count() as u64;
        let present = record.collections.len() as u64 - removed;
        let indexes = record
            .collections
            .iter()
            .map(|c| c.indexes.len() as u64)
            .sum();

        let pairs_count = self
            .kvs
            .count(ScanOptions::prefix(self.codec.store_prefix()))
            .await?;

        Ok(Statistics {
            collections_count: present,
            removed_collections_count: removed,
            indexes_count: indexes,
            store: StoreStatistics { pairs_count },
        })
    }

    // ------------------------------------------------------------------
    // Record creation and locking
    // ------------------------------------------------------------------

    async fn try_create(&self) -> Result<bool, Error> {
        let key = self.codec.schema_key();

        let tx = self.kvs.begin().await?;
        if tx.get(&key, ReadOptions::default()).await?.is_some() {
            tx.rollback().await?;
            return Ok(false);
        }

        let record = SchemaRecord::from_models(self.codec.store_name(), self.collections);
        tx.put(&key, record.encode()?, WriteOptions::create()).await?;
        tx.commit().await?;

        info!(store = self.codec.store_name(), "created schema record");
        Ok(true)
    }

    /// Take the lock persisted inside the record itself, so it holds across
    /// process boundaries. Contention backs off and retries forever; the
    /// holder is expected to finish.
    async fn acquire_lock(&self) -> Result<(), Error> {
        loop {
            let tx = self.kvs.begin().await?;
            let value = tx
                .get(&self.codec.schema_key(), ReadOptions { error_if_missing: true })
                .await?;
            let mut record = decode_record(value)?;

            if record.is_locked {
                tx.rollback().await?;
                warn!(
                    store = self.codec.store_name(),
                    "schema record is locked by another initializer; waiting"
                );
                tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                continue;
            }

            record.is_locked = true;
            tx.put(&self.codec.schema_key(), record.encode()?, WriteOptions::default())
                .await?;
            tx.commit().await?;
            return Ok(());
        }
    }

    async fn release_lock(&self) -> Result<(), Error> {
        let mut record = self.read_record().await?;
        record.is_locked = false;
        self.save_record(&record).await
    }

    async fn run_locked(&mut self) -> Result<(), Error> {
        let mut record = self.read_record().await?;
        self.upgrade(&record)?;
        self.verify(&mut record).await?;
        self.migrate(&mut record).await
    }

    // ------------------------------------------------------------------
    // Upgrade
    // ------------------------------------------------------------------

    fn upgrade(&self, record: &SchemaRecord) -> Result<(), Error> {
        if record.version > SCHEMA_VERSION {
            return Err(Error::new(
                ErrorKind::CannotDowngrade,
                format!(
                    "schema version {} is newer than supported version {SCHEMA_VERSION}",
                    record.version
                ),
            ));
        }
        if record.version < SCHEMA_VERSION {
            return Err(Error::config(format!(
                "schema version {} is a legacy layout; automatic upgrade is not supported",
                record.version
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Verify: sanity checks and crash recovery
    // ------------------------------------------------------------------

    async fn verify(&mut self, record: &mut SchemaRecord) -> Result<(), Error> {
        if record.name != self.codec.store_name() {
            return Err(Error::config(format!(
                "schema record belongs to store {}, not {}",
                record.name,
                self.codec.store_name()
            )));
        }

        let names: Vec<String> = record.collections.iter().map(|c| c.name.clone()).collect();
        for name in names {
            self.resume_deletions(record, &name).await?;
            self.resume_builds(record, &name).await?;
        }
        Ok(())
    }

    /// Finish index removals interrupted mid-flight: their ranges may be
    /// partially deleted, so delete again and drop the record entry.
    async fn resume_deletions(
        &mut self,
        record: &mut SchemaRecord,
        collection: &str,
    ) -> Result<(), Error> {
        loop {
            let Some(keys) = collection_record(record, collection)?
                .indexes
                .iter()
                .find(|i| i.is_deleting)
                .map(|i| i.keys.clone())
            else {
                return Ok(());
            };

            warn!(
                store = self.codec.store_name(),
                collection,
                index = %keys.join("+"),
                "resuming interrupted index removal"
            );
            self.will_migrate();
            self.drop_index_range(collection, &keys.join("+")).await?;
            collection_record_mut(record, collection)?
                .indexes
                .retain(|i| i.keys != keys);
            self.save_record(record).await?;
        }
    }

    /// Finish index builds interrupted mid-backfill. A build whose index is
    /// no longer declared is discarded instead; the entries are incomplete
    /// garbage either way.
    async fn resume_builds(
        &mut self,
        record: &mut SchemaRecord,
        collection: &str,
    ) -> Result<(), Error> {
        loop {
            let Some(keys) = collection_record(record, collection)?
                .indexes
                .iter()
                .find(|i| i.is_creating)
                .map(|i| i.keys.clone())
            else {
                return Ok(());
            };

            self.will_migrate();
            let name = keys.join("+");
            let declared = self
                .collections
                .iter()
                .find(|m| m.name() == collection)
                .and_then(|m| m.index_by_keys(&keys));

            match declared {
                Some(index) => {
                    warn!(
                        store = self.codec.store_name(),
                        collection,
                        index = %name,
                        "resuming interrupted index build"
                    );
                    self.drop_index_range(collection, &name).await?;
                    let model = self.collection_model(collection)?;
                    self.backfill_index(model, index).await?;
                    index_record_mut(record, collection, &keys)?.is_creating = false;
                }
                None => {
                    warn!(
                        store = self.codec.store_name(),
                        collection,
                        index = %name,
                        "discarding interrupted build of an undeclared index"
                    );
                    self.drop_index_range(collection, &name).await?;
                    collection_record_mut(record, collection)?
                        .indexes
                        .retain(|i| i.keys != keys);
                }
            }
            self.save_record(record).await?;
        }
    }

    // ------------------------------------------------------------------
    // Migrate: diff declared vs persisted
    // ------------------------------------------------------------------

    async fn migrate(&mut self, record: &mut SchemaRecord) -> Result<(), Error> {
        for model in self.collections {
            match record.collection(model.name()) {
                None => {
                    self.will_migrate();
                    info!(
                        store = self.codec.store_name(),
                        collection = model.name(),
                        "adding collection"
                    );
                    record
                        .collections
                        .push(CollectionRecord::new(model.name()));
                    self.save_record(record).await?;
                }
                Some(c) if c.has_been_removed => {
                    return Err(Error::new(
                        ErrorKind::ReAddNotSupported,
                        format!(
                            "collection {} was removed and cannot be re-added",
                            model.name()
                        ),
                    ));
                }
                Some(_) => {}
            }

            for index in model.indexes() {
                let existing = collection_record(record, model.name())?
                    .index(index.keys())
                    .cloned();
                match existing {
                    None => self.add_index(record, model, index).await?,
                    Some(r) if r.differs_from(index) => {
                        self.update_index(record, model, index).await?;
                    }
                    Some(_) => {}
                }
            }

            let retired: Vec<Vec<String>> = collection_record(record, model.name())?
                .indexes
                .iter()
                .filter(|r| model.index_by_keys(&r.keys).is_none())
                .map(|r| r.keys.clone())
                .collect();
            for keys in retired {
                self.remove_index(record, model.name(), &keys).await?;
            }
        }

        self.retire_collections(record).await
    }

    /// Mark persisted collections absent from the declaration as removed and
    /// delete their index ranges. Documents stay until
    /// `remove_collections_marked_as_removed` purges them.
    async fn retire_collections(&mut self, record: &mut SchemaRecord) -> Result<(), Error> {
        let declared: BTreeSet<&str> = self.collections.iter().map(CollectionModel::name).collect();

        let retired: Vec<String> = record
            .collections
            .iter()
            .filter(|c| !c.has_been_removed && !declared.contains(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();

        for name in retired {
            self.will_migrate();
            info!(
                store = self.codec.store_name(),
                collection = %name,
                "removing collection"
            );

            let indexes: Vec<Vec<String>> = collection_record(record, &name)?
                .indexes
                .iter()
                .map(|i| i.keys.clone())
                .collect();
            for keys in indexes {
                self.remove_index(record, &name, &keys).await?;
            }

            let col = collection_record_mut(record, &name)?;
            col.has_been_removed = true;
            self.save_record(record).await?;
        }
        Ok(())
    }

    async fn add_index(
        &mut self,
        record: &mut SchemaRecord,
        model: &CollectionModel,
        index: &IndexModel,
    ) -> Result<(), Error> {
        self.will_migrate();
        info!(
            store = self.codec.store_name(),
            collection = model.name(),
            index = index.name(),
            "adding index"
        );

        let mut entry = IndexRecord::from_model(index);
        entry.is_creating = true;
        collection_record_mut(record, model.name())?.indexes.push(entry);
        self.save_record(record).await?;

        self.backfill_index(model, index).await?;

        index_record_mut(record, model.name(), index.keys())?.is_creating = false;
        self.save_record(record).await
    }

    /// Projection or version changed: the stored entries are stale, so the
    /// whole range is dropped and rebuilt.
    async fn update_index(
        &mut self,
        record: &mut SchemaRecord,
        model: &CollectionModel,
        index: &IndexModel,
    ) -> Result<(), Error> {
        self.will_migrate();
        info!(
            store = self.codec.store_name(),
            collection = model.name(),
            index = index.name(),
            "rebuilding index"
        );

        index_record_mut(record, model.name(), index.keys())?.is_deleting = true;
        self.save_record(record).await?;

        self.drop_index_range(model.name(), index.name()).await?;

        let entry = index_record_mut(record, model.name(), index.keys())?;
        *entry = IndexRecord::from_model(index);
        entry.is_creating = true;
        self.save_record(record).await?;

        self.backfill_index(model, index).await?;

        index_record_mut(record, model.name(), index.keys())?.is_creating = false;
        self.save_record(record).await
    }

    async fn remove_index(
        &mut self,
        record: &mut SchemaRecord,
        collection: &str,
        keys: &[String],
    ) -> Result<(), Error> {
        self.will_migrate();
        let name = keys.join("+");
        info!(
            store = self.codec.store_name(),
            collection,
            index = %name,
            "removing index"
        );

        index_record_mut(record, collection, keys)?.is_deleting = true;
        self.save_record(record).await?;

        self.drop_index_range(collection, &name).await?;

        collection_record_mut(record, collection)?
            .indexes
            .retain(|i| i.keys != keys);
        self.save_record(record).await
    }

    /// Replay every document of the collection into one index.
    async fn backfill_index(
        &self,
        model: &CollectionModel,
        index: &IndexModel,
    ) -> Result<(), Error> {
        let maintainer = IndexMaintainer::new(self.kvs, self.codec);
        let prefix = self.codec.document_prefix(model.name());
        let mut cursor: Option<TupleKey> = None;
        let mut backfilled = 0u64;

        loop {
            let batch = self
                .kvs
                .find(ScanOptions {
                    prefix: Some(prefix.clone()),
                    start_after: cursor.take(),
                    limit: Some(REBUILD_BATCH),
                    ..ScanOptions::default()
                })
                .await?;

            let Some(last) = batch.last() else {
                debug!(
                    store = self.codec.store_name(),
                    collection = model.name(),
                    index = index.name(),
                    backfilled,
                    "index backfill finished"
                );
                return Ok(());
            };
            cursor = Some(TupleKey::from_elements(vec![
                last.key
                    .last()
                    .cloned()
                    .ok_or_else(|| malformed_key(&last.key))?,
            ]));

            for entry in &batch {
                let element = entry.key.last().ok_or_else(|| malformed_key(&entry.key))?;
                let key = DocKey::from_element(element)?;
                let doc = entry
                    .value
                    .as_ref()
                    .ok_or_else(|| malformed_key(&entry.key))?;

                maintainer
                    .apply_index(model.name(), index, &key, None, Some(doc))
                    .await?;
                backfilled += 1;
            }
            tokio::task::yield_now().await;
        }
    }

    async fn drop_index_range(&self, collection: &str, index_name: &str) -> Result<u64, Error> {
        let removed = self
            .kvs
            .find_and_delete(ScanOptions::prefix(
                self.codec.index_prefix(collection, index_name),
            ))
            .await?;
        debug!(
            store = self.codec.store_name(),
            collection,
            index = index_name,
            removed,
            "dropped index range"
        );
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn will_migrate(&mut self) {
        if !self.migrated {
            self.migrated = true;
            self.events.emit(StoreEvent::WillMigrate);
        }
    }

    fn collection_model(&self, name: &str) -> Result<&'a CollectionModel, Error> {
        self.collections
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Backend,
                    format!("declared collection vanished: {name}"),
                )
            })
    }

    async fn read_record(&self) -> Result<SchemaRecord, Error> {
        let value = self
            .kvs
            .get(
                &self.codec.schema_key(),
                ReadOptions {
                    error_if_missing: true,
                },
            )
            .await?;
        decode_record(value)
    }

    async fn save_record(&self, record: &SchemaRecord) -> Result<(), Error> {
        self.kvs
            .put(
                &self.codec.schema_key(),
                record.encode()?,
                WriteOptions::default(),
            )
            .await?;
        Ok(())
    }
}

fn decode_record(value: Option<serde_json::Value>) -> Result<SchemaRecord, Error> {
    let value = value.ok_or_else(|| {
        Error::new(ErrorKind::Backend, "schema record disappeared mid-flight")
    })?;
    Ok(SchemaRecord::decode(&value)?)
}

fn collection_record<'r>(
    record: &'r SchemaRecord,
    name: &str,
) -> Result<&'r CollectionRecord, Error> {
    record.collection(name).ok_or_else(|| missing_collection(name))
}

fn collection_record_mut<'r>(
    record: &'r mut SchemaRecord,
    name: &str,
) -> Result<&'r mut CollectionRecord, Error> {
    record
        .collection_mut(name)
        .ok_or_else(|| missing_collection(name))
}

fn index_record_mut<'r>(
    record: &'r mut SchemaRecord,
    collection: &str,
    keys: &[String],
) -> Result<&'r mut IndexRecord, Error> {
    collection_record_mut(record, collection)?
        .index_mut(keys)
        .ok_or_else(|| {
            Error::new(
                ErrorKind::Backend,
                format!("index record vanished: {}:{}", collection, keys.join("+")),
            )
        })
}

fn missing_collection(name: &str) -> Error {
    Error::new(
        ErrorKind::Backend,
        format!("collection record vanished: {name}"),
    )
}

fn malformed_key(key: &TupleKey) -> Error {
    Error::new(ErrorKind::Backend, format!("malformed stored key: {key}"))
}
