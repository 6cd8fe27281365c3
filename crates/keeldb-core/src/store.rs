use crate::{
    error::Error,
    executor::{ExecutorCtx, delete as delete_exec, iterate, load, save},
    key::{DocKey, KeyCodec},
    kvs::{self, KeyValueStore, KvsTransaction, ScanOptions},
    model::{CollectionDef, CollectionModel, ModelError},
    obs::{EventSink, LogSink},
    options::{
        CountOptions, DeleteOptions, Entry, FindOptions, ForEachOptions, GetOptions, PutOptions,
    },
    schema::{SchemaEngine, Statistics},
};
use serde_json::Value;
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Rows per batch during `for_each`-style iteration.
pub const DEFAULT_BATCH_SIZE: usize = 250;

/// Rows between cooperative yields while materialising results.
pub const DEFAULT_RESPIRATION: usize = 250;

///
/// StoreOptions
///

pub struct StoreOptions {
    name: String,
    url: String,
    collections: Vec<CollectionDef>,
    batch_size: usize,
    respiration: usize,
    events: Option<Arc<dyn EventSink>>,
}

impl StoreOptions {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            collections: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            respiration: DEFAULT_RESPIRATION,
            events: None,
        }
    }

    #[must_use]
    pub fn collection(mut self, collection: impl Into<CollectionDef>) -> Self {
        self.collections.push(collection.into());
        self
    }

    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn respiration(mut self, respiration: usize) -> Self {
        self.respiration = respiration;
        self
    }

    #[must_use]
    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }
}

///
/// DocumentStore
///
/// The public facade. Cheap to clone; a clone carrying a transaction handle
/// is how a transaction scope is represented, so `inside_transaction`
/// distinguishes the root instance from a scoped one.
///

#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
    tx: Option<Arc<dyn KvsTransaction>>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("inside_transaction", &self.tx.is_some())
            .finish()
    }
}

struct StoreInner {
    codec: KeyCodec,
    collections: Vec<CollectionModel>,
    kvs: Arc<dyn KeyValueStore>,
    events: Arc<dyn EventSink>,
    batch_size: usize,
    respiration: usize,
    initialized: AtomicBool,
    init_guard: Mutex<()>,
}

impl DocumentStore {
    /// Open a store over the backend its URL names.
    pub async fn open(options: StoreOptions) -> Result<Self, Error> {
        if options.url.is_empty() {
            return Err(Error::config("key-value store url is required"));
        }
        let kvs = kvs::connect(&options.url).await?;
        Self::with_backend(options, kvs)
    }

    /// Open a store over an already-constructed backend. The `url` option
    /// is ignored on this path.
    pub fn with_backend(
        options: StoreOptions,
        kvs: Arc<dyn KeyValueStore>,
    ) -> Result<Self, Error> {
        if options.name.is_empty() {
            return Err(Error::config("store name is required"));
        }

        let collections = options
            .collections
            .into_iter()
            .map(CollectionDef::build)
            .collect::<Result<Vec<_>, _>>()?;

        for (i, collection) in collections.iter().enumerate() {
            if collections[..i].iter().any(|c| c.name() == collection.name()) {
                return Err(ModelError::DuplicateCollection {
                    collection: collection.name().to_owned(),
                }
                .into());
            }
        }

        let events = options
            .events
            .unwrap_or_else(|| Arc::new(LogSink {
                store: options.name.clone(),
            }));

        Ok(Self {
            inner: Arc::new(StoreInner {
                codec: KeyCodec::new(options.name),
                collections,
                kvs,
                events,
                batch_size: options.batch_size,
                respiration: options.respiration,
                initialized: AtomicBool::new(false),
                init_guard: Mutex::new(()),
            }),
            tx: None,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.codec.store_name()
    }

    /// True on the scoped instance a `transaction` closure receives.
    #[must_use]
    pub const fn inside_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Reconcile the persisted schema with the declared one. Idempotent;
    /// runs at most once per instance, and every operation calls it before
    /// touching the backend.
    pub async fn initialize_document_store(&self) -> Result<(), Error> {
        if self.inside_transaction() {
            return Err(Error::transaction_misuse("initialize_document_store"));
        }
        if self.inner.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        // Queued callers park here and observe the finished run.
        let _guard = self.inner.init_guard.lock().await;
        if self.inner.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        SchemaEngine::new(
            self.inner.kvs.as_ref(),
            &self.inner.codec,
            &self.inner.collections,
            self.inner.events.as_ref(),
        )
        .initialize()
        .await?;

        self.inner.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Run `f` against a transaction-scoped store. Commits on `Ok`, rolls
    /// back on `Err`. A nested call reuses the active context; the commit
    /// belongs to the outermost scope.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        if self.inside_transaction() {
            return f(self.clone()).await;
        }

        self.initialize_document_store().await?;

        let tx = self.inner.kvs.begin().await?;
        let scoped = Self {
            inner: Arc::clone(&self.inner),
            tx: Some(Arc::clone(&tx)),
        };

        match f(scoped).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(store = self.name(), %rollback_err, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Point lookup. `Ok(None)` is only reachable with
    /// [`GetOptions::optional`].
    pub async fn get(
        &self,
        collection: &str,
        key: impl Into<DocKey>,
        opts: GetOptions,
    ) -> Result<Option<Value>, Error> {
        self.ensure_initialized().await?;
        let collection = self.collection(collection)?;
        load::get(&self.ctx(collection), &key.into(), opts).await
    }

    /// Vector point lookup preserving input order.
    pub async fn get_many<I, K>(
        &self,
        collection: &str,
        keys: I,
        opts: GetOptions,
    ) -> Result<Vec<Entry>, Error>
    where
        I: IntoIterator<Item = K>,
        K: Into<DocKey>,
    {
        self.ensure_initialized().await?;
        let collection = self.collection(collection)?;
        let keys: Vec<DocKey> = keys.into_iter().map(Into::into).collect();
        load::get_many(&self.ctx(collection), &keys, opts).await
    }

    /// Write one document inside its own transaction (or the active one),
    /// keeping every index in step.
    pub async fn put(
        &self,
        collection: &str,
        key: impl Into<DocKey>,
        doc: Value,
        opts: PutOptions,
    ) -> Result<(), Error> {
        let key = key.into();
        self.transaction(|tx| async move {
            let collection = tx.collection(collection)?;
            save::put(&tx.ctx(collection), &key, &doc, opts).await
        })
        .await
    }

    /// Delete one document; returns whether it existed.
    pub async fn delete(
        &self,
        collection: &str,
        key: impl Into<DocKey>,
        opts: DeleteOptions,
    ) -> Result<bool, Error> {
        let key = key.into();
        self.transaction(|tx| async move {
            let collection = tx.collection(collection)?;
            delete_exec::delete(&tx.ctx(collection), &key, opts).await
        })
        .await
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Ordered query returning `{ key, value? }` entries.
    pub async fn find(&self, collection: &str, opts: FindOptions) -> Result<Vec<Entry>, Error> {
        self.ensure_initialized().await?;
        let collection = self.collection(collection)?;
        load::find(&self.ctx(collection), &opts).await
    }

    /// Count the documents a query matches without materialising them.
    pub async fn count(&self, collection: &str, opts: CountOptions) -> Result<u64, Error> {
        self.ensure_initialized().await?;
        let collection = self.collection(collection)?;
        load::count(&self.ctx(collection), &opts).await
    }

    /// Visit every matching document in order, in batches. Returns the
    /// number of visited documents.
    pub async fn for_each<F, Fut>(
        &self,
        collection: &str,
        opts: ForEachOptions,
        mut f: F,
    ) -> Result<u64, Error>
    where
        F: FnMut(Entry) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        self.ensure_initialized().await?;
        let collection = self.collection(collection)?;
        let batch_size = opts.batch_size.unwrap_or(self.inner.batch_size);
        let ctx = self.ctx(collection);

        iterate::for_each(&ctx, &opts, batch_size, |entry| {
            let fut = f(entry);
            async move { fut.await.map(|()| true) }
        })
        .await
    }

    /// Delete every matching document, one transaction each; already
    /// deleted batches stay deleted if a later one fails. Returns how many
    /// documents were actually deleted.
    pub async fn find_and_delete(
        &self,
        collection: &str,
        opts: ForEachOptions,
    ) -> Result<u64, Error> {
        self.ensure_initialized().await?;
        let model = self.collection(collection)?;
        let batch_size = opts.batch_size.unwrap_or(self.inner.batch_size);
        let ctx = self.ctx(model);

        iterate::for_each(&ctx, &opts, batch_size, |entry| {
            let store = self.clone();
            async move {
                store
                    .delete(collection, entry.key, DeleteOptions::optional())
                    .await
            }
        })
        .await
    }

    // ------------------------------------------------------------------
    // Schema lifecycle
    // ------------------------------------------------------------------

    pub async fn get_statistics(&self) -> Result<Statistics, Error> {
        self.ensure_initialized().await?;
        self.engine().statistics().await
    }

    /// Purge collections a migration marked as removed: their document
    /// ranges are deleted and the entries leave the record.
    pub async fn remove_collections_marked_as_removed(&self) -> Result<(), Error> {
        self.ensure_initialized().await?;
        self.engine().remove_collections_marked_as_removed().await
    }

    /// Delete every pair under the store prefix and forget the
    /// initialisation state.
    pub async fn destroy_all(&self) -> Result<(), Error> {
        if self.inside_transaction() {
            return Err(Error::transaction_misuse("destroy_all"));
        }

        let removed = self
            .inner
            .kvs
            .find_and_delete(ScanOptions::prefix(self.inner.codec.store_prefix()))
            .await?;
        self.inner.initialized.store(false, Ordering::Release);

        info!(store = self.name(), removed, "destroyed store");
        Ok(())
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.inner.kvs.close().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn kvs(&self) -> &dyn KeyValueStore {
        match &self.tx {
            Some(tx) => tx.as_kvs(),
            None => self.inner.kvs.as_ref(),
        }
    }

    fn engine(&self) -> SchemaEngine<'_> {
        SchemaEngine::new(
            self.kvs(),
            &self.inner.codec,
            &self.inner.collections,
            self.inner.events.as_ref(),
        )
    }

    fn collection(&self, name: &str) -> Result<&CollectionModel, Error> {
        self.inner
            .collections
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| Error::config(format!("unknown collection: {name}")))
    }

    fn ctx<'a>(&'a self, collection: &'a CollectionModel) -> ExecutorCtx<'a> {
        ExecutorCtx {
            kvs: self.kvs(),
            codec: &self.inner.codec,
            collection,
            respiration: self.inner.respiration,
        }
    }

    /// Reads initialise lazily too; inside a transaction the store is
    /// already initialised, since `transaction` refuses to open otherwise.
    async fn ensure_initialized(&self) -> Result<(), Error> {
        if self.inside_transaction() {
            return Ok(());
        }
        self.initialize_document_store().await
    }
}

///
/// TESTS
///
