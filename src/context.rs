//! `DataContext`: the per-session orchestrator tying document sets, the
//! shared mutation builder and the transport together.
//!
//! One context per logical session, passed by reference (or `Arc`) to
//! everything that records changes against it. Commits on the same context
//! serialize behind an async mutex; recording intents never blocks on an
//! in-flight commit because builds snapshot batch contents.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    builder::MutationBuilder,
    document::{doc_key, Document, RawDocument},
    error::Error,
    logging::vellum_log,
    option::ClientOptions,
    set::DocumentSet,
    transport::{CommitOptions, MutationResponse, Transport},
};

type SetCache = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Source of commit correlation ids: ULIDs, monotonic within one context so
/// transport requests and log lines from successive commits sort in issue
/// order.
struct TxnIds(Mutex<ulid::Generator>);

impl TxnIds {
    fn new() -> Self {
        TxnIds(Mutex::new(ulid::Generator::new()))
    }

    fn next(&self) -> String {
        self.0
            .lock()
            .expect("txn id generator mutex should not be poisoned")
            .generate()
            .expect("txn id generator should advance without error")
            .to_string()
    }
}

/// Session-scoped orchestrator over a remote document store.
///
/// Owns the single [`MutationBuilder`] all document sets record into and a
/// lazily-populated cache of one [`DocumentSet`] per document type.
pub struct DataContext {
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    mutations: Arc<MutationBuilder>,
    sets: RwLock<SetCache>,
    commit_lock: async_lock::Mutex<()>,
    txn_ids: TxnIds,
}

impl DataContext {
    /// Create a context over `transport` using `options`.
    pub fn new(options: ClientOptions, transport: Arc<dyn Transport>) -> Self {
        DataContext {
            options,
            transport,
            mutations: Arc::new(MutationBuilder::new()),
            sets: RwLock::new(HashMap::new()),
            commit_lock: async_lock::Mutex::new(()),
            txn_ids: TxnIds::new(),
        }
    }

    /// The typed set for `T`, created on first access and cached for the
    /// context's lifetime.
    ///
    /// Lookup is lock-free for readers; a miss re-checks under the write
    /// lock so concurrent first accesses construct exactly one set.
    pub fn document_set<T: Document>(&self) -> Arc<DocumentSet<T>> {
        let key = doc_key::<T>();
        if let Some(entry) = self.read_sets().get(&key) {
            return Self::downcast::<T>(entry.clone());
        }

        let mut sets = self.write_sets();
        if let Some(entry) = sets.get(&key) {
            return Self::downcast::<T>(entry.clone());
        }
        let set = Arc::new(DocumentSet::<T>::new(
            self.mutations.for_type::<T>(),
            Arc::clone(&self.transport),
        ));
        sets.insert(key, set.clone());
        set
    }

    /// Catch-all set over [`RawDocument`] values, for payload shapes no
    /// Rust type models. Cached like any typed set.
    pub fn documents(&self) -> Arc<DocumentSet<RawDocument>> {
        self.document_set::<RawDocument>()
    }

    /// The shared mutation builder document sets record into.
    pub fn mutations(&self) -> &MutationBuilder {
        &self.mutations
    }

    /// Connection options this context was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Total pending mutations across every document type.
    pub fn pending_changes(&self) -> usize {
        self.mutations.pending()
    }

    /// Commit every pending mutation across all types as one ordered,
    /// atomic transaction.
    ///
    /// Batches are cleared only when the transport reports success; on
    /// failure (or cancellation) all pending state is left untouched so the
    /// caller can retry without re-recording. Mutations appended while the
    /// round-trip is in flight stay pending for the next commit.
    pub async fn commit(&self, options: CommitOptions) -> Result<MutationResponse, Error> {
        let _guard = self.commit_lock.lock().await;
        let payload = self.mutations.build();
        self.execute(payload, options).await
    }

    /// Commit only `T`'s pending mutations, leaving other types untouched.
    ///
    /// Fails with [`Error::NoPendingChanges`] when nothing is pending for
    /// `T`; the transport is not called in that case.
    pub async fn commit_for<T: Document>(
        &self,
        options: CommitOptions,
    ) -> Result<MutationResponse, Error> {
        let _guard = self.commit_lock.lock().await;
        let payload = self.mutations.build_for::<T>();
        if payload.is_empty() {
            return Err(Error::NoPendingChanges(T::TYPE));
        }
        self.execute(payload, options).await
    }

    /// Discard all pending mutations across all types. Local-only; the
    /// transport is never involved.
    pub fn clear_changes(&self) {
        let dropped = self.mutations.pending();
        self.mutations.clear();
        vellum_log!(
            log::Level::Debug,
            "clear_changes",
            "dataset={} dropped={}",
            self.options.dataset(),
            dropped,
        );
    }

    async fn execute(
        &self,
        payload: crate::builder::TransactionPayload,
        options: CommitOptions,
    ) -> Result<MutationResponse, Error> {
        let mut options = options;
        if options.transaction_id.is_none() {
            options.transaction_id = Some(self.txn_ids.next());
        }
        let txn_id = options.transaction_id.clone().unwrap_or_default();
        vellum_log!(
            log::Level::Debug,
            "commit",
            "dataset={} txn={} mutations={}",
            self.options.dataset(),
            txn_id,
            payload.len(),
        );

        match self
            .transport
            .execute_transaction(payload.mutations(), &options)
            .await
        {
            Ok(response) => {
                self.mutations.clear_built(&payload);
                vellum_log!(
                    log::Level::Debug,
                    "commit_ok",
                    "txn={} ids={}",
                    response.transaction_id,
                    response.ids.len(),
                );
                Ok(response)
            }
            Err(err) => {
                vellum_log!(log::Level::Warn, "commit_failed", "txn={} error={}", txn_id, err);
                Err(err.into())
            }
        }
    }

    fn downcast<T: Document>(entry: Arc<dyn Any + Send + Sync>) -> Arc<DocumentSet<T>> {
        entry
            .downcast::<DocumentSet<T>>()
            .ok()
            .expect("document set cache entry should match its type key")
    }

    fn read_sets(&self) -> RwLockReadGuard<'_, SetCache> {
        self.sets
            .read()
            .expect("document set cache lock should not be poisoned")
    }

    fn write_sets(&self) -> RwLockWriteGuard<'_, SetCache> {
        self.sets
            .write()
            .expect("document set cache lock should not be poisoned")
    }
}
