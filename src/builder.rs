//! Per-type batch registry and whole-transaction assembly.
//!
//! One [`MutationBuilder`] lives for the lifetime of its
//! [`crate::DataContext`]. Document sets append through shared
//! [`BatchHandle`]s; a commit snapshots batch contents into a
//! [`TransactionPayload`] and, on success, drains exactly the snapshotted
//! prefix so appends that raced the round-trip stay pending.

use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    document::{doc_key, Document},
    mutation::{Mutation, MutationBatch},
};

/// Shared handle to one document type's [`MutationBatch`].
///
/// All clones refer to the same underlying batch; the builder hands out one
/// handle per type for its lifetime.
#[derive(Debug, Clone, Default)]
pub struct BatchHandle {
    inner: Arc<Mutex<MutationBatch>>,
}

impl BatchHandle {
    /// Append a mutation to the batch.
    pub fn add(&self, mutation: Mutation) {
        self.lock().add(mutation);
    }

    /// Number of pending mutations.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discard the batch's pending mutations. The handle stays valid.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// True when both handles refer to the same batch.
    pub fn same_batch(&self, other: &BatchHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn snapshot(&self) -> Vec<Mutation> {
        self.lock().snapshot()
    }

    pub(crate) fn drain_prefix(&self, count: usize) {
        self.lock().drain_prefix(count);
    }

    fn lock(&self) -> MutexGuard<'_, MutationBatch> {
        self.inner
            .lock()
            .expect("mutation batch mutex should not be poisoned")
    }
}

/// Ordered transaction assembled from one or more batches.
///
/// Carries the per-type snapshot lengths so a successful commit can clear
/// exactly what was sent and nothing recorded afterwards.
#[derive(Debug)]
pub struct TransactionPayload {
    mutations: Vec<Mutation>,
    drains: Vec<(TypeId, usize)>,
}

impl TransactionPayload {
    /// Mutations in transaction order.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Total mutation count.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// True when the transaction carries no mutation.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

struct Registry {
    /// Type keys in first-touched order; fixes cross-type transaction order.
    order: Vec<TypeId>,
    batches: HashMap<TypeId, BatchHandle>,
}

/// Registry of per-document-type batches with whole-transaction assembly.
pub struct MutationBuilder {
    registry: Mutex<Registry>,
}

impl MutationBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        MutationBuilder {
            registry: Mutex::new(Registry {
                order: Vec::new(),
                batches: HashMap::new(),
            }),
        }
    }

    /// Handle to the batch for `T`, creating it on first touch.
    ///
    /// Exactly one batch exists per type for the builder's lifetime;
    /// concurrent first touches race on the registry lock, never on the
    /// created batch.
    pub fn for_type<T: Document>(&self) -> BatchHandle {
        let key = doc_key::<T>();
        let mut registry = self.lock();
        if let Some(handle) = registry.batches.get(&key) {
            return handle.clone();
        }
        let handle = BatchHandle::default();
        registry.order.push(key);
        registry.batches.insert(key, handle.clone());
        handle
    }

    /// Assemble every batch into one ordered transaction.
    ///
    /// Batches are concatenated in the order their types were first touched,
    /// so repeated builds over unchanged state produce the same payload.
    /// Empty batches contribute nothing. Batch contents are copied: appends
    /// landing after this call belong to the next transaction.
    pub fn build(&self) -> TransactionPayload {
        let registry = self.lock();
        let mut mutations = Vec::new();
        let mut drains = Vec::new();
        for key in &registry.order {
            let Some(handle) = registry.batches.get(key) else {
                continue;
            };
            let snapshot = handle.snapshot();
            if snapshot.is_empty() {
                continue;
            }
            drains.push((*key, snapshot.len()));
            mutations.extend(snapshot);
        }
        TransactionPayload { mutations, drains }
    }

    /// Assemble only `T`'s batch, independent of other types.
    pub fn build_for<T: Document>(&self) -> TransactionPayload {
        let snapshot = self.for_type::<T>().snapshot();
        let drains = if snapshot.is_empty() {
            Vec::new()
        } else {
            vec![(doc_key::<T>(), snapshot.len())]
        };
        TransactionPayload {
            mutations: snapshot,
            drains,
        }
    }

    /// Drop the snapshotted prefix of every batch `payload` was built from.
    ///
    /// Called after the remote service confirmed the transaction; mutations
    /// appended while the commit was in flight survive for the next one.
    pub fn clear_built(&self, payload: &TransactionPayload) {
        let registry = self.lock();
        for (key, count) in &payload.drains {
            if let Some(handle) = registry.batches.get(key) {
                handle.drain_prefix(*count);
            }
        }
    }

    /// Discard all pending mutations across every type.
    pub fn clear(&self) {
        let registry = self.lock();
        for handle in registry.batches.values() {
            handle.clear();
        }
    }

    /// Discard pending mutations for `T` only.
    pub fn clear_for<T: Document>(&self) {
        self.for_type::<T>().clear();
    }

    /// Total pending mutations across every type.
    pub fn pending(&self) -> usize {
        let registry = self.lock();
        registry.batches.values().map(BatchHandle::len).sum()
    }

    /// Pending mutations for `T`.
    pub fn pending_for<T: Document>(&self) -> usize {
        self.for_type::<T>().len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .expect("mutation registry mutex should not be poisoned")
    }
}

impl Default for MutationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::MutationBuilder;
    use crate::{
        mutation::{DeleteTarget, Mutation},
        test_util::{Author, Post},
    };

    fn delete(id: &str) -> Mutation {
        Mutation::Delete(DeleteTarget { id: id.into() })
    }

    #[test]
    fn one_batch_per_type() {
        let builder = MutationBuilder::new();
        let first = builder.for_type::<Post>();
        let second = builder.for_type::<Post>();
        assert!(first.same_batch(&second));
        assert!(!first.same_batch(&builder.for_type::<Author>()));

        first.add(delete("p1"));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn build_concatenates_in_first_touch_order() {
        let builder = MutationBuilder::new();
        builder.for_type::<Author>().add(delete("a1"));
        builder.for_type::<Post>().add(delete("p1"));
        builder.for_type::<Author>().add(delete("a2"));

        let ids = |payload: &super::TransactionPayload| {
            payload
                .mutations()
                .iter()
                .map(|m| m.target_id().unwrap().to_owned())
                .collect::<Vec<_>>()
        };

        let payload = builder.build();
        assert_eq!(ids(&payload), ["a1", "a2", "p1"]);
        // Stable across repeated builds with no intervening mutation.
        assert_eq!(ids(&builder.build()), ["a1", "a2", "p1"]);
    }

    #[test]
    fn build_for_is_scoped() {
        let builder = MutationBuilder::new();
        builder.for_type::<Author>().add(delete("a1"));
        builder.for_type::<Post>().add(delete("p1"));
        builder.for_type::<Post>().add(delete("p2"));

        let payload = builder.build_for::<Post>();
        assert_eq!(payload.len(), 2);

        builder.clear_built(&payload);
        assert_eq!(builder.pending_for::<Post>(), 0);
        assert_eq!(builder.pending_for::<Author>(), 1);
    }

    #[test]
    fn clear_built_keeps_racing_appends() {
        let builder = MutationBuilder::new();
        let posts = builder.for_type::<Post>();
        posts.add(delete("p1"));
        posts.add(delete("p2"));

        let payload = builder.build();
        // Lands while the commit is in flight.
        posts.add(delete("p3"));

        builder.clear_built(&payload);
        assert_eq!(posts.len(), 1);
        assert_eq!(builder.build().mutations()[0].target_id(), Some("p3"));
    }

    #[test]
    fn clear_drops_everything() {
        let builder = MutationBuilder::new();
        builder.for_type::<Author>().add(delete("a1"));
        builder.for_type::<Post>().add(delete("p1"));
        assert_eq!(builder.pending(), 2);

        builder.clear();
        assert_eq!(builder.pending(), 0);
        assert!(builder.build().is_empty());
    }

    #[test]
    fn clear_for_is_scoped() {
        let builder = MutationBuilder::new();
        builder.for_type::<Author>().add(delete("a1"));
        builder.for_type::<Post>().add(delete("p1"));

        builder.clear_for::<Post>();
        assert_eq!(builder.pending_for::<Post>(), 0);
        assert_eq!(builder.pending_for::<Author>(), 1);
    }
}
