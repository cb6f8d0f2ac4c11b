//! Pending mutation variants and the per-type ordered batch.
//!
//! `Mutation` serializes to the externally-tagged wire shape the remote
//! service expects (`{"createOrReplace": {...}}`, `{"delete": {"id": ...}}`).
//! `MutationBatch` is deliberately dumb: ordered, append-only, no dedup and
//! no payload validation. Structural checks (identifier present, payload is
//! an object) happen in [`crate::DocumentSet`] before anything reaches a
//! batch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One atomic document-level change destined for the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutation {
    /// Create a new document; fails remotely if the id already exists.
    /// The payload may omit `_id`, in which case the service assigns one.
    Create(Value),
    /// Create the document, overwriting any existing document with its id.
    CreateOrReplace(Value),
    /// Create the document only when its id is not already taken; an
    /// existing document is left untouched and the mutation is a remote
    /// no-op.
    CreateIfNotExists(Value),
    /// Partial update of an existing document.
    Patch(PatchSet),
    /// Remove the document with the given id.
    Delete(DeleteTarget),
}

impl Mutation {
    /// Identifier the mutation targets, when the payload carries one.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Mutation::Create(value)
            | Mutation::CreateOrReplace(value)
            | Mutation::CreateIfNotExists(value) => {
                value.as_object().and_then(|map| map.get("_id")).and_then(Value::as_str)
            }
            Mutation::Patch(patch) => Some(patch.id()),
            Mutation::Delete(target) => Some(target.id.as_str()),
        }
    }
}

/// Target of a [`Mutation::Delete`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTarget {
    /// Identifier of the document to remove.
    pub id: String,
}

/// Ordered set of partial-update operations against one document.
///
/// Built with consuming setters and committed through
/// [`crate::DocumentSet::patch`]. Empty op maps are skipped on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSet {
    id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    set: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    set_if_missing: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    unset: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    inc: Map<String, Value>,
}

impl PatchSet {
    /// Start a patch against the document with `id`.
    pub fn new(id: impl Into<String>) -> Self {
        PatchSet {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Identifier of the patched document.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set `path` to `value`, overwriting any existing value.
    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.set.insert(path.into(), value);
        self
    }

    /// Set `path` to `value` only when the attribute is currently absent.
    pub fn set_if_missing(mut self, path: impl Into<String>, value: Value) -> Self {
        self.set_if_missing.insert(path.into(), value);
        self
    }

    /// Remove the attribute at `path`.
    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.unset.push(path.into());
        self
    }

    /// Add `amount` to the numeric attribute at `path`.
    pub fn inc(mut self, path: impl Into<String>, amount: i64) -> Self {
        self.inc.insert(path.into(), Value::from(amount));
        self
    }

    /// True when no operation has been recorded.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.set_if_missing.is_empty()
            && self.unset.is_empty()
            && self.inc.is_empty()
    }

    pub(crate) fn ops(&self) -> (&Map<String, Value>, &Map<String, Value>, &[String], &Map<String, Value>) {
        (&self.set, &self.set_if_missing, &self.unset, &self.inc)
    }
}

/// Ordered, append-only list of pending mutations for one document type.
///
/// Insertion order is the only guarantee the client gives the remote service;
/// multiple mutations for the same identifier are all kept and sent in order.
#[derive(Debug, Default)]
pub struct MutationBatch {
    mutations: Vec<Mutation>,
}

impl MutationBatch {
    /// Append a mutation.
    pub fn add(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Number of pending mutations.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Discard every pending mutation.
    pub fn clear(&mut self) {
        self.mutations.clear();
    }

    /// Iterate pending mutations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }

    /// Copy of the current contents, in insertion order.
    ///
    /// Commits snapshot here so appends racing the network round-trip land
    /// after the copied prefix and survive for the next commit.
    pub(crate) fn snapshot(&self) -> Vec<Mutation> {
        self.mutations.clone()
    }

    /// Drop the first `count` mutations (the prefix a successful commit sent).
    pub(crate) fn drain_prefix(&mut self, count: usize) {
        let count = count.min(self.mutations.len());
        self.mutations.drain(..count);
    }
}
