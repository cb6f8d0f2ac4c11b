//! Transport seam between the change-tracking core and the remote service.
//!
//! The core hands a fully-ordered mutation list to [`Transport`] and treats
//! the round-trip as atomic: either the whole transaction was applied and a
//! [`MutationResponse`] comes back, or a [`TransportError`] is surfaced and
//! local pending state stays exactly as it was. Retry policy, auth and wire
//! encoding live behind this trait.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use ulid::Ulid;

use crate::{document::Document, error::Error, mutation::Mutation};

/// Failure reported by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network or HTTP-level failure before a structured response arrived.
    #[error("network failure: {0}")]
    Network(String),
    /// The remote service refused the transaction (validation, conflict, auth).
    #[error("transaction rejected by remote service: {0}")]
    Rejected(String),
    /// The request was cancelled or timed out before completion.
    #[error("request cancelled or timed out")]
    Cancelled,
    /// Request or response body could not be encoded/decoded.
    #[error("wire serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// When a committed mutation's effects become visible to subsequent reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible once the commit call returns.
    #[default]
    Sync,
    /// Applied durably but possibly not yet visible to queries.
    Async,
    /// Applied lazily at the service's discretion.
    Deferred,
}

/// Echo and visibility options for one commit call.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Ask the service to return the identifiers it touched.
    pub return_ids: bool,
    /// Ask the service to echo the post-mutation documents.
    pub return_documents: bool,
    /// Read-visibility mode for the transaction.
    pub visibility: Visibility,
    /// Client-chosen transaction id; the context fills one in when absent.
    pub transaction_id: Option<String>,
}

impl CommitOptions {
    /// Request touched identifiers in the response.
    pub fn return_ids(self, return_ids: bool) -> Self {
        CommitOptions { return_ids, ..self }
    }

    /// Request echoed documents in the response.
    pub fn return_documents(self, return_documents: bool) -> Self {
        CommitOptions {
            return_documents,
            ..self
        }
    }

    /// Set the transaction's read-visibility mode.
    pub fn visibility(self, visibility: Visibility) -> Self {
        CommitOptions { visibility, ..self }
    }

    /// Pin the transaction id instead of letting the context assign one.
    pub fn transaction_id(self, transaction_id: impl Into<String>) -> Self {
        CommitOptions {
            transaction_id: Some(transaction_id.into()),
            ..self
        }
    }
}

/// Result of a committed transaction.
///
/// Never partially populated: a failed commit produces a [`TransportError`],
/// not a response mixing succeeded and failed mutations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    /// Transaction id confirmed by the service.
    pub transaction_id: String,
    /// Identifiers touched by the transaction, when `return_ids` was set.
    #[serde(default)]
    pub ids: Vec<String>,
    /// Post-mutation documents, when `return_documents` was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Value>>,
}

impl MutationResponse {
    /// Decode the echoed documents into `T` values.
    ///
    /// Useful after a scoped commit, where every echoed document belongs to
    /// one Rust type.
    pub fn documents_as<T: Document>(&self) -> Result<Vec<T>, Error> {
        self.documents
            .iter()
            .flatten()
            .map(|value| serde_json::from_value(value.clone()).map_err(Error::from))
            .collect()
    }
}

/// Constraint carrier handed to the transport's query side.
///
/// Translation from a richer expression language into the remote query
/// syntax is a separate collaborator; this struct only scopes a fetch to a
/// document type, optionally narrowed to one id or a raw filter string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteQuery {
    /// Remote type discriminator the query is scoped to.
    pub doc_type: String,
    /// Fetch exactly this document.
    pub id: Option<String>,
    /// Raw filter expression in the remote query syntax.
    pub filter: Option<String>,
}

impl RemoteQuery {
    /// Query all documents of `doc_type`.
    pub fn new(doc_type: impl Into<String>) -> Self {
        RemoteQuery {
            doc_type: doc_type.into(),
            id: None,
            filter: None,
        }
    }

    /// Narrow the query to a single identifier.
    pub fn with_id(self, id: impl Into<String>) -> Self {
        RemoteQuery {
            id: Some(id.into()),
            ..self
        }
    }

    /// Attach a raw filter expression.
    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        RemoteQuery {
            filter: Some(filter.into()),
            ..self
        }
    }
}

/// Remote service executing ordered mutation transactions and queries.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Apply `mutations` atomically, in order, honoring `options`.
    async fn execute_transaction(
        &self,
        mutations: &[Mutation],
        options: &CommitOptions,
    ) -> Result<MutationResponse, TransportError>;

    /// Fetch raw documents matching `query`.
    async fn execute_query(&self, query: &RemoteQuery) -> Result<Vec<Value>, TransportError>;
}

/// In-process document table implementing [`Transport`].
///
/// Applies each transaction atomically against a staged copy of the table and
/// records call counts, which makes it the collaborator of choice in tests
/// asserting "no transport call happened". Patch paths are interpreted as
/// top-level attributes and filter strings are not interpreted at all; both
/// are deliberate simplifications of the remote service.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
    transaction_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `execute_transaction` calls so far.
    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }

    /// Number of `execute_query` calls so far.
    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no document is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored value for `id`, if present.
    pub fn get_raw(&self, id: &str) -> Option<Value> {
        self.lock().get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.documents
            .lock()
            .expect("memory store mutex should not be poisoned")
    }

    fn apply(
        staged: &mut HashMap<String, Value>,
        mutation: &Mutation,
    ) -> Result<String, TransportError> {
        match mutation {
            Mutation::Create(value) => {
                let (id, doc) = Self::identified(value, true)?;
                if staged.contains_key(&id) {
                    return Err(TransportError::Rejected(format!(
                        "document `{id}` already exists"
                    )));
                }
                staged.insert(id.clone(), doc);
                Ok(id)
            }
            Mutation::CreateOrReplace(value) => {
                let (id, doc) = Self::identified(value, false)?;
                staged.insert(id.clone(), doc);
                Ok(id)
            }
            Mutation::CreateIfNotExists(value) => {
                let (id, doc) = Self::identified(value, false)?;
                staged.entry(id.clone()).or_insert(doc);
                Ok(id)
            }
            Mutation::Patch(patch) => {
                let id = patch.id().to_owned();
                let Some(Value::Object(doc)) = staged.get_mut(&id) else {
                    return Err(TransportError::Rejected(format!(
                        "patch targets unknown document `{id}`"
                    )));
                };
                let (set, set_if_missing, unset, inc) = patch.ops();
                for (path, value) in set {
                    doc.insert(path.clone(), value.clone());
                }
                for (path, value) in set_if_missing {
                    doc.entry(path.clone()).or_insert_with(|| value.clone());
                }
                for path in unset {
                    doc.remove(path);
                }
                for (path, amount) in inc {
                    // Integer arithmetic only; matches PatchSet::inc.
                    let current = doc.get(path).and_then(Value::as_i64).unwrap_or(0);
                    let delta = amount.as_i64().unwrap_or(0);
                    doc.insert(path.clone(), Value::from(current + delta));
                }
                Ok(id)
            }
            Mutation::Delete(target) => {
                // Deleting a missing document is a remote no-op.
                staged.remove(&target.id);
                Ok(target.id.clone())
            }
        }
    }

    /// Split a create payload into (id, document), assigning a fresh id when
    /// allowed and none is present.
    fn identified(value: &Value, assign_missing: bool) -> Result<(String, Value), TransportError> {
        let Some(map) = value.as_object() else {
            return Err(TransportError::Rejected(
                "mutation payload is not a JSON object".into(),
            ));
        };
        match map.get("_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => Ok((id.to_owned(), value.clone())),
            _ if assign_missing => {
                let id = Ulid::new().to_string();
                let mut doc = map.clone();
                doc.insert("_id".into(), Value::String(id.clone()));
                Ok((id, Value::Object(doc)))
            }
            _ => Err(TransportError::Rejected(
                "mutation payload is missing `_id`".into(),
            )),
        }
    }
}

#[async_trait]
impl Transport for MemoryStore {
    async fn execute_transaction(
        &self,
        mutations: &[Mutation],
        options: &CommitOptions,
    ) -> Result<MutationResponse, TransportError> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);

        let mut guard = self.lock();
        let mut staged = guard.clone();
        let mut touched = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            touched.push(Self::apply(&mut staged, mutation)?);
        }

        let documents = options.return_documents.then(|| {
            touched
                .iter()
                .filter_map(|id| staged.get(id).cloned())
                .collect::<Vec<_>>()
        });
        // All mutations applied; publish the staged table atomically.
        *guard = staged;

        Ok(MutationResponse {
            transaction_id: options
                .transaction_id
                .clone()
                .unwrap_or_else(|| Ulid::new().to_string()),
            ids: if options.return_ids { touched } else { Vec::new() },
            documents,
        })
    }

    async fn execute_query(&self, query: &RemoteQuery) -> Result<Vec<Value>, TransportError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        let guard = self.lock();
        let mut matches: Vec<Value> = guard
            .values()
            .filter(|value| {
                value.get("_type").and_then(Value::as_str) == Some(query.doc_type.as_str())
            })
            .filter(|value| match &query.id {
                Some(id) => value.get("_id").and_then(Value::as_str) == Some(id.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        // Stable order for callers iterating the result.
        matches.sort_by(|a, b| {
            let a = a.get("_id").and_then(Value::as_str).unwrap_or_default();
            let b = b.get("_id").and_then(Value::as_str).unwrap_or_default();
            a.cmp(b)
        });
        Ok(matches)
    }
}
