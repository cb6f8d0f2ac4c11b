//! Typed per-document-type surface: CRUD-intent recording plus queries.
//!
//! A `DocumentSet` never talks to the network for mutations; it validates
//! the intent, builds the [`Mutation`] variant and appends it to the shared
//! builder's batch for its type. Only the read side (`get`, `fetch`) goes to
//! the transport directly.

use std::{marker::PhantomData, sync::Arc};

use async_stream::stream;
use futures_core::Stream;
use futures_util::{pin_mut, TryStreamExt};
use serde_json::Value;

use crate::{
    builder::BatchHandle,
    document::Document,
    error::Error,
    mutation::{DeleteTarget, Mutation, PatchSet},
    transport::{RemoteQuery, Transport},
};

/// Typed view over one document type within a [`crate::DataContext`].
///
/// Exactly one set exists per (context, type) pair; the context hands out
/// `Arc` clones of it. All pending state lives in the context's shared
/// mutation builder.
pub struct DocumentSet<T: Document> {
    batch: BatchHandle,
    transport: Arc<dyn Transport>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> DocumentSet<T> {
    pub(crate) fn new(batch: BatchHandle, transport: Arc<dyn Transport>) -> Self {
        DocumentSet {
            batch,
            transport,
            _marker: PhantomData,
        }
    }

    /// Record a create intent. The document may omit its id; the service
    /// assigns one at commit time.
    pub fn create(&self, doc: &T) -> Result<(), Error> {
        let value = self.wire_value(doc)?;
        self.batch.add(Mutation::Create(value));
        Ok(())
    }

    /// Record a create-or-replace intent. Requires an identifier.
    pub fn create_or_replace(&self, doc: &T) -> Result<(), Error> {
        self.require_id(doc, "create_or_replace")?;
        let value = self.wire_value(doc)?;
        self.batch.add(Mutation::CreateOrReplace(value));
        Ok(())
    }

    /// Record a create-if-not-exists intent. Requires an identifier.
    pub fn create_if_not_exists(&self, doc: &T) -> Result<(), Error> {
        self.require_id(doc, "create_if_not_exists")?;
        let value = self.wire_value(doc)?;
        self.batch.add(Mutation::CreateIfNotExists(value));
        Ok(())
    }

    /// Record a partial-update intent. The patch must target a non-empty id
    /// and carry at least one operation; both are checked before the batch
    /// is touched.
    pub fn patch(&self, patch: PatchSet) -> Result<(), Error> {
        if patch.id().is_empty() {
            return Err(Error::InvalidMutation(format!(
                "patch on `{}` requires a non-empty document id",
                T::TYPE
            )));
        }
        if patch.is_empty() {
            return Err(Error::InvalidMutation(format!(
                "patch on `{}` carries no operation",
                T::TYPE
            )));
        }
        self.batch.add(Mutation::Patch(patch));
        Ok(())
    }

    /// Record a delete intent for `id`.
    pub fn delete(&self, id: &str) -> Result<(), Error> {
        if id.is_empty() {
            return Err(Error::InvalidMutation(format!(
                "delete on `{}` requires a non-empty document id",
                T::TYPE
            )));
        }
        self.batch.add(Mutation::Delete(DeleteTarget { id: id.into() }));
        Ok(())
    }

    /// Number of mutations pending for this type.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Fetch the document with `id`, if the remote store has one.
    pub async fn get(&self, id: &str) -> Result<Option<T>, Error> {
        let query = RemoteQuery::new(T::TYPE).with_id(id);
        let values = self.transport.execute_query(&query).await?;
        values
            .into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(Error::from)
    }

    /// Stream documents of this type, optionally narrowed by a raw filter
    /// expression in the remote query syntax.
    pub async fn fetch(
        &self,
        filter: Option<String>,
    ) -> Result<impl Stream<Item = Result<T, Error>>, Error> {
        let mut query = RemoteQuery::new(T::TYPE);
        if let Some(filter) = filter {
            query = query.with_filter(filter);
        }
        let values = self.transport.execute_query(&query).await?;
        Ok(stream! {
            for value in values {
                yield serde_json::from_value::<T>(value).map_err(Error::from);
            }
        })
    }

    /// Collect every document of this type.
    pub async fn fetch_all(&self) -> Result<Vec<T>, Error> {
        let stream = self.fetch(None).await?;
        pin_mut!(stream);
        stream.try_collect().await
    }

    /// Handle to this type's batch, for pairing with
    /// [`crate::MutationBuilder`] operations.
    pub fn batch(&self) -> &BatchHandle {
        &self.batch
    }

    fn require_id(&self, doc: &T, op: &str) -> Result<(), Error> {
        match doc.id() {
            Some(id) if !id.is_empty() => Ok(()),
            _ => Err(Error::InvalidMutation(format!(
                "{op} on `{}` requires a document with a non-empty id",
                T::TYPE
            ))),
        }
    }

    /// Serialize `doc` and inject the `_type` discriminator when the
    /// document's own serialization does not carry one.
    fn wire_value(&self, doc: &T) -> Result<Value, Error> {
        let mut value = serde_json::to_value(doc)?;
        let Value::Object(map) = &mut value else {
            return Err(Error::InvalidMutation(format!(
                "document of type `{}` must serialize to a JSON object",
                T::TYPE
            )));
        };
        if !map.contains_key("_type") {
            map.insert("_type".into(), Value::String(T::TYPE.into()));
        }
        Ok(value)
    }
}
