//! Document seam: the trait user payloads implement to participate in a
//! [`crate::DataContext`].
//!
//! A document is an opaque serde-serializable payload with a remote type
//! discriminator and an optional string identifier. The registry side of the
//! crate keys state by `TypeId`, so two Rust types mapping to the same remote
//! `TYPE` still get distinct batches and document sets.

use std::any::TypeId;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// A typed payload stored in the remote document store.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Post {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     id: Option<String>,
///     title: String,
/// }
///
/// impl Document for Post {
///     const TYPE: &'static str = "post";
///     fn id(&self) -> Option<&str> {
///         self.id.as_deref()
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Remote type discriminator written into the `_type` field of the wire
    /// payload when the document's own serialization does not carry one.
    const TYPE: &'static str;

    /// The document's identifier, if one has been assigned client-side.
    ///
    /// `None` is only acceptable for plain creates; every id-targeted
    /// mutation (replace, create-if-not-exists, patch, delete) fails fast
    /// without it.
    fn id(&self) -> Option<&str>;
}

/// Untyped document: a raw JSON object standing in for payload shapes no
/// Rust type models.
///
/// Backs [`crate::DataContext::documents`]. Raw payloads normally carry
/// their own `_type`, which is left untouched; `TYPE` only serves as the
/// fallback discriminator when one is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDocument(pub Value);

impl Document for RawDocument {
    const TYPE: &'static str = "document";

    fn id(&self) -> Option<&str> {
        self.0.get("_id").and_then(Value::as_str)
    }
}

/// Registry key for per-type state. Distinct Rust types never collide, even
/// when they share a remote `TYPE` string.
pub(crate) fn doc_key<T: Document>() -> TypeId {
    TypeId::of::<T>()
}
