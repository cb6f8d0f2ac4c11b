#![deny(missing_docs)]
//! Typed client-side data access over a remote document store.
//!
//! The crate tracks pending create/update/delete intents per document type
//! and commits them as a single ordered, atomic transaction against an
//! opaque [`transport::Transport`] collaborator. The entry point is
//! [`DataContext`]: obtain a [`DocumentSet`] per type, record intents, then
//! [`DataContext::commit`].

mod builder;
mod context;
mod document;
mod error;
mod logging;
mod option;
mod set;

/// Pending mutation variants, patch building and the per-type batch.
pub mod mutation;

/// Transport seam: the trait, commit options/response and the in-process
/// [`transport::MemoryStore`].
pub mod transport;

#[cfg(test)]
mod test_util;

pub use crate::{
    builder::{BatchHandle, MutationBuilder, TransactionPayload},
    context::DataContext,
    document::{Document, RawDocument},
    error::Error,
    mutation::{DeleteTarget, Mutation, MutationBatch, PatchSet},
    option::ClientOptions,
    set::DocumentSet,
    transport::{CommitOptions, MutationResponse, Transport, TransportError, Visibility},
};
