//! Resource adapter contract.
//!
//! An adapter binds one backend handle and translates the generic service
//! verbs into driver calls for one kind of administrative object.

use async_trait::async_trait;
use common::errors::AppResult;
use mongodb::bson::{Bson, Document};

use crate::models::Params;

/// Kind of administrative object an adapter manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Database,
    Collection,
    User,
}

impl ResourceKind {
    /// Lowercase singular name, used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Database => "database",
            ResourceKind::Collection => "collection",
            ResourceKind::User => "user",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend operations a resource service delegates to.
#[async_trait]
pub trait ResourceAdapter: Send + Sync + 'static {
    /// Raw backend object returned by `list` and `get`.
    type Item: Send + Sync;

    /// Kind of object managed.
    fn kind(&self) -> ResourceKind;

    /// Identity field exposed when the service options do not set one.
    fn default_id(&self) -> &'static str {
        "_id"
    }

    /// Whether `stats` yields a richer info object than `raw_info`.
    fn supports_stats(&self) -> bool;

    /// Creates the named object and returns its normalized record.
    async fn create(&self, name: &str, options: Document) -> AppResult<Document>;

    /// Resolves an identity to a backend object.
    async fn get(&self, id: &str, params: &Params) -> AppResult<Option<Self::Item>>;

    /// Lists every backend object, not yet normalized.
    async fn list(&self) -> AppResult<Vec<Self::Item>>;

    /// Drops or deletes a backend object.
    async fn remove(&self, item: Self::Item) -> AppResult<()>;

    /// Fetches the statistics object of an item.
    async fn stats(&self, item: &Self::Item) -> AppResult<Document> {
        Ok(self.raw_info(item))
    }

    /// Info object of an item without contacting the backend.
    fn raw_info(&self, item: &Self::Item) -> Document;

    /// Renames the backend identity field of an info object to `name`.
    fn normalize(&self, info: Document) -> Document;
}

/// Moves `key` to a leading `name` field.
///
/// The key is dropped either way; `name` is only set when the key held a value.
pub fn rename_identity(mut info: Document, key: &str) -> Document {
    match info.remove(key) {
        Some(value) => with_name(value, info),
        None => info,
    }
}

/// Builds a record whose first field is `name`, followed by `rest`.
pub(crate) fn with_name(name: impl Into<Bson>, rest: Document) -> Document {
    let mut record = Document::new();
    record.insert("name", name.into());
    for (key, value) in rest {
        if key != "name" {
            record.insert(key, value);
        }
    }
    record
}
