//! Collection resource, bound to one database.

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Collection, Database};

use crate::adapter::{with_name, ResourceAdapter, ResourceKind};
use crate::models::Params;
use crate::service::{Service, ServiceOptions};

/// Construction options of the collection service.
#[derive(Clone, Default)]
pub struct CollectionServiceOptions {
    /// Database whose collections are managed.
    pub db: Option<Database>,
    /// Generic service options.
    pub service: ServiceOptions,
}

/// Creates the collection service.
pub fn collections(options: CollectionServiceOptions) -> AppResult<Service<CollectionAdapter>> {
    let adapter = CollectionAdapter::new(options.db)?;
    Service::new(adapter, options.service)
}

/// Adapter over the collections of a database.
pub struct CollectionAdapter {
    db: Database,
}

impl CollectionAdapter {
    pub fn new(db: Option<Database>) -> AppResult<Self> {
        let db = db
            .ok_or_else(|| AppError::Configuration("Collection database must be provided".into()))?;
        Ok(Self { db })
    }
}

/// Replaces the `ns` field of a `collStats` reply by the collection `name`.
///
/// The namespace is split at its first dot. A namespace without a dot is
/// taken whole.
pub fn normalize_info(mut info: Document) -> Document {
    match info.remove("ns") {
        Some(Bson::String(ns)) => {
            let name = match ns.split_once('.') {
                Some((_, name)) => name.to_string(),
                None => ns,
            };
            with_name(name, info)
        }
        Some(other) => with_name(other, info),
        None => info,
    }
}

#[async_trait]
impl ResourceAdapter for CollectionAdapter {
    type Item = Collection<Document>;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Collection
    }

    fn default_id(&self) -> &'static str {
        "name"
    }

    fn supports_stats(&self) -> bool {
        true
    }

    async fn create(&self, name: &str, options: Document) -> AppResult<Document> {
        let mut command = doc! { "create": name };
        for (key, value) in &options {
            command.insert(key.clone(), value.clone());
        }
        self.db.run_command(command).await?;
        Ok(with_name(name, options))
    }

    async fn get(&self, id: &str, _params: &Params) -> AppResult<Option<Collection<Document>>> {
        Ok(Some(self.db.collection(id)))
    }

    async fn list(&self) -> AppResult<Vec<Collection<Document>>> {
        let names = self
            .db
            .list_collection_names()
            .filter(doc! { "type": "collection" })
            .await?;
        Ok(names.iter().map(|name| self.db.collection(name)).collect())
    }

    async fn remove(&self, item: Collection<Document>) -> AppResult<()> {
        item.drop().await?;
        Ok(())
    }

    async fn stats(&self, item: &Collection<Document>) -> AppResult<Document> {
        Ok(self.db.run_command(doc! { "collStats": item.name() }).await?)
    }

    fn raw_info(&self, item: &Collection<Document>) -> Document {
        doc! { "ns": item.namespace().to_string() }
    }

    fn normalize(&self, info: Document) -> Document {
        normalize_info(info)
    }
}
