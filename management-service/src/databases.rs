//! Database resource.
//!
//! Lists databases through the admin interface and reports `dbStats` for
//! each of them.

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use mongodb::bson::{doc, Document};
use mongodb::options::DatabaseOptions;
use mongodb::{Client, Database};
use serde::Deserialize;

use crate::adapter::{rename_identity, ResourceAdapter, ResourceKind};
use crate::models::Params;
use crate::service::{Service, ServiceOptions};

/// Database that answers cross-database administrative commands.
pub const ADMIN_DB: &str = "admin";

/// Construction options of the database service.
#[derive(Clone, Default)]
pub struct DatabaseServiceOptions {
    /// Connected client.
    pub client: Option<Client>,
    /// Database the service is configured against.
    pub db_name: Option<String>,
    /// Options applied to database handles opened by `create`.
    pub default_options: Option<DatabaseOptions>,
    /// Generic service options.
    pub service: ServiceOptions,
}

/// Creates the database service.
pub fn databases(options: DatabaseServiceOptions) -> AppResult<Service<DatabaseAdapter>> {
    let adapter = DatabaseAdapter::new(options.client, options.db_name, options.default_options)?;
    Service::new(adapter, options.service)
}

#[derive(Deserialize)]
struct DatabaseList {
    databases: Vec<DatabaseEntry>,
}

#[derive(Deserialize)]
struct DatabaseEntry {
    name: String,
}

/// Adapter over the databases of a client.
pub struct DatabaseAdapter {
    client: Client,
    db_name: String,
    admin: Database,
    default_options: Option<DatabaseOptions>,
    admin_status: bool,
}

impl DatabaseAdapter {
    /// Binds a client. Fails when the client or database name is missing.
    pub fn new(
        client: Option<Client>,
        db_name: Option<String>,
        default_options: Option<DatabaseOptions>,
    ) -> AppResult<Self> {
        let client = client
            .ok_or_else(|| AppError::Configuration("MongoDB client must be provided".into()))?;
        let db_name = db_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                AppError::Configuration("MongoDB database name must be provided".into())
            })?;

        let admin = client.database(ADMIN_DB);
        Self::check_admin_db(Some(&admin))?;

        tracing::debug!(db_name = %db_name, "database adapter bound to admin interface");
        Ok(Self {
            client,
            db_name,
            admin,
            default_options,
            admin_status: true,
        })
    }

    /// Verifies the admin handle used for cross-database listing.
    pub fn check_admin_db(admin: Option<&Database>) -> AppResult<()> {
        match admin {
            Some(_) => Ok(()),
            None => Err(AppError::Configuration(
                "MongoDB admin cannot be retrieved, ensure the connection user has correct privileges"
                    .into(),
            )),
        }
    }

    /// Whether the admin handle was verified.
    pub fn admin_status(&self) -> bool {
        self.admin_status
    }

    /// Database name the service was configured with.
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    fn open(&self, name: &str) -> Database {
        match &self.default_options {
            Some(options) => self.client.database_with_options(name, options.clone()),
            None => self.client.database(name),
        }
    }
}

/// Renames the `db` field of a `dbStats` reply to `name`.
pub fn normalize_info(info: Document) -> Document {
    rename_identity(info, "db")
}

#[async_trait]
impl ResourceAdapter for DatabaseAdapter {
    type Item = Database;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Database
    }

    fn default_id(&self) -> &'static str {
        "name"
    }

    fn supports_stats(&self) -> bool {
        true
    }

    /// A database only materializes once written to; `dbStats` confirms the
    /// handle and gives the caller its record.
    async fn create(&self, name: &str, options: Document) -> AppResult<Document> {
        if !options.is_empty() {
            let ignored: Vec<&String> = options.keys().collect();
            tracing::warn!(database = name, ?ignored, "database create options are ignored");
        }
        let stats = self.open(name).run_command(doc! { "dbStats": 1 }).await?;
        Ok(normalize_info(stats))
    }

    async fn get(&self, id: &str, _params: &Params) -> AppResult<Option<Database>> {
        Ok(Some(self.client.database(id)))
    }

    async fn list(&self) -> AppResult<Vec<Database>> {
        let reply = self
            .admin
            .run_command(doc! { "listDatabases": 1, "nameOnly": true })
            .await?;
        let list: DatabaseList =
            mongodb::bson::from_document(reply).map_err(mongodb::error::Error::from)?;

        Ok(list
            .databases
            .into_iter()
            .map(|entry| self.client.database(&entry.name))
            .collect())
    }

    async fn remove(&self, item: Database) -> AppResult<()> {
        item.drop().await?;
        Ok(())
    }

    async fn stats(&self, item: &Database) -> AppResult<Document> {
        Ok(item.run_command(doc! { "dbStats": 1 }).await?)
    }

    fn raw_info(&self, item: &Database) -> Document {
        doc! { "db": item.name() }
    }

    fn normalize(&self, info: Document) -> Document {
        normalize_info(info)
    }
}
