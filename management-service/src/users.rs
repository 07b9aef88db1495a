//! User resource, bound to one database.
//!
//! Users are resolved with `usersInfo` and managed with `createUser` and
//! `dropUser`. Records are the `usersInfo` entries with `user` renamed to
//! `name`.

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use mongodb::bson::{doc, Bson, Document};
use mongodb::Database;
use serde::Deserialize;

use crate::adapter::{rename_identity, with_name, ResourceAdapter, ResourceKind};
use crate::models::Params;
use crate::service::{Service, ServiceOptions};

/// Construction options of the user service.
#[derive(Clone, Default)]
pub struct UserServiceOptions {
    /// Database the users are defined on.
    pub db: Option<Database>,
    /// Generic service options.
    pub service: ServiceOptions,
}

/// Creates the user service.
pub fn users(options: UserServiceOptions) -> AppResult<Service<UserAdapter>> {
    let adapter = UserAdapter::new(options.db)?;
    Service::new(adapter, options.service)
}

#[derive(Deserialize)]
struct UsersInfo {
    #[serde(default)]
    users: Vec<Document>,
}

/// Adapter over the users of a database.
pub struct UserAdapter {
    db: Database,
}

impl UserAdapter {
    pub fn new(db: Option<Database>) -> AppResult<Self> {
        let db = db
            .ok_or_else(|| AppError::Configuration("MongoDB database must be provided".into()))?;
        Ok(Self { db })
    }

    async fn users_info(&self, selector: Bson) -> AppResult<Vec<Document>> {
        let reply = self.db.run_command(doc! { "usersInfo": selector }).await?;
        let info: UsersInfo =
            mongodb::bson::from_document(reply).map_err(mongodb::error::Error::from)?;
        Ok(info.users)
    }
}

/// Builds the `createUser` command. The password is required and consumed.
fn create_user_command(name: &str, options: &mut Document) -> AppResult<Document> {
    let password = match options.remove("password") {
        Some(Bson::String(password)) if !password.is_empty() => password,
        _ => {
            return Err(AppError::Validation(
                "Password option must be provided".into(),
            ))
        }
    };
    let roles = options
        .remove("roles")
        .unwrap_or_else(|| Bson::Array(Vec::new()));

    let mut command = doc! { "createUser": name, "pwd": password, "roles": roles.clone() };
    for (key, value) in options.iter() {
        command.insert(key.clone(), value.clone());
    }
    options.insert("roles", roles);
    Ok(command)
}

/// Renames the `user` field of a `usersInfo` entry to `name`.
pub fn normalize_info(info: Document) -> Document {
    rename_identity(info, "user")
}

#[async_trait]
impl ResourceAdapter for UserAdapter {
    type Item = Document;

    fn kind(&self) -> ResourceKind {
        ResourceKind::User
    }

    fn default_id(&self) -> &'static str {
        "user"
    }

    fn supports_stats(&self) -> bool {
        false
    }

    async fn create(&self, name: &str, mut options: Document) -> AppResult<Document> {
        let command = create_user_command(name, &mut options)?;
        self.db.run_command(command).await?;
        Ok(with_name(name, options))
    }

    async fn get(&self, id: &str, params: &Params) -> AppResult<Option<Document>> {
        let selector = match &params.db {
            Some(db) => Bson::Document(doc! { "user": id, "db": db }),
            None => Bson::String(id.to_string()),
        };
        Ok(self.users_info(selector).await?.into_iter().next())
    }

    async fn list(&self) -> AppResult<Vec<Document>> {
        self.users_info(Bson::Int32(1)).await
    }

    async fn remove(&self, item: Document) -> AppResult<()> {
        let user = item
            .get_str("user")
            .map_err(|_| AppError::Validation("user entry has no 'user' field".into()))?;
        self.db.run_command(doc! { "dropUser": user }).await?;
        Ok(())
    }

    fn raw_info(&self, item: &Document) -> Document {
        item.clone()
    }

    fn normalize(&self, info: Document) -> Document {
        normalize_info(info)
    }
}
