//! Application state for the management service.

use std::sync::Arc;

use axum::extract::FromRef;
use common::config::AppConfig;
use common::errors::AppResult;
use mongodb::Client;

use crate::collections::{collections, CollectionAdapter, CollectionServiceOptions};
use crate::databases::{databases, DatabaseAdapter, DatabaseServiceOptions};
use crate::service::{Service, ServiceOptions};
use crate::users::{users, UserAdapter, UserServiceOptions};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub databases: Arc<Service<DatabaseAdapter>>,
    pub collections: Arc<Service<CollectionAdapter>>,
    pub users: Arc<Service<UserAdapter>>,
}

impl AppState {
    /// Builds the three resource services over one client.
    ///
    /// Collections and users are bound to `config.db_name`.
    pub fn new(config: AppConfig, client: Client) -> AppResult<Self> {
        let service = ServiceOptions {
            paginate: Some(config.paginate),
            ..Default::default()
        };
        let db = client.database(&config.db_name);

        let databases = databases(DatabaseServiceOptions {
            client: Some(client),
            db_name: Some(config.db_name.clone()),
            default_options: None,
            service: service.clone(),
        })?;
        let collections = collections(CollectionServiceOptions {
            db: Some(db.clone()),
            service: service.clone(),
        })?;
        let users = users(UserServiceOptions {
            db: Some(db),
            service,
        })?;

        Ok(Self {
            config,
            databases: Arc::new(databases),
            collections: Arc::new(collections),
            users: Arc::new(users),
        })
    }
}

impl FromRef<AppState> for Arc<Service<DatabaseAdapter>> {
    fn from_ref(state: &AppState) -> Self {
        state.databases.clone()
    }
}

impl FromRef<AppState> for Arc<Service<CollectionAdapter>> {
    fn from_ref(state: &AppState) -> Self {
        state.collections.clone()
    }
}

impl FromRef<AppState> for Arc<Service<UserAdapter>> {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
