//! MongoDB 管理服务
//!
//! 提供 MongoDB 管理对象的统一 CRUD 接口，包括：
//! - 数据库（`listDatabases` / `dbStats`）
//! - 集合（`collStats`）
//! - 用户（`usersInfo` / `createUser` / `dropUser`）
//!
//! Each resource is a [`Service`](service::Service) over a
//! [`ResourceAdapter`](adapter::ResourceAdapter); queries are evaluated in
//! memory by [`query`].

pub mod adapter;
pub mod collections;
pub mod databases;
pub mod handlers;
pub mod models;
pub mod query;
pub mod routes;
pub mod service;
pub mod state;
pub mod users;

#[cfg(test)]
mod testing;

/// Service name reported in logs and response metadata.
pub const SERVICE_NAME: &str = "management-service";

pub use adapter::{ResourceAdapter, ResourceKind};
pub use collections::{collections, CollectionAdapter, CollectionServiceOptions};
pub use databases::{databases, DatabaseAdapter, DatabaseServiceOptions};
pub use models::{FindResult, OneOrMany, Page, PaginateParam, Params, RemoveTarget};
pub use service::{Service, ServiceOptions};
pub use users::{users, UserAdapter, UserServiceOptions};
