//! Shared building blocks for the management microservices.

pub mod config;
pub mod errors;
pub mod response;

pub use config::{AppConfig, Paginate};
pub use errors::{AppError, AppResult};
pub use response::ApiResponse;
