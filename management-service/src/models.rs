//! Request and result shapes shared by all resource services.

use common::config::Paginate;
use common::errors::AppResult;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::query::parse_select;

/// Per-call pagination override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PaginateParam {
    /// `false` disables pagination, `true` keeps the service policy.
    Flag(bool),
    /// Replaces the service policy for this call.
    Policy(Paginate),
}

/// Parameters of a service call.
#[derive(Debug, Clone, Default)]
pub struct Params {
    /// Predicate fields plus `$sort`, `$skip`, `$limit`, `$select`.
    pub query: Option<Document>,
    /// Pagination override.
    pub paginate: Option<PaginateParam>,
    /// Database that scopes user lookups.
    pub db: Option<String>,
}

impl Params {
    /// Creates parameters carrying only a query.
    pub fn with_query(query: Document) -> Self {
        Self {
            query: Some(query),
            ..Default::default()
        }
    }

    /// Returns the `$select` field list of the query, if any.
    ///
    /// Accepts the same shapes as `find` and rejects the same malformed ones.
    pub fn select_fields(&self) -> AppResult<Option<Vec<String>>> {
        match self.query.as_ref().and_then(|query| query.get("$select")) {
            Some(value) => Ok(Some(parse_select(value)?)),
            None => Ok(None),
        }
    }
}

/// Paginated result of a find.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Page {
    /// Matching records before skip/limit.
    pub total: u64,
    /// Effective limit, absent when unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Records skipped from the front.
    pub skip: u64,
    /// Records of this page.
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Document>,
}

/// Result of `find`: a page when pagination is active, bare records otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FindResult {
    Page(Page),
    Data(Vec<Document>),
}

impl FindResult {
    /// Returns the records regardless of shape.
    pub fn into_data(self) -> Vec<Document> {
        match self {
            FindResult::Page(page) => page.data,
            FindResult::Data(data) => data,
        }
    }
}

/// A single value or a batch of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Flattens into a vector.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// What `remove` targets, besides `None` meaning every listed record.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoveTarget {
    /// A bare identity value.
    Id(String),
    /// A record previously returned by the service.
    Record(Document),
}

impl From<&str> for RemoveTarget {
    fn from(id: &str) -> Self {
        RemoveTarget::Id(id.to_string())
    }
}

impl From<Document> for RemoveTarget {
    fn from(record: Document) -> Self {
        RemoveTarget::Record(record)
    }
}
