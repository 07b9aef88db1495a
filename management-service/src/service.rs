//! 通用资源管理服务
//!
//! [`Service`] drives one [`ResourceAdapter`]: reads go through
//! list → stats → normalize → match → sort → paginate → select, writes
//! validate the name and delegate to the adapter.

use std::sync::Arc;

use common::config::Paginate;
use common::errors::{AppError, AppResult};
use futures::future::{join_all, try_join_all};
use mongodb::bson::{doc, Bson, Document};

use crate::adapter::ResourceAdapter;
use crate::models::{FindResult, OneOrMany, Page, PaginateParam, Params, RemoveTarget};
use crate::query::{self, Matcher, MatcherFactory, Predicate, SorterFactory};

/// Options common to every resource service.
#[derive(Clone, Default)]
pub struct ServiceOptions {
    /// Identity field exposed to callers.
    pub id: Option<String>,
    /// Custom event names, passed through to the host.
    pub events: Vec<String>,
    /// Default pagination policy.
    pub paginate: Option<Paginate>,
    /// Replaces the structural query matcher.
    pub matcher: Option<MatcherFactory>,
    /// Replaces the default comparator.
    pub sorter: Option<SorterFactory>,
}

/// Resource service composed from the generic engine and one adapter.
pub struct Service<A: ResourceAdapter> {
    adapter: A,
    id: String,
    events: Vec<String>,
    paginate: Paginate,
    matcher: Option<MatcherFactory>,
    sorter: SorterFactory,
}

impl<A: ResourceAdapter> Service<A> {
    /// Creates a service around an adapter.
    pub fn new(adapter: A, options: ServiceOptions) -> AppResult<Self> {
        let paginate = options.paginate.unwrap_or_default().checked()?;
        let id = options
            .id
            .unwrap_or_else(|| adapter.default_id().to_string());

        let sorter: SorterFactory = match options.sorter {
            Some(sorter) => sorter,
            None => Arc::new(query::default_sorter),
        };

        tracing::debug!(kind = %adapter.kind(), id = %id, "resource service created");
        Ok(Self {
            adapter,
            id,
            events: options.events,
            paginate,
            matcher: options.matcher,
            sorter,
        })
    }

    /// Returns the bound adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Identity field exposed to callers.
    pub fn id_field(&self) -> &str {
        &self.id
    }

    /// Custom event names.
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Finds records, paginated when a policy is active for the call.
    pub async fn find(&self, params: &Params) -> AppResult<FindResult> {
        match self.effective_paginate(params)? {
            Some(paginate) => Ok(FindResult::Page(self.find_with(params, Some(&paginate)).await?)),
            None => Ok(FindResult::Data(self.find_with(params, None).await?.data)),
        }
    }

    /// Finds records and always returns a page; no pagination policy applies.
    pub async fn find_page(&self, params: &Params) -> AppResult<Page> {
        self.find_with(params, None).await
    }

    async fn find_with(&self, params: &Params, paginate: Option<&Paginate>) -> AppResult<Page> {
        let empty = Document::new();
        let (predicate, filters) = query::split(params.query.as_ref().unwrap_or(&empty), paginate)?;
        let predicate = self.predicate(&predicate)?;

        let items = self.adapter.list().await?;
        let lookups: Vec<_> = items.iter().map(|item| self.info(item)).collect();
        let infos = try_join_all(lookups).await?;
        let listed = infos.len();

        let mut values: Vec<Document> = infos
            .into_iter()
            .map(|info| self.adapter.normalize(info))
            .filter(|record| predicate(record))
            .collect();
        let total = values.len() as u64;

        if let Some(sort) = &filters.sort {
            let comparator = (self.sorter)(sort);
            values.sort_by(|a, b| comparator(a, b));
        }

        let skip = filters.skip.unwrap_or(0);
        let paged = values.into_iter().skip(usize::try_from(skip).unwrap_or(usize::MAX));
        let mut data: Vec<Document> = match filters.limit {
            Some(limit) => paged.take(usize::try_from(limit).unwrap_or(usize::MAX)).collect(),
            None => paged.collect(),
        };

        if let Some(fields) = &filters.select {
            data = data.iter().map(|record| query::select(record, fields)).collect();
        }

        tracing::debug!(kind = %self.adapter.kind(), listed, total, returned = data.len(), "find");
        Ok(Page {
            total,
            limit: filters.limit,
            skip,
            data,
        })
    }

    /// Resolves an identity to the adapter's raw item.
    pub async fn get(&self, id: &str, params: &Params) -> AppResult<Option<A::Item>> {
        self.adapter.get(id, params).await
    }

    /// Resolves an identity and returns its normalized record.
    pub async fn describe(&self, id: &str, params: &Params) -> AppResult<Document> {
        let select = params.select_fields()?;
        let item = self
            .adapter
            .get(id, params)
            .await?
            .ok_or_else(|| AppError::record_not_found(id))?;
        let record = self.adapter.normalize(self.info(&item).await?);
        Ok(apply_select(record, select.as_deref()))
    }

    /// Creates one object or a batch.
    ///
    /// Batch items are submitted concurrently and every item runs to
    /// completion; the first failure is reported once all have settled, and
    /// the other items stay committed.
    pub async fn create(
        &self,
        data: OneOrMany<Document>,
        params: &Params,
    ) -> AppResult<OneOrMany<Document>> {
        let select = params.select_fields()?;
        match data {
            OneOrMany::One(item) => {
                let record = self.create_one(item).await?;
                Ok(OneOrMany::One(apply_select(record, select.as_deref())))
            }
            OneOrMany::Many(items) => {
                let pending: Vec<_> = items.into_iter().map(|item| self.create_one(item)).collect();
                let created = settle(join_all(pending).await)?;
                Ok(OneOrMany::Many(
                    created
                        .into_iter()
                        .map(|record| apply_select(record, select.as_deref()))
                        .collect(),
                ))
            }
        }
    }

    async fn create_one(&self, mut data: Document) -> AppResult<Document> {
        let name = match data.remove("name") {
            Some(Bson::String(name)) if !name.is_empty() => name,
            _ => {
                return Err(AppError::Validation(format!(
                    "Missing required name to create a {}",
                    self.adapter.kind()
                )))
            }
        };

        let record = self.adapter.create(&name, data).await?;
        tracing::info!(kind = %self.adapter.kind(), name = %name, "created");
        Ok(record)
    }

    /// Removes one object, or every record matching the query when `target`
    /// is `None`. Removals of a batch all settle before a failure is reported.
    pub async fn remove(
        &self,
        target: Option<RemoveTarget>,
        params: &Params,
    ) -> AppResult<OneOrMany<Document>> {
        let select = params.select_fields()?;
        match target {
            Some(target) => {
                let removed = self.remove_one(target, params).await?;
                Ok(OneOrMany::One(apply_select(removed, select.as_deref())))
            }
            None => {
                // Records must keep their identity until they are removed.
                let mut lookup = params.clone();
                if let Some(query) = lookup.query.as_mut() {
                    query.remove("$select");
                }
                let page = self.find_page(&lookup).await?;
                let pending: Vec<_> = page
                    .data
                    .into_iter()
                    .map(|record| self.remove_one(RemoveTarget::Record(record), params))
                    .collect();
                let removed = settle(join_all(pending).await)?;
                Ok(OneOrMany::Many(
                    removed
                        .into_iter()
                        .map(|record| apply_select(record, select.as_deref()))
                        .collect(),
                ))
            }
        }
    }

    async fn remove_one(&self, target: RemoveTarget, params: &Params) -> AppResult<Document> {
        let id = match &target {
            RemoveTarget::Id(id) => id.clone(),
            RemoveTarget::Record(record) => self.identity_of(record)?,
        };

        let item = self
            .adapter
            .get(&id, params)
            .await?
            .ok_or_else(|| AppError::record_not_found(&id))?;
        self.adapter.remove(item).await?;
        tracing::info!(kind = %self.adapter.kind(), id = %id, "removed");

        Ok(match target {
            RemoveTarget::Record(record) => record,
            RemoveTarget::Id(id) => doc! { "name": id },
        })
    }

    /// Partial updates are not supported.
    pub async fn patch(&self, _id: &str, _data: Document, _params: &Params) -> AppResult<Document> {
        Err(AppError::NotImplemented("patch"))
    }

    /// Full updates are not supported.
    pub async fn update(&self, _id: &str, _data: Document, _params: &Params) -> AppResult<Document> {
        Err(AppError::NotImplemented("update"))
    }

    /// Pagination policy of a call. A per-call policy is held to the same
    /// bounds as the service policy.
    fn effective_paginate(&self, params: &Params) -> AppResult<Option<Paginate>> {
        let paginate = match params.paginate {
            Some(PaginateParam::Flag(false)) => return Ok(None),
            Some(PaginateParam::Flag(true)) | None => self.paginate,
            Some(PaginateParam::Policy(paginate)) => {
                paginate.checked().map_err(|err| match err {
                    AppError::Configuration(message) => AppError::Validation(message),
                    other => other,
                })?
            }
        };
        Ok(paginate.is_enabled().then_some(paginate))
    }

    fn predicate(&self, query: &Document) -> AppResult<Predicate> {
        match &self.matcher {
            Some(factory) => Ok(factory(query)),
            None => Ok(Matcher::compile(query)?.into_predicate()),
        }
    }

    async fn info(&self, item: &A::Item) -> AppResult<Document> {
        if self.adapter.supports_stats() {
            self.adapter.stats(item).await
        } else {
            Ok(self.adapter.raw_info(item))
        }
    }

    /// Identity of a record: the configured id field, else `name`.
    fn identity_of(&self, record: &Document) -> AppResult<String> {
        let value = record
            .get(&self.id)
            .or_else(|| record.get("name"))
            .ok_or_else(|| {
                AppError::Validation(format!("record has no '{}' or 'name' field", self.id))
            })?;

        match value {
            Bson::String(id) => Ok(id.clone()),
            Bson::ObjectId(id) => Ok(id.to_hex()),
            other => Ok(other.to_string()),
        }
    }
}

fn apply_select(record: Document, fields: Option<&[String]>) -> Document {
    match fields {
        Some(fields) => query::select(&record, fields),
        None => record,
    }
}

/// Returns every value, or the first error in submission order.
fn settle(results: Vec<AppResult<Document>>) -> AppResult<Vec<Document>> {
    let failed = results.iter().filter(|result| result.is_err()).count();
    if failed > 0 {
        tracing::warn!(failed, settled = results.len(), "batch finished with failures");
    }
    results.into_iter().collect()
}
