//! In-memory adapter for exercising the service engine without a server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use common::errors::AppResult;
use mongodb::bson::Document;

use crate::adapter::{rename_identity, with_name, ResourceAdapter, ResourceKind};
use crate::models::Params;

pub(crate) struct MemoryAdapter {
    kind: ResourceKind,
    key: &'static str,
    stats: bool,
    create_yields: usize,
    reversed_stats_latency: bool,
    items: Mutex<Vec<Document>>,
    created: Mutex<Vec<Document>>,
    stats_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryAdapter {
    /// `key` is the backend identity field renamed to `name` on normalize.
    pub(crate) fn new(kind: ResourceKind, key: &'static str) -> Self {
        Self {
            kind,
            key,
            stats: false,
            create_yields: 0,
            reversed_stats_latency: false,
            items: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            stats_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_items(self, items: Vec<Document>) -> Self {
        *self.items.lock().unwrap() = items;
        self
    }

    pub(crate) fn with_stats(mut self, stats: bool) -> Self {
        self.stats = stats;
        self
    }

    /// Suspends `create` this many times before it records the item.
    pub(crate) fn with_create_yields(mut self, yields: usize) -> Self {
        self.create_yields = yields;
        self
    }

    /// Makes `stats` of earlier items settle after later ones.
    pub(crate) fn with_reversed_stats_latency(mut self) -> Self {
        self.reversed_stats_latency = true;
        self
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub(crate) fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn created_options(&self) -> Vec<Document> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceAdapter for MemoryAdapter {
    type Item = Document;

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn supports_stats(&self) -> bool {
        self.stats
    }

    async fn create(&self, name: &str, options: Document) -> AppResult<Document> {
        for _ in 0..self.create_yields {
            tokio::task::yield_now().await;
        }
        self.created.lock().unwrap().push(options.clone());
        let mut item = Document::new();
        item.insert(self.key, name);
        for (key, value) in &options {
            item.insert(key.clone(), value.clone());
        }
        self.items.lock().unwrap().push(item);
        Ok(with_name(name, options))
    }

    async fn get(&self, id: &str, _params: &Params) -> AppResult<Option<Document>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.get_str(self.key).is_ok_and(|key| key == id))
            .cloned())
    }

    async fn list(&self) -> AppResult<Vec<Document>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.lock().unwrap().clone())
    }

    async fn remove(&self, item: Document) -> AppResult<()> {
        let id = item.get_str(self.key).unwrap_or_default().to_string();
        self.items
            .lock()
            .unwrap()
            .retain(|existing| existing.get_str(self.key).ok() != Some(id.as_str()));
        Ok(())
    }

    async fn stats(&self, item: &Document) -> AppResult<Document> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        if self.reversed_stats_latency {
            let yields = {
                let items = self.items.lock().unwrap();
                let position = items.iter().position(|existing| existing == item).unwrap_or(0);
                items.len() - position
            };
            for _ in 0..yields {
                tokio::task::yield_now().await;
            }
        }
        let mut stats = item.clone();
        stats.insert("ok", 1.0);
        Ok(stats)
    }

    fn raw_info(&self, item: &Document) -> Document {
        item.clone()
    }

    fn normalize(&self, info: Document) -> Document {
        rename_identity(info, self.key)
    }
}
