use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AggregatorError, Result};
use crate::ingest::types::Posting;
use crate::persist::PostingStore;

#[derive(Default)]
struct Inner {
    rows: Vec<Posting>,
    urls: HashSet<String>,
}

/// Process-local store, for tests and runs without a database file.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| AggregatorError::storage("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl PostingStore for InMemoryStore {
    async fn existing_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        let inner = self.lock()?;
        Ok(urls
            .iter()
            .filter(|u| inner.urls.contains(u.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_batch(&self, postings: &[Posting]) -> Result<usize> {
        let mut inner = self.lock()?;

        // Validate the whole batch before touching anything.
        let mut batch_urls = HashSet::with_capacity(postings.len());
        for p in postings {
            if p.url.is_empty() {
                return Err(AggregatorError::storage(format!(
                    "posting {} has no url",
                    p.id
                )));
            }
            if inner.urls.contains(&p.url) || !batch_urls.insert(p.url.as_str()) {
                return Err(AggregatorError::conflict(format!(
                    "url already stored: {}",
                    p.url
                )));
            }
        }

        for p in postings {
            inner.urls.insert(p.url.clone());
            inner.rows.push(p.clone());
        }
        Ok(postings.len())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Posting>> {
        let inner = self.lock()?;
        Ok(inner.rows.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Posting>> {
        let inner = self.lock()?;
        Ok(inner.rows.iter().find(|p| p.id == id).cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.lock()?.rows.len())
    }
}
