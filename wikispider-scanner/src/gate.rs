use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// One discovered page as stored by a [`LinkGate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: String,
    pub job_id: String,
    pub url: String,
    pub title: String,
}

/// Dedup/persistence boundary between the traversal engine and storage.
///
/// The gate is the only thing that decides whether a URL has been recorded.
/// Implementations must be safe to call from several workers at once.
pub trait LinkGate: Send + Sync {
    /// Exact-match lookup on URL. `Ok(None)` means not recorded.
    fn lookup(&self, url: &str) -> Result<Option<LinkRecord>, StorageError>;

    /// Record `url` unless a record already exists. Returns `true` when a new
    /// record was written.
    fn record_if_absent(&self, url: &str, title: &str, job_id: &str)
    -> Result<bool, StorageError>;
}

/// Process-local gate, used for dry runs and tests.
#[derive(Default)]
pub struct MemoryGate {
    links: Mutex<HashMap<String, LinkRecord>>,
    next_id: AtomicU64,
}

impl MemoryGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.lock().map(|links| links.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<LinkRecord> {
        self.links
            .lock()
            .map(|links| links.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl LinkGate for MemoryGate {
    fn lookup(&self, url: &str) -> Result<Option<LinkRecord>, StorageError> {
        let links = self
            .links
            .lock()
            .map_err(|e| StorageError::MalformedRow(e.to_string()))?;
        Ok(links.get(url).cloned())
    }

    fn record_if_absent(
        &self,
        url: &str,
        title: &str,
        job_id: &str,
    ) -> Result<bool, StorageError> {
        let mut links = self
            .links
            .lock()
            .map_err(|e| StorageError::MalformedRow(e.to_string()))?;

        if links.contains_key(url) {
            return Ok(false);
        }

        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        links.insert(
            url.to_string(),
            LinkRecord {
                id,
                job_id: job_id.to_string(),
                url: url.to_string(),
                title: title.to_string(),
            },
        );
        Ok(true)
    }
}
