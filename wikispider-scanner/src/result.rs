use crate::error::VisitRejection;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened when a URL was handed to the link gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOutcome {
    Created,
    Existing,
    Failed(String),
}

/// Result of processing one eligible anchor. A failure here never stops the
/// rest of the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorOutcome {
    pub href: String,
    pub url: String,
    pub recorded: RecordOutcome,
    #[serde(skip)]
    pub enqueued: Option<VisitRejection>,
}

impl AnchorOutcome {
    pub fn was_enqueued(&self) -> bool {
        self.enqueued.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitStatus {
    Processed,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVisit {
    pub url: String,
    pub depth: usize,
    pub status: VisitStatus,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub response_time: Duration,
    pub title: Option<String>,
    pub page_record: Option<RecordOutcome>,
    pub anchors: Vec<AnchorOutcome>,
}

impl PageVisit {
    pub fn new(url: String, depth: usize) -> Self {
        Self {
            url,
            depth,
            status: VisitStatus::Processed,
            status_code: 0,
            content_type: None,
            response_time: Duration::from_secs(0),
            title: None,
            page_record: None,
            anchors: Vec::new(),
        }
    }

    pub fn with_error(url: String, depth: usize, error: String) -> Self {
        Self {
            status: VisitStatus::Failed(error),
            ..Self::new(url, depth)
        }
    }

    pub fn cancelled(url: String, depth: usize) -> Self {
        Self {
            status: VisitStatus::Cancelled,
            ..Self::new(url, depth)
        }
    }
}

/// Totals for a finished crawl run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub pages_processed: usize,
    pub pages_failed: usize,
    pub pages_cancelled: usize,
    pub links_found: usize,
    pub records_created: usize,
    pub links_enqueued: usize,
    pub rejections: usize,
    pub storage_errors: usize,
}

impl CrawlSummary {
    pub fn absorb(&mut self, visit: &PageVisit) {
        match visit.status {
            VisitStatus::Processed => self.pages_processed += 1,
            VisitStatus::Failed(_) => self.pages_failed += 1,
            VisitStatus::Cancelled => self.pages_cancelled += 1,
        }

        let records = visit
            .page_record
            .iter()
            .chain(visit.anchors.iter().map(|a| &a.recorded));
        for record in records {
            match record {
                RecordOutcome::Created => self.records_created += 1,
                RecordOutcome::Existing => {}
                RecordOutcome::Failed(_) => self.storage_errors += 1,
            }
        }

        self.links_found += visit.anchors.len();
        for anchor in &visit.anchors {
            if anchor.was_enqueued() {
                self.links_enqueued += 1;
            } else {
                self.rejections += 1;
            }
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_processed + self.pages_failed
    }
}
