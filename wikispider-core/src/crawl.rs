use crate::settings::SpiderSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wikispider_scanner::result::{CrawlSummary, PageVisit, VisitStatus};
use wikispider_scanner::{Crawler, LinkGate, ScanError, Telemetry};

/// Options for configuring a crawl run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    pub user_agent: String,
    pub allowed_domains: Vec<String>,
    pub url_base: String,
    pub start_slug: String,
    pub max_depth: usize,
    pub delay: Duration,
    pub workers: usize,
    pub request_timeout_secs: u64,
}

impl From<&SpiderSettings> for CrawlOptions {
    fn from(settings: &SpiderSettings) -> Self {
        Self {
            user_agent: settings.user_agent.clone(),
            allowed_domains: settings.allowed_domains.clone(),
            url_base: settings.url_base.clone(),
            start_slug: settings.start_slug.clone(),
            max_depth: settings.max_depth,
            delay: Duration::from_millis(settings.delay_ms),
            workers: settings.workers,
            request_timeout_secs: settings.request_timeout_secs,
        }
    }
}

impl CrawlOptions {
    pub fn start_url(&self) -> String {
        format!("{}{}", self.url_base, self.start_slug)
    }
}

/// Callback for reporting individual pages as they finish
pub type CrawlResultCallback = Arc<dyn Fn(PageVisit) + Send + Sync>;

/// Build the traversal engine for one job.
pub fn build_crawler(
    options: &CrawlOptions,
    gate: Arc<dyn LinkGate>,
    telemetry: Arc<dyn Telemetry>,
    job_id: &str,
    cancel: CancellationToken,
) -> Crawler {
    Crawler::new(gate, telemetry, job_id)
        .with_user_agent(options.user_agent.as_str())
        .with_timeout(options.request_timeout_secs)
        .with_url_base(options.url_base.as_str())
        .with_allowed_domains(options.allowed_domains.clone())
        .with_max_depth(options.max_depth)
        .with_delay(options.delay)
        .with_workers(options.workers)
        .with_cancellation(cancel)
}

/// Execute a crawl for `job_id`, recording every discovered page through `gate`.
pub async fn execute_crawl(
    options: CrawlOptions,
    gate: Arc<dyn LinkGate>,
    telemetry: Arc<dyn Telemetry>,
    job_id: &str,
    cancel: CancellationToken,
    result_callback: Option<CrawlResultCallback>,
) -> Result<CrawlSummary, ScanError> {
    let mut crawler = build_crawler(&options, gate, telemetry, job_id, cancel);

    if let Some(cb) = result_callback {
        crawler = crawler.with_result_callback(cb);
    }

    crawler.run(&options.start_slug).await
}

/// Human-readable summary of a finished run.
pub fn generate_crawl_report(job_id: &str, summary: &CrawlSummary, stored_links: i64) -> String {
    let mut report = String::new();
    report.push_str(&format!("# Job {}\n", job_id));
    report.push_str(&format!("  Pages fetched: {}\n", summary.pages_fetched()));
    report.push_str(&format!("  Pages failed: {}\n", summary.pages_failed));
    report.push_str(&format!("  Links found: {}\n", summary.links_found));
    report.push_str(&format!("  Links enqueued: {}\n", summary.links_enqueued));
    report.push_str(&format!("  Records created: {}\n", summary.records_created));
    report.push_str(&format!("  Records stored for job: {}\n", stored_links));
    report.push_str(&format!("  Rejected visits: {}\n", summary.rejections));
    if summary.storage_errors > 0 {
        report.push_str(&format!("  Storage errors: {}\n", summary.storage_errors));
    }
    if summary.pages_cancelled > 0 {
        report.push_str(&format!("  Cancelled before fetch: {}\n", summary.pages_cancelled));
    }
    report
}

/// Short status word for a finished page, used in progress logging.
pub fn visit_status_label(visit: &PageVisit) -> &'static str {
    match visit.status {
        VisitStatus::Processed => "processed",
        VisitStatus::Failed(_) => "failed",
        VisitStatus::Cancelled => "cancelled",
    }
}
