use crate::error::{Result, ScanError};
use crate::frontier::{Frontier, InFlight, RequestContext, is_allowed_host};
use crate::gate::LinkGate;
use crate::result::{AnchorOutcome, CrawlSummary, PageVisit, RecordOutcome, VisitStatus};
use crate::rules::is_eligible;
use crate::telemetry::Telemetry;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use reqwest::redirect::Policy;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type ResultCallback = Arc<dyn Fn(PageVisit) + Send + Sync>;

type PoliteLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub const DEFAULT_USER_AGENT: &str = concat!("wikispider/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 5;

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.mw-page-title-main").expect("valid title selector"));
static PARAGRAPH_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid paragraph selector"));
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

#[derive(Debug, thiserror::Error)]
#[error("redirect target {0} is outside the allowed domains")]
struct RedirectRefused(String);

/// Follow redirects only while they stay on an allowed host.
fn redirect_policy(allowed_domains: HashSet<String>) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if is_allowed_host(&allowed_domains, attempt.url()) {
            attempt.follow()
        } else {
            let target = attempt.url().to_string();
            attempt.error(RedirectRefused(target))
        }
    })
}

fn send_error(url: &str, err: reqwest::Error) -> ScanError {
    let mut cause = std::error::Error::source(&err);
    while let Some(inner) = cause {
        if let Some(refused) = inner.downcast_ref::<RedirectRefused>() {
            return ScanError::ForbiddenRedirect {
                url: url.to_string(),
                target: refused.0.clone(),
            };
        }
        cause = std::error::Error::source(inner);
    }
    ScanError::HttpError(err)
}

/// Title and paragraph links pulled out of one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub hrefs: Vec<String>,
}

/// Extract the page title and the raw href of every anchor inside body
/// paragraphs, in document order.
pub fn extract_page(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>());

    let mut hrefs = Vec::new();
    for paragraph in document.select(&PARAGRAPH_SELECTOR) {
        for anchor in paragraph.select(&ANCHOR_SELECTOR) {
            if let Some(href) = anchor.value().attr("href") {
                hrefs.push(href.to_string());
            }
        }
    }

    ExtractedPage { title, hrefs }
}

pub struct Crawler {
    gate: Arc<dyn LinkGate>,
    telemetry: Arc<dyn Telemetry>,
    job_id: String,
    user_agent: String,
    timeout_secs: u64,
    url_base: String,
    max_depth: usize,
    allowed_domains: Vec<String>,
    delay: Duration,
    workers: usize,
    cancel: CancellationToken,
    result_callback: Option<ResultCallback>,
}

impl Crawler {
    pub fn new(
        gate: Arc<dyn LinkGate>,
        telemetry: Arc<dyn Telemetry>,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            gate,
            telemetry,
            job_id: job_id.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 10,
            url_base: String::new(),
            max_depth: 1,
            allowed_domains: Vec::new(),
            delay: DEFAULT_DELAY,
            workers: 1,
            cancel: CancellationToken::new(),
            result_callback: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Prefix joined with discovered hrefs and with the start slug.
    pub fn with_url_base(mut self, url_base: impl Into<String>) -> Self {
        self.url_base = url_base.into();
        self
    }

    /// 0 fetches only the start page.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = domains;
        self
    }

    /// Minimum spacing between two fetches across all workers. Zero disables it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_result_callback(mut self, callback: ResultCallback) -> Self {
        self.result_callback = Some(callback);
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn build_client(&self) -> Result<Client> {
        let timeout = Duration::from_secs(self.timeout_secs.max(1));
        let client = Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(timeout)
            .connect_timeout(timeout / 2)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(redirect_policy(self.allowed_domains.iter().cloned().collect()))
            .build()?;
        Ok(client)
    }

    fn engine(&self) -> Result<Engine> {
        Ok(Engine {
            client: self.build_client()?,
            gate: self.gate.clone(),
            telemetry: self.telemetry.clone(),
            job_id: self.job_id.clone(),
            url_base: self.url_base.clone(),
            frontier: Frontier::new(
                self.max_depth,
                self.allowed_domains.iter().cloned(),
                self.cancel.clone(),
            ),
            limiter: Quota::with_period(self.delay).map(RateLimiter::direct),
            result_callback: self.result_callback.clone(),
            summary: Mutex::new(CrawlSummary::default()),
        })
    }

    /// Crawl starting from the URL base joined with `start_slug`.
    pub async fn run(&self, start_slug: &str) -> Result<CrawlSummary> {
        let start_url = format!("{}{}", self.url_base, start_slug);
        self.crawl(&start_url).await
    }

    /// Crawl starting from `start_url` until the frontier is drained or the
    /// run is cancelled. Only a failure of the start page is an error.
    pub async fn crawl(&self, start_url: &str) -> Result<CrawlSummary> {
        info!(
            "Starting crawl of {} with {} workers (max depth {})",
            start_url, self.workers, self.max_depth
        );

        let engine = Arc::new(self.engine()?);

        let seed = engine
            .frontier
            .admit_seed(start_url)
            .map_err(|rejection| {
                engine.telemetry.visit_error(rejection.reason());
                ScanError::SeedFetch {
                    url: start_url.to_string(),
                    reason: rejection.to_string(),
                }
            })?;

        {
            let _in_flight = InFlight::new(&engine.frontier);
            let visit = engine.visit(seed).await.map_err(|e| {
                engine.telemetry.visit_error(&e.tag());
                ScanError::SeedFetch {
                    url: start_url.to_string(),
                    reason: e.to_string(),
                }
            })?;
            engine.finish(visit);
        }

        let handles: Vec<_> = (0..self.workers)
            .map(|worker_id| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.run_worker(worker_id).await })
            })
            .collect();

        for joined in futures::future::join_all(handles).await {
            joined?;
        }

        let summary = engine.summary();
        info!(
            pages_processed = summary.pages_processed,
            pages_failed = summary.pages_failed,
            links_found = summary.links_found,
            records_created = summary.records_created,
            cancelled = engine.frontier.is_cancelled(),
            "Crawl complete"
        );
        Ok(summary)
    }
}

/// State shared by all workers of one run.
struct Engine {
    client: Client,
    gate: Arc<dyn LinkGate>,
    telemetry: Arc<dyn Telemetry>,
    job_id: String,
    url_base: String,
    frontier: Frontier,
    limiter: Option<PoliteLimiter>,
    result_callback: Option<ResultCallback>,
    summary: Mutex<CrawlSummary>,
}

impl Engine {
    async fn run_worker(&self, worker_id: usize) {
        debug!("Worker {} started", worker_id);

        while let Some(ctx) = self.frontier.next().await {
            let _in_flight = InFlight::new(&self.frontier);
            let (url, depth) = (ctx.url.clone(), ctx.depth);

            let visit = match self.visit(ctx).await {
                Ok(visit) => visit,
                Err(e) => {
                    self.telemetry.visit_error(&e.tag());
                    warn!(url = %url, error = %e, "could not visit page");
                    PageVisit::with_error(url, depth, e.to_string())
                }
            };
            self.finish(visit);
        }

        debug!("Worker {} finished", worker_id);
    }

    /// Block until the politeness limiter grants the next fetch. Returns false
    /// if the run was cancelled while waiting.
    async fn wait_turn(&self) -> bool {
        let cancel = self.frontier.cancel_token();
        match &self.limiter {
            Some(limiter) => tokio::select! {
                _ = limiter.until_ready() => !cancel.is_cancelled(),
                _ = cancel.cancelled() => false,
            },
            None => !cancel.is_cancelled(),
        }
    }

    async fn visit(&self, mut ctx: RequestContext) -> Result<PageVisit> {
        if !self.wait_turn().await {
            debug!(url = %ctx.url, "skipping fetch, crawl cancelled");
            return Ok(PageVisit::cancelled(ctx.url, ctx.depth));
        }

        info!(url = %ctx.url, depth = ctx.depth, "visiting");
        self.telemetry.page_visited(&ctx.url);

        let start = Instant::now();
        let response = self
            .client
            .get(&ctx.url)
            .send()
            .await
            .map_err(|e| send_error(&ctx.url, e))?;
        let response_time = start.elapsed();

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::HttpStatus {
                url: ctx.url,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.text().await?;

        let mut visit = PageVisit::new(ctx.url.clone(), ctx.depth);
        visit.status_code = status.as_u16();
        visit.response_time = response_time;
        visit.content_type = content_type.clone();

        let is_html = content_type
            .as_ref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        if is_html {
            let page = extract_page(&body);
            self.handle_page(&mut ctx, page, &mut visit).await;
        } else {
            debug!(url = %ctx.url, content_type = ?content_type, "not HTML, skipping extraction");
        }

        Ok(visit)
    }

    /// Record the page itself, then every eligible paragraph link in order.
    async fn handle_page(&self, ctx: &mut RequestContext, page: ExtractedPage, visit: &mut PageVisit) {
        if let Some(title) = page.title {
            debug!(title = %title, "found title");
            visit.page_record = Some(self.record(&ctx.url, &title).await);
            ctx.title = Some(title);
        }
        visit.title = ctx.title.clone();

        for href in &page.hrefs {
            if let Some(outcome) = self.handle_anchor(ctx, href).await {
                visit.anchors.push(outcome);
            }
        }
    }

    async fn handle_anchor(&self, ctx: &RequestContext, href: &str) -> Option<AnchorOutcome> {
        if !is_eligible(href) {
            return None;
        }

        let page_title = ctx.page_title();
        debug!(link = href, page_title = page_title, "found link");
        self.telemetry.link_found(page_title);

        let url = format!("{}{}", self.url_base, href);
        // Target records carry the referring page's title.
        let recorded = self.record(&url, page_title).await;

        let enqueued = match self.frontier.push(&url, ctx.depth + 1) {
            Ok(()) => None,
            Err(rejection) => {
                self.telemetry.visit_error(rejection.reason());
                debug!(url = %url, reason = rejection.reason(), "link not enqueued");
                Some(rejection)
            }
        };

        Some(AnchorOutcome {
            href: href.to_string(),
            url,
            recorded,
            enqueued,
        })
    }

    /// Gate calls may block on disk, so they run off the async workers.
    async fn record(&self, url: &str, title: &str) -> RecordOutcome {
        let gate = self.gate.clone();
        let (target, title, job_id) = (url.to_string(), title.to_string(), self.job_id.clone());
        let result =
            tokio::task::spawn_blocking(move || gate.record_if_absent(&target, &title, &job_id)).await;

        match result {
            Ok(Ok(true)) => RecordOutcome::Created,
            Ok(Ok(false)) => RecordOutcome::Existing,
            Ok(Err(e)) => {
                error!(url = %url, error = %e, "could not record link");
                RecordOutcome::Failed(e.to_string())
            }
            Err(e) => {
                error!(url = %url, error = %e, "link store task failed");
                RecordOutcome::Failed(e.to_string())
            }
        }
    }

    fn finish(&self, visit: PageVisit) {
        if let VisitStatus::Failed(reason) = &visit.status {
            debug!(url = %visit.url, reason = %reason, "page failed");
        }

        self.summary
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .absorb(&visit);

        if let Some(ref callback) = self.result_callback {
            callback(visit);
        }
    }

    fn summary(&self) -> CrawlSummary {
        self.summary
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
