use anyhow::{Context, Result};
use clap::ArgMatches;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, Span, debug, info, info_span, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};
use wikispider_core::crawl::{
    CrawlOptions, CrawlResultCallback, execute_crawl, generate_crawl_report, visit_status_label,
};
use wikispider_core::data::Database;
use wikispider_core::settings::{Settings, SpiderSettings};
use wikispider_core::telemetry::{MetricsTelemetry, init_metrics};
use wikispider_scanner::{LinkGate, MemoryGate, PageVisit};

/// Job id reported for runs that never touch the database.
pub const DRY_RUN_JOB_ID: &str = "dry-run";

pub type LogHandle = reload::Handle<EnvFilter, Registry>;

// Logging

/// Parse a configured level name ("info", "DEBUG", ...) into a filter.
pub fn parse_log_level(level: &str) -> Result<LevelFilter> {
    let level: Level = level
        .trim()
        .parse()
        .with_context(|| format!("unknown log level {level:?}"))?;
    Ok(LevelFilter::from_level(level))
}

/// Install the JSON logger at `info`. The level is adjusted once the
/// configuration has been read.
pub fn init_logging() -> Result<LogHandle> {
    let (filter, handle) = reload::Layer::new(level_filter(LevelFilter::INFO));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .context("could not install logger")?;
    Ok(handle)
}

pub fn set_log_level(handle: &LogHandle, level: &str) -> Result<()> {
    let level = parse_log_level(level).context("could not set log level")?;
    handle
        .reload(level_filter(level))
        .context("could not set log level")
}

fn level_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::default().add_directive(level.into())
}

// Configuration

/// Apply command-line overrides on top of the environment configuration.
pub fn apply_overrides(spider: &mut SpiderSettings, matches: &ArgMatches) {
    if let Some(depth) = matches.get_one::<usize>("max-depth") {
        spider.max_depth = *depth;
    }
    if let Some(slug) = matches.get_one::<String>("start-slug") {
        spider.start_slug = slug.clone();
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        spider.workers = *workers;
    }
    if let Some(delay_ms) = matches.get_one::<u64>("delay-ms") {
        spider.delay_ms = *delay_ms;
    }
}

// Storage

/// Where discovered links end up for this run.
pub enum LinkStore {
    Sqlite(Arc<Database>),
    Memory(Arc<MemoryGate>),
}

impl LinkStore {
    /// Open the store and register the job; returns the job id alongside.
    pub fn open(conn_string: &str, dry_run: bool) -> Result<(Self, String)> {
        if dry_run {
            warn!("dry run: discovered links will not be persisted");
            return Ok((
                LinkStore::Memory(Arc::new(MemoryGate::new())),
                DRY_RUN_JOB_ID.to_string(),
            ));
        }

        let db = Database::open(conn_string).context("could not create db client")?;
        let job = db.create_job().context("could not create job")?;
        info!(job_id = %job.id, "job created");
        Ok((LinkStore::Sqlite(Arc::new(db)), job.id))
    }

    pub fn gate(&self) -> Arc<dyn LinkGate> {
        match self {
            LinkStore::Sqlite(db) => db.clone(),
            LinkStore::Memory(memory) => memory.clone(),
        }
    }

    pub fn stored_links(&self, job_id: &str) -> Result<i64> {
        match self {
            LinkStore::Sqlite(db) => db
                .count_links_for_job(job_id)
                .context("could not count stored links"),
            LinkStore::Memory(memory) => Ok(memory.len() as i64),
        }
    }
}

// Crawl

/// Token cancelled on the first Ctrl-C. In-flight pages finish, nothing new
/// is fetched.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping crawl");
            token.cancel();
        }
    });
    cancel
}

fn progress_callback() -> CrawlResultCallback {
    Arc::new(|visit: PageVisit| {
        debug!(
            url = %visit.url,
            depth = visit.depth,
            status = visit_status_label(&visit),
            "page finished"
        );
    })
}

pub async fn handle_crawl(matches: &ArgMatches) -> Result<()> {
    let log_handle = init_logging()?;
    info!("welcome to wikispider!");

    let mut settings = Settings::from_env().context("could not create config")?;
    apply_overrides(&mut settings.spider, matches);
    set_log_level(&log_handle, &settings.log_level)?;
    debug!(
        settings = %serde_json::to_string(&settings).unwrap_or_default(),
        "configuration loaded"
    );

    init_metrics(&settings.metrics).context("could not create metrics exporter")?;

    let (store, job_id) = LinkStore::open(
        &settings.database_conn_string,
        matches.get_flag("dry-run"),
    )?;

    let span = if settings.tracing.enabled {
        info_span!(
            "crawl",
            service = %settings.tracing.service,
            version = %settings.tracing.version,
            job_id = %job_id
        )
    } else {
        Span::none()
    };

    info!(start_url = %settings.spider.start_url(), max_depth = settings.spider.max_depth, "starting crawl");
    let summary = execute_crawl(
        CrawlOptions::from(&settings.spider),
        store.gate(),
        Arc::new(MetricsTelemetry::new()),
        &job_id,
        cancel_on_interrupt(),
        Some(progress_callback()),
    )
    .instrument(span)
    .await
    .context("could not complete crawl")?;

    let stored = store.stored_links(&job_id)?;
    info!(
        report = %generate_crawl_report(&job_id, &summary, stored),
        "crawl finished"
    );
    info!("wikispider has finished! goodbye!");
    Ok(())
}
