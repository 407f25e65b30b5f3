use crate::model::{Job, JobStatus};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use wikispider_scanner::{LinkGate, LinkRecord, StorageError};

/// SQLite-backed link store shared by every crawl worker.
pub struct Database {
    conn: Mutex<Connection>,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

fn link_from_row(row: &Row<'_>) -> Result<LinkRecord> {
    Ok(LinkRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
    })
}

fn storage_error(err: rusqlite::Error) -> StorageError {
    match err {
        rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::FromSqlConversionFailure(..) => {
            StorageError::MalformedRow(err.to_string())
        }
        other => StorageError::backend(other),
    }
}

impl Database {
    /// Open the store named by a connection string: a file path, a
    /// `sqlite://` URL or `:memory:`.
    pub fn open(conn_string: &str) -> Result<Self> {
        let target = conn_string.strip_prefix("sqlite://").unwrap_or(conn_string);
        if target == ":memory:" {
            Self::in_memory()
        } else {
            Self::new(Path::new(target))
        }
    }

    pub fn new(path: &Path) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            "
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL CHECK(status IN ('started')),
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL DEFAULT '',
    FOREIGN KEY(job_id) REFERENCES jobs(id)
);

CREATE INDEX IF NOT EXISTS idx_links_job ON links(job_id);
            ",
        )?;
        Ok(())
    }

    // Job management
    pub fn create_job(&self) -> Result<Job> {
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Started,
            created_at: current_timestamp(),
        };

        self.conn().execute(
            "INSERT INTO jobs (id, status, created_at) VALUES (?1, ?2, ?3)",
            params![&job.id, job.status.as_str(), job.created_at],
        )?;

        Ok(job)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        self.conn()
            .query_row(
                "SELECT id, status, created_at FROM jobs WHERE id = ?1",
                params![job_id],
                |row| {
                    let status: String = row.get(1)?;
                    if status != JobStatus::Started.as_str() {
                        return Err(rusqlite::Error::InvalidColumnType(
                            1,
                            "status".to_string(),
                            rusqlite::types::Type::Text,
                        ));
                    }
                    Ok(Job {
                        id: row.get(0)?,
                        status: JobStatus::Started,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
    }

    // Link operations
    pub fn get_link_by_url(&self, url: &str) -> Result<Option<LinkRecord>> {
        self.conn()
            .query_row(
                "SELECT id, job_id, url, title FROM links WHERE url = ?1",
                params![url],
                link_from_row,
            )
            .optional()
    }

    pub fn insert_link(&self, id: &str, job_id: &str, url: &str, title: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO links (id, job_id, url, title) VALUES (?1, ?2, ?3, ?4)",
            params![id, job_id, url, title],
        )?;
        Ok(())
    }

    /// Single-statement insert that leaves an existing row for `url` alone.
    /// Returns whether a row was written.
    pub fn insert_link_if_absent(&self, job_id: &str, url: &str, title: &str) -> Result<bool> {
        let id = uuid::Uuid::new_v4().to_string();
        let changed = self.conn().execute(
            "INSERT INTO links (id, job_id, url, title) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url) DO NOTHING",
            params![&id, job_id, url, title],
        )?;
        Ok(changed == 1)
    }

    pub fn count_links_for_job(&self, job_id: &str) -> Result<i64> {
        self.conn().query_row(
            "SELECT COUNT(*) FROM links WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )
    }

    pub fn get_links_by_job(&self, job_id: &str) -> Result<Vec<LinkRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, job_id, url, title FROM links WHERE job_id = ?1 ORDER BY rowid")?;

        let links = stmt
            .query_map(params![job_id], link_from_row)?
            .collect::<Result<Vec<_>>>()?;

        Ok(links)
    }
}

impl LinkGate for Database {
    fn lookup(&self, url: &str) -> std::result::Result<Option<LinkRecord>, StorageError> {
        self.get_link_by_url(url).map_err(storage_error)
    }

    fn record_if_absent(
        &self,
        url: &str,
        title: &str,
        job_id: &str,
    ) -> std::result::Result<bool, StorageError> {
        self.insert_link_if_absent(job_id, url, title)
            .map_err(storage_error)
    }
}
