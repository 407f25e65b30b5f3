// Tests for the SQLite link store

use std::sync::Arc;
use tempfile::TempDir;
use wikispider_core::data::Database;
use wikispider_core::model::JobStatus;
use wikispider_scanner::LinkGate;

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

// ============================================================================
// Database Creation Tests
// ============================================================================

#[test]
fn test_database_creation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let db = Database::new(&db_path);
    assert!(db.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_open_sqlite_url() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("spider.db");
    let conn_string = format!("sqlite://{}", db_path.display());

    let db = Database::open(&conn_string);
    assert!(db.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_schema_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let job_id = {
        let db = Database::new(&db_path).unwrap();
        let job = db.create_job().unwrap();
        db.insert_link_if_absent(&job.id, "https://example.org/wiki/A", "A")
            .unwrap();
        job.id
    };

    let db = Database::new(&db_path).unwrap();
    assert_eq!(db.count_links_for_job(&job_id).unwrap(), 1);
}

// ============================================================================
// Job Tests
// ============================================================================

#[test]
fn test_create_job() {
    let (_temp_dir, db) = create_test_db();

    let job = db.create_job().unwrap();
    assert!(!job.id.is_empty());
    assert_eq!(job.status, JobStatus::Started);
    assert!(job.created_at > 0);

    let stored = db.get_job(&job.id).unwrap().unwrap();
    assert_eq!(stored, job);
}

#[test]
fn test_create_multiple_jobs() {
    let (_temp_dir, db) = create_test_db();

    let job1 = db.create_job().unwrap();
    let job2 = db.create_job().unwrap();

    assert_ne!(job1.id, job2.id);
}

#[test]
fn test_get_missing_job() {
    let (_temp_dir, db) = create_test_db();
    assert!(db.get_job("missing").unwrap().is_none());
}

// ============================================================================
// Link Tests
// ============================================================================

#[test]
fn test_get_link_by_url_not_found() {
    let (_temp_dir, db) = create_test_db();

    let link = db.get_link_by_url("https://example.org/wiki/Nowhere").unwrap();
    assert!(link.is_none());
}

#[test]
fn test_insert_and_get_link() {
    let (_temp_dir, db) = create_test_db();
    let job = db.create_job().unwrap();

    db.insert_link("link-1", &job.id, "https://example.org/wiki/Idaho", "Idaho")
        .unwrap();

    let link = db
        .get_link_by_url("https://example.org/wiki/Idaho")
        .unwrap()
        .unwrap();
    assert_eq!(link.id, "link-1");
    assert_eq!(link.job_id, job.id);
    assert_eq!(link.title, "Idaho");
}

#[test]
fn test_lookup_is_exact_match() {
    let (_temp_dir, db) = create_test_db();
    let job = db.create_job().unwrap();

    db.insert_link("link-1", &job.id, "https://example.org/wiki/Idaho", "Idaho")
        .unwrap();

    assert!(db.get_link_by_url("https://example.org/wiki/idaho").unwrap().is_none());
    assert!(db.get_link_by_url("https://example.org/wiki/Idaho/").unwrap().is_none());
}

#[test]
fn test_empty_title_allowed() {
    let (_temp_dir, db) = create_test_db();
    let job = db.create_job().unwrap();

    assert!(db.record_if_absent("https://example.org/wiki/A", "", &job.id).unwrap());
    let link = db.lookup("https://example.org/wiki/A").unwrap().unwrap();
    assert_eq!(link.title, "");
}

#[test]
fn test_links_by_job() {
    let (_temp_dir, db) = create_test_db();
    let job1 = db.create_job().unwrap();
    let job2 = db.create_job().unwrap();

    db.record_if_absent("https://example.org/wiki/A", "Start", &job1.id).unwrap();
    db.record_if_absent("https://example.org/wiki/B", "Start", &job1.id).unwrap();
    db.record_if_absent("https://example.org/wiki/C", "Other", &job2.id).unwrap();

    let links = db.get_links_by_job(&job1.id).unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].url, "https://example.org/wiki/A");
    assert_eq!(links[1].url, "https://example.org/wiki/B");
    assert_eq!(db.count_links_for_job(&job2.id).unwrap(), 1);
}

// ============================================================================
// Gate Tests
// ============================================================================

#[test]
fn test_record_if_absent_twice() {
    let (_temp_dir, db) = create_test_db();
    let job = db.create_job().unwrap();
    let url = "https://example.org/wiki/Idaho";

    assert!(db.record_if_absent(url, "Idaho", &job.id).unwrap());
    assert!(!db.record_if_absent(url, "Idaho", &job.id).unwrap());

    assert_eq!(db.count_links_for_job(&job.id).unwrap(), 1);
    let record = db.lookup(url).unwrap().unwrap();
    assert_eq!(record.title, "Idaho");
    assert_eq!(record.job_id, job.id);
}

#[test]
fn test_record_if_absent_generates_ids() {
    let (_temp_dir, db) = create_test_db();
    let job = db.create_job().unwrap();

    db.record_if_absent("https://example.org/wiki/A", "A", &job.id).unwrap();
    db.record_if_absent("https://example.org/wiki/B", "B", &job.id).unwrap();

    let a = db.lookup("https://example.org/wiki/A").unwrap().unwrap();
    let b = db.lookup("https://example.org/wiki/B").unwrap().unwrap();
    assert!(!a.id.is_empty());
    assert_ne!(a.id, b.id);
}

#[test]
fn test_record_keeps_first_job() {
    let (_temp_dir, db) = create_test_db();
    let job1 = db.create_job().unwrap();
    let job2 = db.create_job().unwrap();
    let url = "https://example.org/wiki/Idaho";

    assert!(db.record_if_absent(url, "Idaho", &job1.id).unwrap());
    assert!(!db.record_if_absent(url, "Idaho", &job2.id).unwrap());
    assert_eq!(db.lookup(url).unwrap().unwrap().job_id, job1.id);
}

#[test]
fn test_concurrent_records_create_one_row() {
    let (_temp_dir, db) = create_test_db();
    let db = Arc::new(db);
    let job = db.create_job().unwrap();
    let url = "https://example.org/wiki/Contested";

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db = db.clone();
            let job_id = job.id.clone();
            std::thread::spawn(move || {
                db.record_if_absent(url, &format!("Source {i}"), &job_id)
                    .unwrap()
            })
        })
        .collect();

    let created: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap() as usize)
        .sum();

    assert_eq!(created, 1);
    assert_eq!(db.count_links_for_job(&job.id).unwrap(), 1);
}
