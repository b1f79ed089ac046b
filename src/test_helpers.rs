use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::MigrationHarness;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::cover_letter::CoverLetterGenerator;
use crate::errors::PipelineError;
use crate::tasks::email_sender::delivery::{AlertEmail, Notifier};
use crate::tasks::job_monitor::feed_reader::{FeedEntries, FeedEntry, FeedSource};
use crate::{DbPool, MIGRATIONS};

/// Create a test database with a temporary file
pub fn create_test_db() -> (TempDir, DbPool) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let manager = ConnectionManager::<SqliteConnection>::new(db_path.display().to_string());
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create pool");

    let mut conn = pool.get().expect("Failed to get connection");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run migrations");

    (temp_dir, pool)
}

/// Create an in-memory test database connection
pub fn get_test_db_connection() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:")
        .unwrap_or_else(|_| panic!("Error connecting to in-memory SQLite database"));

    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run migrations");
    conn
}

pub fn entry(id: &str, title: &str) -> FeedEntry {
    FeedEntry {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("Description of {title}"),
        link: format!("https://jobs.example.com/{id}"),
    }
}

/// Serves fixed entries per URL; unknown URLs fail like an unreachable feed.
#[derive(Default)]
pub struct StaticFeeds {
    feeds: HashMap<String, Vec<FeedEntry>>,
    fetches: Arc<AtomicUsize>,
}

impl StaticFeeds {
    pub fn with(mut self, url: &str, entries: Vec<FeedEntry>) -> Self {
        self.feeds.insert(url.to_string(), entries);
        self
    }

    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        self.fetches.clone()
    }
}

#[async_trait]
impl FeedSource for StaticFeeds {
    async fn fetch(&self, url: &str) -> Result<FeedEntries, PipelineError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.feeds
            .get(url)
            .cloned()
            .map(FeedEntries::from)
            .ok_or_else(|| PipelineError::Feed(format!("{url} unreachable")))
    }
}

#[derive(Default)]
pub struct FakeGenerator {
    calls: AtomicUsize,
    fail_on: Option<String>,
}

impl FakeGenerator {
    pub fn failing_on(title: &str) -> Self {
        FakeGenerator {
            fail_on: Some(title.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoverLetterGenerator for FakeGenerator {
    async fn generate(&self, title: &str, _description: &str) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(title) {
            return Err(PipelineError::Generation("model unavailable".into()));
        }
        Ok(format!("Cover letter for {title}"))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        RecordingNotifier {
            fail: true,
            ..Default::default()
        }
    }

    /// (recipient, title) of every delivered email, in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: &AlertEmail<'_>) -> Result<(), PipelineError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::Notify("connection refused".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((email.recipient.to_string(), email.title.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(QueryableByName)]
    struct TestResult {
        #[diesel(sql_type = diesel::sql_types::Integer)]
        test: i32,
    }

    #[test]
    fn test_create_test_db() {
        let (_temp_dir, pool) = create_test_db();
        let mut conn = pool.get().expect("Failed to get connection");

        let result: i32 = diesel::sql_query("SELECT 1 as test")
            .get_result::<TestResult>(&mut conn)
            .map(|r| r.test)
            .expect("Failed to query test database");

        assert_eq!(result, 1);
    }

    #[test]
    fn test_migrations_create_empty_tables() {
        use crate::schema::{job_alerts, users};
        let mut conn = get_test_db_connection();

        let user_count: i64 = users::table.count().first(&mut conn).unwrap();
        let alert_count: i64 = job_alerts::table.count().first(&mut conn).unwrap();
        assert_eq!(user_count, 0);
        assert_eq!(alert_count, 0);
    }
}
