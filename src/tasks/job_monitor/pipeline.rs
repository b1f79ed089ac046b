use chrono::Utc;
use diesel::SqliteConnection;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::{feed_reader::FeedEntry, quota};
use crate::{
    context::AppContext,
    errors::{with_timeout, PipelineError},
    models::{
        job_alert::{AlertInsert, AlertStatus, JobAlert, NewJobAlert},
        user::User,
    },
    tasks::email_sender::delivery::AlertEmail,
};

/// Pending alerts older than this are reported as interrupted sends.
const STALE_PENDING_SECS: i64 = 60 * 60;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// users with a feed that were polled
    pub users: usize,
    pub feed_errors: usize,
    pub user_errors: usize,
    pub entries_seen: usize,
    pub duplicates: usize,
    pub sent: usize,
    pub quota_skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Duplicate,
    Sent,
    QuotaExceeded,
    Failed,
}

/// Polls every user's feed once and alerts on entries not seen before.
///
/// Users are processed one after another. A failure while handling one user
/// is logged and the run moves on to the next user; only failing to reach
/// the store at all fails the run.
pub async fn run_once(ctx: &AppContext) -> Result<RunSummary, PipelineError> {
    let mut conn = ctx.pool.get()?;
    report_stale_pending(&mut conn);

    let users = User::get_all(&mut conn)?;
    let mut summary = RunSummary::default();

    for user in &users {
        if !user.has_feed() {
            debug!(user_id = user.id, "No feed configured, skipping");
            continue;
        }
        summary.users += 1;

        let span = info_span!("user", user_id = user.id, email = %user.email);
        match process_user(ctx, &mut conn, user, &mut summary)
            .instrument(span)
            .await
        {
            Ok(()) => {}
            Err(e @ (PipelineError::Feed(_) | PipelineError::Timeout { .. })) => {
                summary.feed_errors += 1;
                warn!(user_id = user.id, feed_url = %user.rss_feed_url, error = %e, "Skipping user, feed unavailable");
            }
            Err(e) => {
                summary.user_errors += 1;
                error!(user_id = user.id, error = %e, "Aborted processing for user");
            }
        }
    }

    info!(
        users = summary.users,
        entries_seen = summary.entries_seen,
        duplicates = summary.duplicates,
        sent = summary.sent,
        quota_skipped = summary.quota_skipped,
        failed = summary.failed,
        feed_errors = summary.feed_errors,
        user_errors = summary.user_errors,
        "Job poll completed"
    );
    Ok(summary)
}

async fn process_user(
    ctx: &AppContext,
    conn: &mut SqliteConnection,
    user: &User,
    summary: &mut RunSummary,
) -> Result<(), PipelineError> {
    let entries = with_timeout(
        "feed fetch",
        ctx.timeouts.feed,
        ctx.feeds.fetch(&user.rss_feed_url),
    )
    .await?;

    for entry in entries {
        summary.entries_seen += 1;
        match process_entry(ctx, conn, user, &entry).await? {
            EntryOutcome::Duplicate => summary.duplicates += 1,
            EntryOutcome::Sent => summary.sent += 1,
            EntryOutcome::QuotaExceeded => summary.quota_skipped += 1,
            EntryOutcome::Failed => summary.failed += 1,
        }
    }
    Ok(())
}

/// Handles one feed entry for one user.
///
/// The alert is committed as pending before anything external happens, so
/// a crash mid-send leaves a record that blocks a second send. Generation
/// and delivery failures only fail this entry; store errors are returned.
async fn process_entry(
    ctx: &AppContext,
    conn: &mut SqliteConnection,
    user: &User,
    entry: &FeedEntry,
) -> Result<EntryOutcome, PipelineError> {
    if JobAlert::exists(conn, &entry.id, user.id)? {
        return Ok(EntryOutcome::Duplicate);
    }

    let now = Utc::now();
    let new_alert = NewJobAlert::pending(
        &entry.id,
        &entry.title,
        &entry.description,
        &entry.link,
        user.id,
        now.timestamp(),
    );
    let alert = match new_alert.insert(conn)? {
        AlertInsert::Inserted(alert) => alert,
        AlertInsert::Duplicate => {
            info!(job_id = %entry.id, "Alert recorded by another run, skipping");
            return Ok(EntryOutcome::Duplicate);
        }
    };

    let cover_letter = match with_timeout(
        "cover letter generation",
        ctx.timeouts.generation,
        ctx.generator.generate(&entry.title, &entry.description),
    )
    .await
    {
        Ok(text) => text,
        Err(e) => {
            error!(job_id = %entry.id, error = %e, "Cover letter generation failed");
            JobAlert::set_status(conn, alert.id, AlertStatus::Failed)?;
            return Ok(EntryOutcome::Failed);
        }
    };

    let decision = quota::check(conn, user, Some(alert.id), now)?;
    if !decision.admitted() {
        info!(
            job_id = %entry.id,
            limit = user.daily_email_limit,
            today = decision.sent_today(),
            "Daily email limit reached for user: {}",
            user.email
        );
        JobAlert::set_status(conn, alert.id, AlertStatus::QuotaExceeded)?;
        return Ok(EntryOutcome::QuotaExceeded);
    }

    let email = AlertEmail {
        recipient: &user.email,
        title: &alert.title,
        description: &alert.description,
        link: &alert.link,
        cover_letter: &cover_letter,
    };
    match with_timeout("email send", ctx.timeouts.send, ctx.notifier.send(&email)).await {
        Ok(()) => {
            JobAlert::set_status(conn, alert.id, AlertStatus::Sent)?;
            info!(job_id = %entry.id, title = %alert.title, "Job alert sent");
            Ok(EntryOutcome::Sent)
        }
        Err(e) => {
            error!(job_id = %entry.id, error = %e, "Failed to send job alert");
            JobAlert::set_status(conn, alert.id, AlertStatus::Failed)?;
            Ok(EntryOutcome::Failed)
        }
    }
}

/// Reports alerts a previous run left pending and moves them to
/// `Interrupted` so each is reported once. They are never resent.
fn report_stale_pending(conn: &mut SqliteConnection) {
    let cutoff = Utc::now().timestamp() - STALE_PENDING_SECS;
    let stale = match JobAlert::stale_pending(conn, cutoff) {
        Ok(stale) => stale,
        Err(e) => {
            warn!(error = %e, "Could not check for pending alerts");
            return;
        }
    };

    for alert in stale {
        warn!(
            alert_id = alert.id,
            job_id = %alert.job_id,
            user_id = alert.user_id,
            "Alert left pending by an interrupted run; it will not be resent"
        );
        if let Err(e) = JobAlert::set_status(conn, alert.id, AlertStatus::Interrupted) {
            warn!(alert_id = alert.id, error = %e, "Could not mark alert as interrupted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::RunQueryDsl;
    use crate::models::user::UserSettings;
    use crate::test_helpers::{create_test_db, entry, FakeGenerator, RecordingNotifier, StaticFeeds};
    use std::sync::Arc;

    const FEED: &str = "https://jobs.example.com/rss";

    fn ctx_with(
        pool: crate::DbPool,
        feeds: StaticFeeds,
        generator: Arc<FakeGenerator>,
        notifier: Arc<RecordingNotifier>,
    ) -> AppContext {
        AppContext::new(
            pool,
            Arc::new(feeds),
            generator,
            notifier,
            Default::default(),
        )
    }

    fn add_user(pool: &crate::DbPool, email: &str, url: &str, limit: i32) -> User {
        let mut conn = pool.get().unwrap();
        User::upsert_settings(&mut conn, &UserSettings::new(email, url, limit)).unwrap()
    }

    #[actix_rt::test]
    async fn test_limit_one_sends_first_and_records_both() {
        let (_dir, pool) = create_test_db();
        let user = add_user(&pool, "a@example.com", FEED, 1);
        let feeds = StaticFeeds::default().with(FEED, vec![entry("e1", "First"), entry("e2", "Second")]);
        let generator = Arc::new(FakeGenerator::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ctx_with(pool.clone(), feeds, generator.clone(), notifier.clone());

        let summary = run_once(&ctx).await.unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.quota_skipped, 1);
        assert_eq!(generator.calls(), 2);
        assert_eq!(notifier.sent(), vec![("a@example.com".to_string(), "First".to_string())]);

        let mut conn = pool.get().unwrap();
        let alerts = JobAlert::get_by_user(&mut conn, user.id).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].status, AlertStatus::Sent);
        assert_eq!(alerts[1].status, AlertStatus::QuotaExceeded);
    }

    #[actix_rt::test]
    async fn test_more_entries_than_limit() {
        let (_dir, pool) = create_test_db();
        let user = add_user(&pool, "a@example.com", FEED, 3);
        let entries = (0..5).map(|i| entry(&format!("e{i}"), &format!("Job {i}"))).collect();
        let feeds = StaticFeeds::default().with(FEED, entries);
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ctx_with(pool.clone(), feeds, Arc::new(FakeGenerator::default()), notifier.clone());

        let summary = run_once(&ctx).await.unwrap();

        assert_eq!(summary.sent, 3);
        assert_eq!(summary.quota_skipped, 2);
        let titles: Vec<String> = notifier.sent().into_iter().map(|(_, t)| t).collect();
        assert_eq!(titles, vec!["Job 0", "Job 1", "Job 2"]);
        let mut conn = pool.get().unwrap();
        assert_eq!(JobAlert::get_by_user(&mut conn, user.id).unwrap().len(), 5);
    }

    #[actix_rt::test]
    async fn test_second_poll_is_idempotent() {
        let (_dir, pool) = create_test_db();
        let user = add_user(&pool, "a@example.com", FEED, 10);
        let feeds = StaticFeeds::default().with(FEED, vec![entry("e1", "First"), entry("e2", "Second")]);
        let generator = Arc::new(FakeGenerator::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ctx_with(pool.clone(), feeds, generator.clone(), notifier.clone());

        let first = run_once(&ctx).await.unwrap();
        let second = run_once(&ctx).await.unwrap();

        assert_eq!(first.sent, 2);
        assert_eq!(second.sent, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(generator.calls(), 2);
        assert_eq!(notifier.sent().len(), 2);
        let mut conn = pool.get().unwrap();
        assert_eq!(JobAlert::get_by_user(&mut conn, user.id).unwrap().len(), 2);
    }

    #[actix_rt::test]
    async fn test_user_without_feed_is_not_fetched() {
        let (_dir, pool) = create_test_db();
        add_user(&pool, "nofeed@example.com", "", 3);
        let feeds = StaticFeeds::default();
        let fetches = feeds.fetch_counter();
        let ctx = ctx_with(
            pool,
            feeds,
            Arc::new(FakeGenerator::default()),
            Arc::new(RecordingNotifier::default()),
        );

        let summary = run_once(&ctx).await.unwrap();

        assert_eq!(summary.users, 0);
        assert_eq!(fetches.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn test_bad_feed_does_not_block_other_users() {
        let (_dir, pool) = create_test_db();
        add_user(&pool, "broken@example.com", "https://broken.example.com/rss", 3);
        add_user(&pool, "ok@example.com", FEED, 3);
        let feeds = StaticFeeds::default().with(FEED, vec![entry("e1", "First")]);
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ctx_with(pool, feeds, Arc::new(FakeGenerator::default()), notifier.clone());

        let summary = run_once(&ctx).await.unwrap();

        assert_eq!(summary.feed_errors, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(notifier.sent()[0].0, "ok@example.com");
    }

    #[actix_rt::test]
    async fn test_generation_failure_only_fails_that_entry() {
        let (_dir, pool) = create_test_db();
        let user = add_user(&pool, "a@example.com", FEED, 5);
        let feeds = StaticFeeds::default().with(FEED, vec![entry("e1", "Broken"), entry("e2", "Fine")]);
        let generator = Arc::new(FakeGenerator::failing_on("Broken"));
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ctx_with(pool.clone(), feeds, generator, notifier.clone());

        let summary = run_once(&ctx).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.sent, 1);
        let mut conn = pool.get().unwrap();
        let alerts = JobAlert::get_by_user(&mut conn, user.id).unwrap();
        assert_eq!(alerts[0].status, AlertStatus::Failed);
        assert_eq!(alerts[1].status, AlertStatus::Sent);
    }

    #[actix_rt::test]
    async fn test_failed_entry_does_not_use_up_daily_limit() {
        let (_dir, pool) = create_test_db();
        let user = add_user(&pool, "a@example.com", FEED, 1);
        let feeds = StaticFeeds::default().with(FEED, vec![entry("e1", "Broken"), entry("e2", "Fine")]);
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ctx_with(
            pool.clone(),
            feeds,
            Arc::new(FakeGenerator::failing_on("Broken")),
            notifier.clone(),
        );

        let summary = run_once(&ctx).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.quota_skipped, 0);
        assert_eq!(notifier.sent(), vec![("a@example.com".to_string(), "Fine".to_string())]);
        let mut conn = pool.get().unwrap();
        let alerts = JobAlert::get_by_user(&mut conn, user.id).unwrap();
        assert_eq!(alerts[0].status, AlertStatus::Failed);
        assert_eq!(alerts[1].status, AlertStatus::Sent);
    }

    #[actix_rt::test]
    async fn test_send_failure_marks_failed_and_is_not_retried() {
        let (_dir, pool) = create_test_db();
        let user = add_user(&pool, "a@example.com", FEED, 5);
        let feeds = StaticFeeds::default().with(FEED, vec![entry("e1", "First")]);
        let notifier = Arc::new(RecordingNotifier::failing());
        let ctx = ctx_with(pool.clone(), feeds, Arc::new(FakeGenerator::default()), notifier.clone());

        let first = run_once(&ctx).await.unwrap();
        let second = run_once(&ctx).await.unwrap();

        assert_eq!(first.failed, 1);
        assert_eq!(second.duplicates, 1);
        assert_eq!(notifier.attempts(), 1);
        let mut conn = pool.get().unwrap();
        let alerts = JobAlert::get_by_user(&mut conn, user.id).unwrap();
        assert_eq!(alerts[0].status, AlertStatus::Failed);
    }

    #[actix_rt::test]
    async fn test_entry_recorded_elsewhere_is_skipped() {
        let (_dir, pool) = create_test_db();
        let user = add_user(&pool, "a@example.com", FEED, 5);
        {
            let mut conn = pool.get().unwrap();
            NewJobAlert::pending("e1", "First", "", "", user.id, Utc::now().timestamp())
                .insert(&mut conn)
                .unwrap();
        }
        let feeds = StaticFeeds::default().with(FEED, vec![entry("e1", "First")]);
        let generator = Arc::new(FakeGenerator::default());
        let ctx = ctx_with(pool, feeds, generator.clone(), Arc::new(RecordingNotifier::default()));

        let summary = run_once(&ctx).await.unwrap();

        assert_eq!(summary.duplicates, 1);
        assert_eq!(generator.calls(), 0);
    }

    #[actix_rt::test]
    async fn test_insert_lost_to_another_writer_is_skipped() {
        let (_dir, pool) = create_test_db();
        add_user(&pool, "a@example.com", FEED, 5);
        {
            // Another writer records the pair between the existence check
            // and our insert.
            let mut conn = pool.get().unwrap();
            diesel::sql_query(
                "CREATE TRIGGER concurrent_writer BEFORE INSERT ON job_alerts \
                 WHEN NEW.job_id = 'e1' BEGIN \
                 INSERT INTO job_alerts (job_id, title, description, link, user_id, status, created_at) \
                 VALUES (NEW.job_id, 'other run', '', '', NEW.user_id, 1, NEW.created_at); \
                 END",
            )
            .execute(&mut conn)
            .unwrap();
        }
        let feeds = StaticFeeds::default().with(FEED, vec![entry("e1", "First")]);
        let generator = Arc::new(FakeGenerator::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ctx_with(pool, feeds, generator.clone(), notifier.clone());

        let summary = run_once(&ctx).await.unwrap();

        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.user_errors, 0);
        assert_eq!(generator.calls(), 0);
        assert_eq!(notifier.attempts(), 0);
    }

    #[actix_rt::test]
    async fn test_stale_pending_is_reported_once_and_not_resent() {
        let (_dir, pool) = create_test_db();
        let user = add_user(&pool, "a@example.com", FEED, 5);
        let two_hours_ago = Utc::now().timestamp() - 2 * 60 * 60;
        {
            let mut conn = pool.get().unwrap();
            NewJobAlert::pending("e1", "First", "", "", user.id, two_hours_ago)
                .insert(&mut conn)
                .unwrap();
        }
        let feeds = StaticFeeds::default().with(FEED, vec![entry("e1", "First")]);
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ctx_with(pool.clone(), feeds, Arc::new(FakeGenerator::default()), notifier.clone());

        let summary = run_once(&ctx).await.unwrap();

        assert_eq!(summary.duplicates, 1);
        assert_eq!(notifier.attempts(), 0);
        let mut conn = pool.get().unwrap();
        let alerts = JobAlert::get_by_user(&mut conn, user.id).unwrap();
        assert_eq!(alerts[0].status, AlertStatus::Interrupted);
        assert!(JobAlert::stale_pending(&mut conn, Utc::now().timestamp()).unwrap().is_empty());
    }
}
