use chrono::{DateTime, NaiveTime, Utc};
use diesel::SqliteConnection;

use crate::models::{job_alert::JobAlert, user::User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Admit { sent_today: i64 },
    Reject { sent_today: i64 },
}

impl QuotaDecision {
    pub fn admitted(&self) -> bool {
        matches!(self, QuotaDecision::Admit { .. })
    }

    pub fn sent_today(&self) -> i64 {
        match self {
            QuotaDecision::Admit { sent_today } | QuotaDecision::Reject { sent_today } => *sent_today,
        }
    }
}

/// Unix timestamp of 00:00 UTC on the day of `now`.
pub fn start_of_utc_day(now: DateTime<Utc>) -> i64 {
    now.date_naive().and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Decides whether `user` may receive one more alert today.
///
/// Counts the user's alerts recorded since the start of the current UTC day,
/// leaving out `candidate` (the alert being decided on). Call it once per
/// alert; the count is never cached, so earlier admits in the same run are
/// seen by later entries.
pub fn check(
    conn: &mut SqliteConnection,
    user: &User,
    candidate: Option<i32>,
    now: DateTime<Utc>,
) -> Result<QuotaDecision, diesel::result::Error> {
    let since = start_of_utc_day(now);
    let sent_today = JobAlert::count_created_since(conn, user.id, since, candidate)?;

    if sent_today < i64::from(user.daily_email_limit) {
        Ok(QuotaDecision::Admit { sent_today })
    } else {
        Ok(QuotaDecision::Reject { sent_today })
    }
}
