use super::user::User;
use crate::schema::*;
use diesel::{
    backend::Backend,
    deserialize::{self, FromSql, FromSqlRow},
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
    serialize::{self, Output, ToSql},
    sql_types::Integer,
    AsExpression,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, Associations, PartialEq)]
#[diesel(belongs_to(User))]
#[diesel(table_name = job_alerts)]
pub struct JobAlert {
    pub id: i32,
    /// id of the entry in the user's feed
    pub job_id: String,
    pub title: String,
    pub description: String,
    pub link: String,
    pub user_id: i32,
    pub status: AlertStatus,
    pub created_at: i64,
}

/// Delivery state of an alert. A record is written as `Pending` before any
/// email goes out and moves to one of the other states afterwards.
#[repr(i32)]
#[derive(Debug, Serialize, Deserialize, AsExpression, Clone, Copy, FromSqlRow, PartialEq, Eq)]
#[diesel(sql_type=Integer)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending = 0,
    Sent = 1,
    QuotaExceeded = 2,
    Failed = 3,
    /// Left pending by a run that stopped mid-send; the email may have gone out.
    Interrupted = 4,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Pending => write!(f, "pending"),
            AlertStatus::Sent => write!(f, "sent"),
            AlertStatus::QuotaExceeded => write!(f, "quota exceeded"),
            AlertStatus::Failed => write!(f, "failed"),
            AlertStatus::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl<DB> FromSql<Integer, DB> for AlertStatus
where
    DB: Backend,
    i32: FromSql<Integer, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
        match i32::from_sql(bytes)? {
            0 => Ok(AlertStatus::Pending),
            1 => Ok(AlertStatus::Sent),
            2 => Ok(AlertStatus::QuotaExceeded),
            3 => Ok(AlertStatus::Failed),
            4 => Ok(AlertStatus::Interrupted),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl<DB> ToSql<Integer, DB> for AlertStatus
where
    DB: Backend,
    i32: ToSql<Integer, DB>,
{
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, DB>) -> serialize::Result {
        match self {
            AlertStatus::Pending => 0.to_sql(out),
            AlertStatus::Sent => 1.to_sql(out),
            AlertStatus::QuotaExceeded => 2.to_sql(out),
            AlertStatus::Failed => 3.to_sql(out),
            AlertStatus::Interrupted => 4.to_sql(out),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_alerts)]
pub struct NewJobAlert<'a> {
    pub job_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub link: &'a str,
    pub user_id: i32,
    pub status: AlertStatus,
    pub created_at: i64,
}

/// Outcome of inserting an alert. `Duplicate` means another writer already
/// holds the (job_id, user_id) pair.
#[derive(Debug, PartialEq)]
pub enum AlertInsert {
    Inserted(JobAlert),
    Duplicate,
}

impl<'a> NewJobAlert<'a> {
    pub fn pending(
        job_id: &'a str,
        title: &'a str,
        description: &'a str,
        link: &'a str,
        user_id: i32,
        created_at: i64,
    ) -> Self {
        NewJobAlert {
            job_id,
            title,
            description,
            link,
            user_id,
            status: AlertStatus::Pending,
            created_at,
        }
    }

    pub fn insert(&self, conn: &mut SqliteConnection) -> Result<AlertInsert, DieselError> {
        use crate::schema::job_alerts::dsl::*;

        match diesel::insert_into(job_alerts)
            .values(self)
            .get_result::<JobAlert>(conn)
        {
            Ok(alert) => Ok(AlertInsert::Inserted(alert)),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                log::debug!(
                    "Alert for job {} already recorded for user_id={}",
                    self.job_id,
                    self.user_id
                );
                Ok(AlertInsert::Duplicate)
            }
            Err(e) => {
                log::warn!("Error inserting job alert: {e:?}");
                Err(e)
            }
        }
    }
}

impl JobAlert {
    pub fn exists(
        conn: &mut SqliteConnection,
        external_id: &str,
        owner_id: i32,
    ) -> Result<bool, DieselError> {
        use crate::schema::job_alerts::dsl::*;
        diesel::select(diesel::dsl::exists(
            job_alerts
                .filter(job_id.eq(external_id))
                .filter(user_id.eq(owner_id)),
        ))
        .get_result(conn)
    }

    /// Counts the user's alerts created at or after `since` (unix seconds),
    /// leaving out `excluding` when given. Failed alerts never reached the
    /// user and are not counted.
    pub fn count_created_since(
        conn: &mut SqliteConnection,
        owner_id: i32,
        since: i64,
        excluding: Option<i32>,
    ) -> Result<i64, DieselError> {
        use crate::schema::job_alerts::dsl::*;
        let mut query = job_alerts
            .filter(user_id.eq(owner_id))
            .filter(created_at.ge(since))
            .filter(status.ne(AlertStatus::Failed))
            .into_boxed::<diesel::sqlite::Sqlite>();
        if let Some(skip_id) = excluding {
            query = query.filter(id.ne(skip_id));
        }
        query.count().get_result(conn)
    }

    pub fn set_status(
        conn: &mut SqliteConnection,
        alert_id: i32,
        new_status: AlertStatus,
    ) -> Result<JobAlert, DieselError> {
        use crate::schema::job_alerts::dsl::*;
        diesel::update(job_alerts.find(alert_id))
            .set(status.eq(new_status))
            .get_result(conn)
    }

    /// Most recent alerts across all users, newest first, paired with the
    /// owner's email.
    pub fn recent(
        conn: &mut SqliteConnection,
        limit: i64,
    ) -> Result<Vec<(JobAlert, String)>, DieselError> {
        job_alerts::table
            .inner_join(users::table)
            .order((job_alerts::created_at.desc(), job_alerts::id.desc()))
            .limit(limit)
            .select((JobAlert::as_select(), users::email))
            .load(conn)
    }

    /// Alerts still pending that were created before `before`. These mark a
    /// run that stopped between recording an alert and finishing its send.
    pub fn stale_pending(
        conn: &mut SqliteConnection,
        before: i64,
    ) -> Result<Vec<JobAlert>, DieselError> {
        use crate::schema::job_alerts::dsl::*;
        job_alerts
            .filter(status.eq(AlertStatus::Pending))
            .filter(created_at.lt(before))
            .order(created_at.asc())
            .load(conn)
    }

    pub fn get_by_user(
        conn: &mut SqliteConnection,
        owner_id: i32,
    ) -> Result<Vec<JobAlert>, DieselError> {
        use crate::schema::job_alerts::dsl::*;
        job_alerts
            .filter(user_id.eq(owner_id))
            .order(id.asc())
            .load(conn)
    }

    pub fn created_at_display(&self) -> String {
        chrono::DateTime::from_timestamp(self.created_at, 0)
            .unwrap_or_default()
            .format("%Y-%m-%d %H:%M UTC")
            .to_string()
    }
}
