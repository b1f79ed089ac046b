use crate::schema::*;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Daily email cap applied when a user never set one.
pub const DEFAULT_DAILY_EMAIL_LIMIT: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, PartialEq)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub email: String,
    /// empty if the user has no subscription
    pub rss_feed_url: String,
    pub daily_email_limit: i32,
    pub created_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    email: &'a str,
    rss_feed_url: &'a str,
    daily_email_limit: i32,
    created_at: i64,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = users)]
struct SettingsChangeset<'a> {
    rss_feed_url: &'a str,
    daily_email_limit: i32,
}

/// What the settings form submits. The email identifies the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSettings {
    pub email: String,
    pub rss_feed_url: String,
    pub daily_email_limit: i32,
}

impl UserSettings {
    pub fn new(email: &str, rss_feed_url: &str, daily_email_limit: i32) -> Self {
        UserSettings {
            email: email.trim().to_lowercase(),
            rss_feed_url: rss_feed_url.trim().to_string(),
            daily_email_limit,
        }
    }
}

#[derive(Error, Debug)]
pub enum UserTableError {
    #[error("User with email '{0}' not found")]
    UserNotFound(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

impl User {
    pub fn has_feed(&self) -> bool {
        !self.rss_feed_url.trim().is_empty()
    }

    /// Creates the user if the email is new, otherwise updates the feed URL
    /// and limit in place. One row per email either way.
    pub fn upsert_settings(
        conn: &mut SqliteConnection,
        settings: &UserSettings,
    ) -> Result<User, UserTableError> {
        use crate::schema::users::dsl::*;

        let new_user = NewUser {
            email: &settings.email,
            rss_feed_url: &settings.rss_feed_url,
            daily_email_limit: settings.daily_email_limit,
            created_at: chrono::Utc::now().timestamp(),
        };
        let changes = SettingsChangeset {
            rss_feed_url: &settings.rss_feed_url,
            daily_email_limit: settings.daily_email_limit,
        };

        log::info!("Saving settings for {}", settings.email);
        diesel::insert_into(users)
            .values(&new_user)
            .on_conflict(email)
            .do_update()
            .set(&changes)
            .get_result::<User>(conn)
            .map_err(|err| {
                log::error!("Failed to save settings for {}: {:?}", settings.email, err);
                UserTableError::DatabaseError(err)
            })
    }

    pub fn get_by_email(
        conn: &mut SqliteConnection,
        user_email: &str,
    ) -> Result<User, UserTableError> {
        use crate::schema::users::dsl::*;
        let user_email = user_email.trim().to_lowercase();
        users
            .filter(email.eq(&user_email))
            .first::<User>(conn)
            .optional()?
            .ok_or(UserTableError::UserNotFound(user_email))
    }

    pub fn get_all(conn: &mut SqliteConnection) -> Result<Vec<User>, UserTableError> {
        use crate::schema::users::dsl::*;
        log::debug!("Getting all users");
        users.order(id.asc()).load::<User>(conn).map_err(|err| {
            log::error!("Failed to get users: {:?}", err);
            UserTableError::DatabaseError(err)
        })
    }
}
