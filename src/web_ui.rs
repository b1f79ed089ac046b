use actix_web::{get, post, web, HttpResponse};
use askama::Template;
use serde::Deserialize;

use crate::{
    errors::{AppError, AppResult},
    models::{
        job_alert::JobAlert,
        user::{User, UserSettings, DEFAULT_DAILY_EMAIL_LIMIT},
    },
    RqDbPool,
};

/// Number of alerts shown on the alerts page.
const RECENT_ALERTS: i64 = 10;

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate;

#[derive(Template)]
#[template(path = "settings.html")]
struct SettingsTemplate {
    flash: Option<Flash>,
    default_limit: i32,
}

struct Flash {
    kind: &'static str,
    message: &'static str,
}

#[derive(Template)]
#[template(path = "alerts.html")]
struct AlertsTemplate {
    alerts: Vec<AlertRow>,
}

struct AlertRow {
    title: String,
    description: String,
    /// Empty unless the feed supplied an http(s) URL.
    link: String,
    email: String,
    status: String,
    created: String,
}

impl From<(JobAlert, String)> for AlertRow {
    fn from((alert, email): (JobAlert, String)) -> Self {
        AlertRow {
            created: alert.created_at_display(),
            status: alert.status.to_string(),
            title: alert.title,
            description: alert.description,
            link: web_link(&alert.link).unwrap_or_default(),
            email,
        }
    }
}

#[derive(Deserialize)]
struct SettingsQuery {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub rss_feed_url: String,
    #[serde(default)]
    pub daily_email_limit: String,
}

impl SettingsForm {
    /// Checks the submitted fields. An empty feed URL is allowed and pauses
    /// alerts for the user; an empty limit means the default.
    pub fn validate(&self) -> AppResult<UserSettings> {
        let email = self.email.trim();
        if email.parse::<lettre::Address>().is_err() {
            return Err(AppError::invalid_input("email", "not a valid email address"));
        }

        let feed_url = self.rss_feed_url.trim();
        if !feed_url.is_empty() {
            match url::Url::parse(feed_url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => {
                    return Err(AppError::invalid_input(
                        "rss_feed_url",
                        "must be an http(s) URL",
                    ))
                }
            }
        }

        let limit = self.daily_email_limit.trim();
        let daily_email_limit = if limit.is_empty() {
            DEFAULT_DAILY_EMAIL_LIMIT
        } else {
            match limit.parse::<i32>() {
                Ok(n) if n >= 0 => n,
                _ => {
                    return Err(AppError::invalid_input(
                        "daily_email_limit",
                        "must be a whole number of zero or more",
                    ))
                }
            }
        };

        Ok(UserSettings::new(email, feed_url, daily_email_limit))
    }
}

/// Feed links are untrusted; only http(s) URLs become anchors.
fn web_link(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header(("Location", location))
        .finish()
}

#[get("/")]
pub async fn home() -> AppResult<HttpResponse> {
    Ok(html(HomeTemplate.render()?))
}

#[get("/settings")]
pub async fn settings_form(query: web::Query<SettingsQuery>) -> AppResult<HttpResponse> {
    let flash = match query.status.as_deref() {
        Some("saved") => Some(Flash {
            kind: "success",
            message: "Settings updated successfully!",
        }),
        Some("error") => Some(Flash {
            kind: "error",
            message: "Settings could not be saved. Check the email, feed URL and limit.",
        }),
        _ => None,
    };
    let template = SettingsTemplate {
        flash,
        default_limit: DEFAULT_DAILY_EMAIL_LIMIT,
    };
    Ok(html(template.render()?))
}

#[post("/settings")]
pub async fn settings_submit(
    pool: RqDbPool,
    form: web::Form<SettingsForm>,
) -> AppResult<HttpResponse> {
    let settings = match form.validate() {
        Ok(settings) => settings,
        Err(e) => {
            log::info!("Rejected settings update: {e}");
            return Ok(redirect("/settings?status=error"));
        }
    };

    let mut conn = pool.get()?;
    match User::upsert_settings(&mut conn, &settings) {
        Ok(user) => {
            log::info!("Settings saved for user_id={}", user.id);
            Ok(redirect("/settings?status=saved"))
        }
        Err(e) => {
            log::error!("Failed to save settings: {e}");
            Ok(redirect("/settings?status=error"))
        }
    }
}

#[get("/alerts")]
pub async fn alerts(pool: RqDbPool) -> AppResult<HttpResponse> {
    let mut conn = pool.get()?;
    let alerts = JobAlert::recent(&mut conn, RECENT_ALERTS)?
        .into_iter()
        .map(AlertRow::from)
        .collect();
    Ok(html(AlertsTemplate { alerts }.render()?))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(home)
        .service(settings_form)
        .service(settings_submit)
        .service(alerts);
}
