use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::cover_letter::{LlmCfg, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::tasks::email_sender::types::{EmailServerCfg, DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT};
use crate::tasks::types::{Timeouts, CHECK_INTERVAL};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub public_path: String,
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub poll_interval: Duration,
    pub timeouts: Timeouts,
    pub smtp: EmailServerCfg,
    pub llm: LlmCfg,
}

impl AppConfig {
    /// Reads the `JA_*` variables (plus `OPENAI_API_KEY`). Call after
    /// `dotenvy::dotenv()` so a `.env` file is honored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let public_path = get("JA_PUBLIC_PATH").unwrap_or_else(|| "./static".to_string());
        let db_path = get("JA_DATABASE_URL").unwrap_or_else(|| "./jobalert.db".to_string());
        let host = get("JA_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&get, "JA_PORT", 8080u16)?;
        let workers = parse_or(&get, "JA_WORKERS", 4usize)?;

        let poll_interval = secs_or(&get, "JA_POLL_INTERVAL_SECS", CHECK_INTERVAL)?;

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            feed: secs_or(&get, "JA_FEED_TIMEOUT_SECS", defaults.feed)?,
            generation: secs_or(&get, "JA_LLM_TIMEOUT_SECS", defaults.generation)?,
            send: secs_or(&get, "JA_SMTP_TIMEOUT_SECS", defaults.send)?,
        };

        let username = get("JA_SMTP_USERNAME").ok_or(ConfigError::Missing("JA_SMTP_USERNAME"))?;
        let smtp = EmailServerCfg {
            host: get("JA_SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            port: parse_or(&get, "JA_SMTP_PORT", DEFAULT_SMTP_PORT)?,
            password: get("JA_SMTP_PASSWORD").ok_or(ConfigError::Missing("JA_SMTP_PASSWORD"))?,
            from_email: get("JA_FROM_EMAIL").unwrap_or_else(|| username.clone()),
            username,
        };

        let llm = LlmCfg {
            api_key: get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?,
            base_url: get("JA_LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("JA_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        Ok(AppConfig {
            public_path,
            db_path,
            host,
            port,
            workers,
            poll_interval,
            timeouts,
            smtp,
            llm,
        })
    }

    pub fn log_summary(&self) {
        log::info!("Using database at {}", self.db_path);
        log::info!("Serving static files from {}", self.public_path);
        log::info!(
            "Polling feeds every {}s (timeouts: feed {}s, llm {}s, smtp {}s)",
            self.poll_interval.as_secs(),
            self.timeouts.feed.as_secs(),
            self.timeouts.generation.as_secs(),
            self.timeouts.send.as_secs()
        );
        log::info!("Sending mail via {}:{} as {}", self.smtp.host, self.smtp.port, self.smtp.from_email);
        log::info!("Generating cover letters with {} at {}", self.llm.model, self.llm.base_url);
    }
}

fn parse_or<F, T>(get: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(var) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

/// Whole seconds; zero is rejected since every use is an interval or deadline.
fn secs_or<F>(get: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(get, var, default.as_secs())? {
        0 => Err(ConfigError::Invalid {
            var,
            value: "0".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}
