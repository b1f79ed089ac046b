use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{debug, info};
use std::time::Duration;

use super::types::EmailServerCfg;
use crate::errors::PipelineError;

/// One alert email: the job posting plus its generated cover letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEmail<'a> {
    pub recipient: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub link: &'a str,
    pub cover_letter: &'a str,
}

impl AlertEmail<'_> {
    pub fn subject(&self) -> String {
        format!("New Job Alert: {}", self.title)
    }

    pub fn body(&self) -> String {
        format!(
            "Job Title: {}\n\nDescription: {}\n\nApply here: {}\n\nSuggested Cover Letter:\n\n{}",
            self.title, self.description, self.link, self.cover_letter
        )
    }

    fn to_message(&self, from: &Mailbox) -> Result<Message, PipelineError> {
        let to: Mailbox = self
            .recipient
            .parse()
            .map_err(|e| PipelineError::Notify(format!("Invalid to address: {e}")))?;

        Message::builder()
            .from(from.clone())
            .to(to)
            .subject(self.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(self.body())
            .map_err(|e| PipelineError::Notify(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &AlertEmail<'_>) -> Result<(), PipelineError>;
}

/// Sends alert emails through one configured SMTP relay.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(cfg: &EmailServerCfg, timeout: Duration) -> Result<Self, PipelineError> {
        let from: Mailbox = cfg
            .from_email
            .parse()
            .map_err(|e| PipelineError::Notify(format!("Invalid from address: {e}")))?;

        // 465 is implicit TLS, everything else negotiates STARTTLS
        let builder = if cfg.port == 465 {
            SmtpTransport::relay(&cfg.host)
        } else {
            SmtpTransport::starttls_relay(&cfg.host)
        }
        .map_err(|e| PipelineError::Notify(format!("Failed to create SMTP relay: {e}")))?;

        let transport = builder
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .timeout(Some(timeout))
            .build();

        debug!("Configured SMTP relay {}:{}", cfg.host, cfg.port);
        Ok(SmtpNotifier { transport, from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, email: &AlertEmail<'_>) -> Result<(), PipelineError> {
        let message = email.to_message(&self.from)?;
        let transport = self.transport.clone();

        // lettre's SmtpTransport blocks
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| PipelineError::Notify(format!("Email task failed: {e}")))?
            .map_err(|e| PipelineError::Notify(e.to_string()))?;

        info!("Email alert sent to {} for job: {}", email.recipient, email.title);
        Ok(())
    }
}
