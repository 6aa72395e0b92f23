use std::time::Duration;

use chrono::{NaiveDate, Utc};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::EmailSettings;
use crate::error::{Result, WatchError};
use crate::pipeline::MatchResult;

/// Receives the matches chosen for reporting, at most once per run.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn notify(&self, matches: &[MatchResult]) -> Result<()>;
}

pub fn subject(prefix: &str, count: usize, date: NaiveDate) -> String {
    format!("{}: {} ({})", prefix, count, date.format("%Y-%m-%d"))
}

/// Plain-text digest: title, codes, url per match, blank line between.
pub fn digest_body(matches: &[MatchResult]) -> String {
    matches
        .iter()
        .map(|m| format!("{}\nCPV: {}\n{}\n", m.title, m.codes_display(), m.url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One plain-text email over SMTP STARTTLS. Without recipients it only logs.
pub struct EmailNotifier {
    settings: EmailSettings,
}

impl EmailNotifier {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    fn recipients(&self) -> Vec<&str> {
        self.settings
            .to
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn build_message(&self, matches: &[MatchResult], date: NaiveDate) -> Result<Message> {
        let from_raw = if self.settings.from.trim().is_empty() {
            self.settings.smtp_user.trim()
        } else {
            self.settings.from.trim()
        };
        let from: Mailbox = parse_mailbox(from_raw)?;

        let mut builder = Message::builder()
            .from(from)
            .subject(subject(&self.settings.subject_prefix, matches.len(), date))
            .header(ContentType::TEXT_PLAIN);
        for to in self.recipients() {
            builder = builder.to(parse_mailbox(to)?);
        }
        builder
            .body(digest_body(matches))
            .map_err(|e| WatchError::Notify(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        if self.settings.smtp_host.trim().is_empty() {
            return Err(WatchError::Notify("SMTP host not configured".into()));
        }
        let builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(self.settings.smtp_host.trim())
            .map_err(|e| WatchError::Notify(e.to_string()))?
            .port(self.settings.smtp_port)
            .timeout(Some(Duration::from_secs(self.settings.timeout_secs)));
        let builder = if self.settings.smtp_user.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                self.settings.smtp_user.clone(),
                self.settings.smtp_pass.clone(),
            ))
        };
        Ok(builder.build())
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox> {
    raw.parse()
        .map_err(|e| WatchError::Notify(format!("invalid address '{}': {}", raw, e)))
}

impl Notifier for EmailNotifier {
    async fn notify(&self, matches: &[MatchResult]) -> Result<()> {
        let recipients = self.recipients();
        if recipients.is_empty() {
            info!("EMAIL_TO not set, skipping email ({} matches)", matches.len());
            return Ok(());
        }

        let message = self.build_message(matches, Utc::now().date_naive())?;
        self.transport()?
            .send(message)
            .await
            .map_err(|e| WatchError::Notify(e.to_string()))?;

        info!("Email sent to {} ({} items)", recipients.join(", "), matches.len());
        Ok(())
    }
}
