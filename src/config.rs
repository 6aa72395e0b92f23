use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::matcher::RuleSet;

pub const DEFAULT_CONFIG_FILE: &str = "tender_watch";
pub const ENV_PREFIX: &str = "TENDERS";

/// Effective settings: defaults, then the optional config file, then `TENDERS_*`
/// environment variables (`TENDERS_API__PAGE_SIZE=25`), then legacy variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub rules: RuleSet,
    pub state: StateSettings,
    pub email: EmailSettings,
    pub run: RunSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub url: String,
    pub api_key: String,
    /// Free-text filter sent as the `text` query parameter.
    pub text: String,
    pub page_size: u32,
    pub max_pages: u32,
    pub days_back: u32,
    /// `type` terms; "1" is procurement.
    pub types: Vec<String>,
    pub statuses: Vec<String>,
    /// Any of these date fields inside the window is enough.
    pub date_fields: Vec<String>,
    pub sort_field: String,
    pub page_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: "https://api.tech.ec.europa.eu/search-api/prod/rest/search".into(),
            api_key: "SEDIA".into(),
            text: "***".into(),
            page_size: 50,
            max_pages: 40,
            days_back: 90,
            types: vec!["1".into()],
            statuses: Vec::new(),
            date_fields: vec!["startDate".into(), "publicationDate".into()],
            sort_field: "startDate".into(),
            page_delay_ms: 250,
            timeout_secs: 45,
            max_retries: 6,
            backoff_ms: 1200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            path: PathBuf::from("sent_ids.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// Comma-separated recipients. Empty disables delivery.
    pub to: String,
    pub from: String,
    pub subject_prefix: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub timeout_secs: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            to: String::new(),
            from: String::new(),
            subject_prefix: "EU procurement matches".into(),
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_pass: String::new(),
            timeout_secs: 45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Treat every match as new for this run.
    pub ignore_seen: bool,
    /// Report every match, seen or not, and persist nothing.
    pub force_all: bool,
    /// Match and log only; no notification, no persistence.
    pub dry_run: bool,
    /// How many matches the end-of-run summary prints.
    pub summary_limit: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            ignore_seen: false,
            force_all: false,
            dry_run: false,
            summary_limit: 200,
        }
    }
}

impl Settings {
    /// Load from `path` (required) or `tender_watch.{toml,json,yaml}` in the
    /// working directory (optional), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let mut settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Variables the cron workflow already exports: run-mode flags and SMTP
    /// credentials. Flags only ever switch a mode on; SMTP values fill blanks.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("IGNORE_SEEN").is_some_and(|v| is_truthy(&v)) {
            self.run.ignore_seen = true;
        }
        if lookup("FORCE_EMAIL_ALL").is_some_and(|v| is_truthy(&v)) {
            self.run.force_all = true;
        }

        let email = &mut self.email;
        for (key, slot) in [
            ("EMAIL_TO", &mut email.to),
            ("EMAIL_FROM", &mut email.from),
            ("SMTP_HOST", &mut email.smtp_host),
            ("SMTP_USER", &mut email.smtp_user),
            ("SMTP_PASS", &mut email.smtp_pass),
        ] {
            if slot.trim().is_empty() {
                if let Some(v) = lookup(key) {
                    *slot = v.trim().to_string();
                }
            }
        }
        if let Some(port) = lookup("SMTP_PORT").and_then(|v| v.trim().parse().ok()) {
            email.smtp_port = port;
        }
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Settings {
        let mut copy = self.clone();
        if !copy.email.smtp_pass.is_empty() {
            copy.email.smtp_pass = "***".into();
        }
        copy
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
