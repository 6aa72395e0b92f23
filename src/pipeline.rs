use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::matcher::{MatchOutcome, Matcher};
use crate::notify::Notifier;
use crate::record;
use crate::search::PageSource;
use crate::seen::{SeenSet, SeenStore};

/// A record that passed the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub id: String,
    pub title: String,
    pub url: String,
    pub codes: Vec<String>,
    pub keyword_hit: bool,
    pub code_hit: bool,
}

impl MatchResult {
    pub fn new(id: String, record: &Value, codes: Vec<String>, outcome: &MatchOutcome) -> Self {
        Self {
            id,
            title: record::display_title(record),
            url: record::best_url(record).unwrap_or_default(),
            codes,
            keyword_hit: outcome.keyword,
            code_hit: outcome.code,
        }
    }

    pub fn codes_display(&self) -> String {
        if self.codes.is_empty() {
            "None".to_string()
        } else {
            self.codes.join(", ")
        }
    }
}

/// Run-time overrides of the seen-set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    /// Every match counts as new; the store is not consulted.
    pub ignore_seen: bool,
    /// Report every match, new or not. Nothing is persisted.
    pub force_all: bool,
    /// Never notify, never persist.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_pages: u32,
    pub page_delay: Duration,
    pub mode: RunMode,
    pub summary_limit: usize,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_pages: settings.api.max_pages,
            page_delay: Duration::from_millis(settings.api.page_delay_ms),
            mode: RunMode {
                ignore_seen: settings.run.ignore_seen,
                force_all: settings.run.force_all,
                dry_run: settings.run.dry_run,
            },
            summary_limit: settings.run.summary_limit,
        }
    }
}

/// Counters and matches from one pass.
#[derive(Debug, Default)]
pub struct RunReport {
    pub pages_fetched: u32,
    pub failed_pages: u32,
    pub items_scanned: usize,
    pub skipped: usize,
    pub all_matches: Vec<MatchResult>,
    pub new_matches: Vec<MatchResult>,
    pub notified: usize,
    pub persisted: bool,
}

/// One scan: fetch pages until an empty page or the page cap, match, split
/// new from seen, report, then persist once.
pub struct Pipeline<'a, S, N> {
    source: &'a S,
    matcher: &'a Matcher,
    store: &'a dyn SeenStore,
    notifier: &'a N,
    options: PipelineOptions,
}

impl<'a, S: PageSource, N: Notifier> Pipeline<'a, S, N> {
    pub fn new(
        source: &'a S,
        matcher: &'a Matcher,
        store: &'a dyn SeenStore,
        notifier: &'a N,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            matcher,
            store,
            notifier,
            options,
        }
    }

    pub async fn run(&self) -> Result<RunReport> {
        let mode = self.options.mode;
        let loaded = self.store.load();
        info!("Loaded {} seen ids from {}", loaded.len(), self.store.describe());

        let mut report = RunReport::default();
        let mut matched_ids = HashSet::new();

        // ── Fetch + match ──
        for page in 1..=self.options.max_pages {
            if page > 1 && !self.options.page_delay.is_zero() {
                tokio::time::sleep(self.options.page_delay).await;
            }

            let items = match self.source.fetch_page(page).await {
                Ok(items) => items,
                Err(e) => {
                    warn!("Page {} failed, skipping: {}", page, e);
                    report.failed_pages += 1;
                    continue;
                }
            };
            report.pages_fetched += 1;
            info!("PAGE {}: items={}", page, items.len());
            if items.is_empty() {
                break;
            }

            for item in &items {
                report.items_scanned += 1;
                self.classify(item, &loaded, &mut matched_ids, &mut report);
            }
        }

        self.log_summary(&report);

        // ── Report ──
        let outgoing: &[MatchResult] = if mode.force_all {
            &report.all_matches
        } else {
            &report.new_matches
        };
        if outgoing.is_empty() {
            if mode.force_all {
                info!("No matches, no email");
            } else {
                info!("No new matches (everything already seen)");
            }
            return Ok(report);
        }
        if mode.dry_run {
            info!("Dry run: not notifying {} matches, state unchanged", outgoing.len());
            return Ok(report);
        }

        self.notifier.notify(outgoing).await?;
        let notified = outgoing.len();
        report.notified = notified;

        // ── Persist ──
        if !mode.force_all {
            let mut next = loaded;
            for m in &report.new_matches {
                next.record(m.id.clone());
            }
            self.store.save(&next)?;
            report.persisted = true;
            info!("Recorded {} new ids ({} total)", report.new_matches.len(), next.len());
        }

        Ok(report)
    }

    fn classify(
        &self,
        item: &Value,
        seen: &SeenSet,
        matched_ids: &mut HashSet<String>,
        report: &mut RunReport,
    ) {
        let Some(id) = record::identifier(item) else {
            debug!("Skipping record without id/reference/url");
            report.skipped += 1;
            return;
        };

        let codes = self.matcher.extract_codes(item);
        let outcome = self.matcher.evaluate_parts(&record::search_blob(item), &codes);
        if !outcome.is_match() {
            return;
        }
        // the API repeats notices across pages when sorting ties
        if !matched_ids.insert(id.clone()) {
            debug!("Duplicate match {} within this run", id);
            return;
        }

        let result = MatchResult::new(id, item, codes, &outcome);
        if self.options.mode.ignore_seen || !seen.contains(&result.id) {
            report.new_matches.push(result.clone());
        }
        report.all_matches.push(result);
    }

    fn log_summary(&self, report: &RunReport) {
        if report.failed_pages > 0 {
            warn!("{} page(s) failed during this run", report.failed_pages);
        }
        if report.all_matches.is_empty() {
            info!("TOTAL MATCHES: 0 (no keyword/CPV hits in the scanned window)");
            return;
        }

        info!(
            "TOTAL MATCHES: {} ({} new) from {} items on {} pages",
            report.all_matches.len(),
            report.new_matches.len(),
            report.items_scanned,
            report.pages_fetched
        );
        let limit = self.options.summary_limit;
        for m in report.all_matches.iter().take(limit) {
            info!(
                "- {} | CPV: {} | kw={} cpv_hit={} | {}",
                m.title,
                m.codes_display(),
                m.keyword_hit,
                m.code_hit,
                m.url
            );
        }
        if report.all_matches.len() > limit {
            info!("... printed first {} of {} matches", limit, report.all_matches.len());
        }
    }
}
