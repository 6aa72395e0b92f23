use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ApiSettings;
use crate::error::{Result, WatchError};

/// One page of raw records, numbered from 1.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch_page(&self, page: u32) -> Result<Vec<Value>>;
}

/// Where a response keeps its record list. Tried in `RESULT_SHAPES` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// The body itself is the list.
    Bare,
    /// `{ "<key>": [...] }`
    TopLevel(&'static str),
    /// `{ "<wrapper>": { "<key>": [...] } }`
    Nested {
        wrapper: &'static str,
        key: &'static str,
    },
}

pub const RESULT_SHAPES: &[ResultShape] = &[
    ResultShape::TopLevel("results"),
    ResultShape::TopLevel("hits"),
    ResultShape::TopLevel("items"),
    ResultShape::TopLevel("data"),
    ResultShape::Nested { wrapper: "resultList", key: "results" },
    ResultShape::Nested { wrapper: "resultList", key: "hits" },
    ResultShape::Nested { wrapper: "resultList", key: "items" },
    ResultShape::Nested { wrapper: "hits", key: "hits" },
    ResultShape::Bare,
];

impl ResultShape {
    fn locate_mut<'a>(&self, body: &'a mut Value) -> Option<&'a mut Vec<Value>> {
        match self {
            ResultShape::Bare => body.as_array_mut(),
            ResultShape::TopLevel(key) => body.get_mut(*key)?.as_array_mut(),
            ResultShape::Nested { wrapper, key } => body.get_mut(*wrapper)?.get_mut(*key)?.as_array_mut(),
        }
    }
}

/// Pull the record list out of a response body. The first shape holding a
/// non-empty list wins; no match is an empty page.
pub fn extract_items(mut body: Value) -> Vec<Value> {
    for shape in RESULT_SHAPES {
        if let Some(items) = shape.locate_mut(&mut body) {
            if !items.is_empty() {
                debug!("Response shape {:?} with {} items", shape, items.len());
                return std::mem::take(items);
            }
        }
    }
    Vec::new()
}

/// Search body: type/status terms must match, and any one date field must fall
/// inside the last `days_back` days.
pub fn build_query(settings: &ApiSettings) -> Value {
    let mut must = Vec::new();
    if !settings.types.is_empty() {
        must.push(json!({ "terms": { "type": settings.types } }));
    }
    if !settings.statuses.is_empty() {
        must.push(json!({ "terms": { "status": settings.statuses } }));
    }

    let window = format!("now-{}d/d", settings.days_back);
    let should: Vec<Value> = settings
        .date_fields
        .iter()
        .map(|field| json!({ "range": { field.as_str(): { "gte": window, "lte": "now" } } }))
        .collect();

    let mut bool_query = json!({ "must": must });
    if !should.is_empty() {
        bool_query["should"] = Value::Array(should);
        bool_query["minimum_should_match"] = json!(1);
    }

    json!({
        "query": { "bool": bool_query },
        "sort": [{ "field": settings.sort_field, "order": "DESC" }],
    })
}

pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(2u64.saturating_pow(attempt)))
}

fn is_retryable(err: &WatchError) -> bool {
    match err {
        WatchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        WatchError::Status { status, .. } => *status == 429 || (500..=599).contains(status),
        _ => false,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

/// HTTP client for the search endpoint. Retries transient failures with
/// exponential backoff before giving up on a page.
pub struct SearchClient {
    http: reqwest::Client,
    settings: ApiSettings,
}

impl SearchClient {
    pub fn new(settings: ApiSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { http, settings })
    }

    fn query_params(&self, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("apiKey", self.settings.api_key.clone()),
            ("text", self.settings.text.clone()),
            ("pageSize", self.settings.page_size.to_string()),
            ("pageNumber", page.to_string()),
        ]
    }

    async fn post_once(&self, page: u32) -> Result<Value> {
        let response = self
            .http
            .post(&self.settings.url)
            .query(&self.query_params(page))
            .json(&build_query(&self.settings))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }
        Ok(response.json::<Value>().await?)
    }

    async fn post_with_retry(&self, page: u32) -> Result<Value> {
        let label = format!("Page {}", page);
        with_retry(self.settings.max_retries, self.settings.backoff_ms, &label, |_| {
            self.post_once(page)
        })
        .await
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or has been
/// retried `max_retries` times. `op` receives the zero-based attempt number.
pub async fn with_retry<T, F, Fut>(max_retries: u32, backoff_ms: u64, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && attempt < max_retries => {
                let backoff = backoff_delay(backoff_ms, attempt);
                warn!(
                    "{} failed: {} (attempt {}/{}), backing off {:.1}s",
                    label,
                    e,
                    attempt + 1,
                    max_retries,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

impl PageSource for SearchClient {
    async fn fetch_page(&self, page: u32) -> Result<Vec<Value>> {
        let body = self.post_with_retry(page).await?;
        Ok(extract_items(body))
    }
}
