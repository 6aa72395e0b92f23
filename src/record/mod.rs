pub mod codes;
pub mod normalize;

use serde_json::Value;

pub use codes::{any_prefix_match, extract_codes_from};
pub use normalize::{flatten, flatten_non_empty};

pub const NO_TITLE: &str = "(no title)";

// Title sources in priority order; the API leaves `title` empty on many notices.
const TITLE_PATHS: &[&[&str]] = &[
    &["title"],
    &["summary"],
    &["reference"],
    &["metadata", "callTitle"],
    &["metadata", "title"],
    &["metadata", "identifier"],
];

const URL_FIELDS: &[&str] = &["url", "link"];

/// Follow a key path through nested objects.
pub fn lookup_path<'a>(record: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(record, |cur, key| cur.get(*key))
}

/// Stable identifier: `id`, else `reference`, else the canonical URL.
pub fn identifier(record: &Value) -> Option<String> {
    flatten_non_empty(record.get("id"))
        .or_else(|| flatten_non_empty(record.get("reference")))
        .or_else(|| best_url(record))
}

pub fn best_title(record: &Value) -> Option<String> {
    TITLE_PATHS
        .iter()
        .find_map(|path| flatten_non_empty(lookup_path(record, path)))
}

pub fn display_title(record: &Value) -> String {
    best_title(record).unwrap_or_else(|| NO_TITLE.to_string())
}

/// First non-empty `url`/`link`, top level before `metadata`.
pub fn best_url(record: &Value) -> Option<String> {
    let top = URL_FIELDS
        .iter()
        .find_map(|k| flatten_non_empty(record.get(*k)));
    top.or_else(|| {
        let metadata = record.get("metadata").filter(|m| m.is_object())?;
        URL_FIELDS
            .iter()
            .find_map(|k| flatten_non_empty(metadata.get(*k)))
    })
}

/// Text searched by keyword rules: title, summary, content and flattened metadata.
pub fn search_blob(record: &Value) -> String {
    let parts = [
        best_title(record).unwrap_or_default(),
        flatten(record.get("summary")),
        flatten(record.get("content")),
        flatten(record.get("metadata")),
    ];
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}
