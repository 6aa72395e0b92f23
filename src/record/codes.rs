use serde_json::Value;

use super::normalize::flatten_value;

/// Field names that may carry CPV-style classification codes, in lookup order.
pub const DEFAULT_CODE_FIELDS: &[&str] = &["cpv", "cpvCode", "cpvCodes", "mainCpv", "cpvMain", "codes"];

/// Collect codes from `fields` at the top level of the record, then from its
/// `metadata` object. Every value is reduced to its digits; values with no
/// digits are dropped. Discovery order and duplicates are kept.
pub fn extract_codes_from<S: AsRef<str>>(record: &Value, fields: &[S]) -> Vec<String> {
    let mut raw = Vec::new();
    collect_candidates(record, fields, &mut raw);
    if let Some(metadata) = record.get("metadata").filter(|m| m.is_object()) {
        collect_candidates(metadata, fields, &mut raw);
    }

    raw.iter()
        .map(|s| digits_only(s))
        .filter(|d| !d.is_empty())
        .collect()
}

fn collect_candidates<S: AsRef<str>>(container: &Value, fields: &[S], out: &mut Vec<String>) {
    for field in fields {
        match container.get(field.as_ref()) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => out.extend(items.iter().map(flatten_value)),
            Some(other) => out.push(flatten_value(other)),
        }
    }
}

pub fn digits_only(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// True when any code starts with any of the prefixes. No codes never matches.
pub fn any_prefix_match<C: AsRef<str>, P: AsRef<str>>(codes: &[C], prefixes: &[P]) -> bool {
    codes.iter().any(|code| {
        prefixes
            .iter()
            .any(|p| !p.as_ref().is_empty() && code.as_ref().starts_with(p.as_ref()))
    })
}
