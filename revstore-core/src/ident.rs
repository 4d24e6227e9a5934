//! Identifier generation and name validation
//!
//! Tags, namespace names and table suffixes share a restricted character set
//! so they can travel through URLs and, in the case of suffixes, be embedded
//! in SQL table names.

use uuid::Uuid;

use crate::error::{Error, Result};

/// Length of the physical table suffixes minted for new namespaces.
pub const SUFFIX_LEN: usize = 6;

/// Returns true when `name` contains only allowed characters.
///
/// Allowed: ASCII letters and digits plus `: + - _ / ~ #`. The empty string
/// is valid.
pub fn is_valid_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '+' | '-' | '_' | '/' | '~' | '#'))
}

/// Returns true when `suffix` is exactly [`SUFFIX_LEN`] lowercase
/// alphanumeric characters.
///
/// Suffixes are interpolated into table names, so anything else must be
/// rejected before it reaches SQL.
pub fn is_valid_suffix(suffix: &str) -> bool {
    suffix.len() == SUFFIX_LEN
        && suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Generate a new globally unique object identifier.
pub fn new_object_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a new globally unique revision identifier.
pub fn new_revision_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a candidate table suffix: short, lowercase alphanumeric.
///
/// Callers must retry against the mapping table on collision.
pub fn new_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string()
}

/// Parse a raw tag parameter into a validated list.
///
/// Accepts either a comma-separated string (`"a,b"`) or a JSON array string
/// (`"[\"a\",\"b\"]"`). Single-quoted arrays from lax clients are accepted by
/// a quote-normalizing retry after a strict parse fails. Every element must
/// pass [`is_valid_name`].
///
/// Returns `None` when no tags were supplied.
pub fn parse_tag_list(raw: Option<&str>) -> Result<Option<Vec<String>>> {
    let raw = match raw {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(None),
    };

    let tags: Vec<String> = if raw.starts_with('[') && raw.ends_with(']') {
        match serde_json::from_str(raw) {
            Ok(tags) => tags,
            Err(_) => serde_json::from_str(&raw.replace('\'', "\"")).map_err(|_| {
                Error::InvalidArgument(format!("unable to parse tag list: {}", raw))
            })?,
        }
    } else {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    };

    for tag in &tags {
        if !is_valid_name(tag) {
            return Err(Error::InvalidArgument(format!("invalid tag: {}", tag)));
        }
    }

    Ok(Some(tags))
}
