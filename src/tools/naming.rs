//! Tool name generation
//!
//! Names look like `portal_<category>_<operation>`: the category is the last
//! literal path segment and the operation is the `operationId` with
//! generator decorations (`UsingGET_1`, `Controller`) removed. Names are at
//! most 64 characters of `[a-z0-9_]`.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::spec::HttpMethod;

/// Fixed prefix of every derived tool name
pub const TOOL_NAME_PREFIX: &str = "portal_";

/// Longest tool name MCP clients accept
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// Built-in tool that lists the derived tools without touching the network
///
/// Derived tools never take this name.
pub const DISCOVERY_TOOL: &str = "portal_discover_tools";

/// Category used when a path has no literal segment
pub const DEFAULT_CATEGORY: &str = "geral";

/// Category characters kept when a name has to be shortened
const TRUNCATED_CATEGORY_LEN: usize = 12;

/// Hex digits of the disambiguation suffix
const SUFFIX_HEX_LEN: usize = 6;

/// Longest suffix tried; leaves room for the prefix and the separator
const MAX_SUFFIX_HEX_LEN: usize = MAX_TOOL_NAME_LEN - TOOL_NAME_PREFIX.len() - 1;

/// Strip generator decorations and lower-case an `operationId`
#[must_use]
pub fn clean_operation_id(operation_id: &str) -> String {
    static DECORATION_RE: OnceLock<Regex> = OnceLock::new();
    static CONTROLLER_RE: OnceLock<Regex> = OnceLock::new();

    #[allow(clippy::unwrap_used)]
    let decoration =
        DECORATION_RE.get_or_init(|| Regex::new(r"(?i)Using(?:GET|POST|PUT|DELETE)\d*").unwrap());
    #[allow(clippy::unwrap_used)]
    let controller = CONTROLLER_RE.get_or_init(|| Regex::new(r"(?i)Controller").unwrap());

    let stripped = decoration.replace_all(operation_id, "");
    controller.replace_all(&stripped, "").to_lowercase()
}

/// Last path segment that is neither empty nor a `{placeholder}`
#[must_use]
pub fn category(path: &str) -> &str {
    path.split('/')
        .filter(|part| !part.is_empty() && !part.starts_with('{'))
        .next_back()
        .unwrap_or(DEFAULT_CATEGORY)
}

/// Replace every character outside `[a-z0-9_]` with `_`
#[must_use]
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derive the tool name for an operation
///
/// Deterministic but not unique: distinct operations can map to the same
/// name, see [`disambiguate`].
#[must_use]
pub fn tool_name(operation_id: &str, path: &str) -> String {
    let cleaned = clean_operation_id(operation_id);
    let category = category(path);

    let name = sanitize(&format!("{TOOL_NAME_PREFIX}{category}_{cleaned}"));
    if name.chars().count() <= MAX_TOOL_NAME_LEN {
        return name;
    }

    let category_part = take_chars(category, TRUNCATED_CATEGORY_LEN);
    let available = MAX_TOOL_NAME_LEN
        - TOOL_NAME_PREFIX.len()
        - category_part.chars().count()
        - 1;
    let operation_part = take_chars(&cleaned, available);

    let name = sanitize(&format!("{TOOL_NAME_PREFIX}{category_part}_{operation_part}"));
    take_chars(&name, MAX_TOOL_NAME_LEN).to_string()
}

/// Make `base` unique by appending a short hash of the operation's route
///
/// `taken` reports whether a candidate is already in use. The suffix grows
/// until a free name is found; the result still respects the length bound.
#[must_use]
pub fn disambiguate(
    base: &str,
    method: HttpMethod,
    path: &str,
    taken: impl Fn(&str) -> bool,
) -> String {
    let digest = hex::encode(Sha256::digest(format!("{method} {path}").as_bytes()));

    let mut hex_len = SUFFIX_HEX_LEN;
    loop {
        let suffix = &digest[..hex_len.min(digest.len())];
        let keep = MAX_TOOL_NAME_LEN.saturating_sub(suffix.len() + 1);
        let candidate = format!("{}_{suffix}", take_chars(base, keep));
        if !taken(&candidate) || hex_len >= MAX_SUFFIX_HEX_LEN.min(digest.len()) {
            return candidate;
        }
        hex_len += 2;
    }
}

fn take_chars(s: &str, n: usize) -> &str {
    s.char_indices().nth(n).map_or(s, |(idx, _)| &s[..idx])
}
