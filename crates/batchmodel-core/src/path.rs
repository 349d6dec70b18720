//! Property paths.
//!
//! A path addresses one property of an entity: either a root property
//! (`guid_property`) or a property of an owned sub-object
//! (`embedded.address`). Owned objects nest one level at most, so a path
//! never has more than two segments.

use std::sync::OnceLock;

use regex::Regex;

const PATH_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$";

fn path_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(PATH_PATTERN) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(error = %e, "property path pattern failed to compile");
                None
            }
        })
        .as_ref()
}

/// Check that `path` is one or two dot-separated identifiers.
pub fn is_valid_path(path: &str) -> bool {
    match path_regex() {
        Some(regex) => regex.is_match(path),
        None => !path.is_empty(),
    }
}

/// Join a parent path and a property name.
pub fn join_path(parents: &[&str], name: &str) -> String {
    if parents.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parents.join("."), name)
    }
}

/// Split a path into its owner segment (if any) and the property name.
pub fn split_path(path: &str) -> (Option<&str>, &str) {
    match path.split_once('.') {
        Some((owner, name)) => (Some(owner), name),
        None => (None, path),
    }
}
