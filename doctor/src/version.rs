//! Extension version comparison.
//!
//! `pg_extension.extversion` is free-form text. Versions are compared by their
//! leading dotted numeric part, component by component, so `2.10` is newer
//! than `2.9`. Missing components count as zero and any suffix after the
//! numeric part (`-dev`, `-rc1`) is ignored.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

fn numeric_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*v?(\d+(?:\.\d+)*)").expect("version regex is valid"))
}

/// Parse the numeric components of a version string.
///
/// Returns an empty vector when the string has no leading number.
#[must_use]
pub fn components(version: &str) -> Vec<u64> {
    numeric_prefix()
        .captures(version)
        .and_then(|cap| cap.get(1))
        .map(|m| {
            m.as_str()
                .split('.')
                .map(|part| part.parse::<u64>().unwrap_or(u64::MAX))
                .collect()
        })
        .unwrap_or_default()
}

/// Compare two version strings numerically.
#[must_use]
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = components(left);
    let right = components(right);
    let len = left.len().max(right.len());

    for idx in 0..len {
        let l = left.get(idx).copied().unwrap_or(0);
        let r = right.get(idx).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Whether `installed` is at least `required`.
#[must_use]
pub fn satisfies(installed: &str, required: &str) -> bool {
    compare_versions(installed, required) != Ordering::Less
}
