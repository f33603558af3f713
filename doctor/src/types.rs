//! Core type definitions for Timescale Doctor.
//!
//! - [`Row`] is one result row of a rule query, every value in text format
//! - [`Finding`] is the atomic unit of check output
//! - [`RuleFailure`] records a rule whose query or template failed
//! - [`CategoryReport`] groups findings and failures under one category
//! - [`RunReport`] is the aggregate result of one pass over the registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single result row, as an ordered list of `(column, value)` pairs.
///
/// Values are kept in PostgreSQL text format. `None` is SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Option<String>)>,
}

impl Row {
    /// Create an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append of a non-null column.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, Some(value.into()));
        self
    }

    /// Builder-style append of a `NULL` column.
    #[must_use]
    pub fn with_null(mut self, name: impl Into<String>) -> Self {
        self.push(name, None);
        self
    }

    /// Append a column. Lookups return the first column with a given name.
    pub fn push(&mut self, name: impl Into<String>, value: Option<String>) {
        self.columns.push((name.into(), value));
    }

    /// Look up a column by exact, case-sensitive name.
    ///
    /// The outer `Option` is `None` when the column is absent; the inner one
    /// is `None` when the column is present but `NULL`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value.as_deref())
    }

    /// Column names in result order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Option<String>)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Option<String>)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// One rendered message produced by a rule for one result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Category the producing rule belongs to.
    pub category: String,
    /// Name of the producing rule.
    pub rule: String,
    /// The rendered message template.
    pub message: String,
}

/// A rule that could not produce findings because its query or its
/// template failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub category: String,
    pub rule: String,
    /// Human-readable reason, taken from the underlying error.
    pub reason: String,
}

/// Everything one category contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: String,
    pub findings: Vec<Finding>,
    pub failures: Vec<RuleFailure>,
}

impl CategoryReport {
    #[must_use]
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            findings: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Whether the category has nothing to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty() && self.failures.is_empty()
    }
}

/// Aggregate result of running every registered rule once.
///
/// Only categories with at least one finding or failure are listed, in
/// registration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Non-empty categories, in registration order.
    pub categories: Vec<CategoryReport>,

    /// Rules whose query was executed successfully.
    pub rules_run: u32,

    /// Rules skipped because an extension precondition was not met.
    pub rules_skipped: u32,

    /// Rules left out by the `select`/`exclude` configuration.
    pub rules_deselected: u32,

    /// Rules whose query or template failed.
    pub rules_failed: u32,

    /// Total number of findings across all categories.
    pub total_findings: u32,

    /// Wall-clock milliseconds elapsed for the whole pass.
    pub elapsed_ms: u64,

    /// When the pass started.
    pub generated_at: DateTime<Utc>,
}

impl RunReport {
    #[must_use]
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            categories: Vec::new(),
            rules_run: 0,
            rules_skipped: 0,
            rules_deselected: 0,
            rules_failed: 0,
            total_findings: 0,
            elapsed_ms: 0,
            generated_at,
        }
    }

    /// All findings, flattened in output order.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.categories.iter().flat_map(|c| c.findings.iter())
    }

    /// All failures, flattened in output order.
    pub fn failures(&self) -> impl Iterator<Item = &RuleFailure> {
        self.categories.iter().flat_map(|c| c.failures.iter())
    }
}

/// How much of each rule `--list` shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ShowLevel {
    /// Qualified name and one-line description.
    #[default]
    Brief,
    /// Brief plus the message template.
    Message,
    /// Message plus the detail and hint templates.
    Details,
}

impl std::fmt::Display for ShowLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Brief => write!(f, "brief"),
            Self::Message => write!(f, "message"),
            Self::Details => write!(f, "details"),
        }
    }
}
