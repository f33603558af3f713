//! Rule definition and execution.
//!
//! A [`Rule`] is plain data: a query, message templates, and optional
//! extension-version preconditions. Rules are built through
//! [`RuleDefinition`], which fails fast when `query` or `message` is missing.
//!
//! The category of a rule defaults to the last segment of the Rust module it
//! is defined in. Use the [`rule_definition!`](crate::rule_definition) macro
//! so rule authors never spell the category by hand:
//!
//! ```
//! use timescale_doctor::rule_definition;
//!
//! let rule = rule_definition!("unused")
//!     .query("SELECT relname FROM pg_stat_user_tables WHERE false")
//!     .message("Table '{relname}' is unused.")
//!     .build()
//!     .unwrap();
//! assert_eq!(rule.name(), "unused");
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::connection::{quote_literal, Database, DbError};
use crate::template::{self, TemplateError};
use crate::version;

/// Start a [`RuleDefinition`] whose category is the enclosing module's name.
#[macro_export]
macro_rules! rule_definition {
    ($name:expr) => {
        $crate::rule::RuleDefinition::in_module(::std::module_path!(), $name)
    };
}

/// Errors raised while defining or executing a rule.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// A definition lacks `query` or `message`.
    #[error("rule '{rule}' does not define a {field}")]
    MissingField { rule: String, field: &'static str },

    /// The rule's query (or its extension lookup) failed.
    #[error("query failed: {0}")]
    Query(#[from] DbError),

    /// A template names a column the query did not return.
    #[error("template mismatch: {0}")]
    Template(#[from] TemplateError),
}

/// Category name for a module path: its last `::` segment.
#[must_use]
pub fn category_from_module_path(module_path: &str) -> &str {
    module_path.rsplit("::").next().unwrap_or(module_path)
}

/// Builder for a [`Rule`].
#[derive(Debug, Clone, Default)]
pub struct RuleDefinition {
    category: String,
    name: String,
    query: Option<String>,
    message: Option<String>,
    detail: Option<String>,
    hint: Option<String>,
    description: Option<String>,
    dependencies: BTreeMap<String, String>,
}

impl RuleDefinition {
    /// Start a definition with an explicit category.
    #[must_use]
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Start a definition whose category is derived from `module_path`.
    #[must_use]
    pub fn in_module(module_path: &str, name: impl Into<String>) -> Self {
        Self::new(category_from_module_path(module_path), name)
    }

    /// Override the derived category.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// One-line summary shown by `--list`.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Require `extension` to be installed at `min_version` or newer.
    #[must_use]
    pub fn depends_on(mut self, extension: impl Into<String>, min_version: impl Into<String>) -> Self {
        self.dependencies.insert(extension.into(), min_version.into());
        self
    }

    /// Validate and produce the rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::MissingField`] if `query` or `message` is unset.
    pub fn build(self) -> Result<Rule, RuleError> {
        let qualified = format!("{}.{}", self.category, self.name);
        let query = self.query.ok_or_else(|| RuleError::MissingField {
            rule: qualified.clone(),
            field: "query",
        })?;
        let message = self.message.ok_or(RuleError::MissingField {
            rule: qualified,
            field: "message",
        })?;

        Ok(Rule {
            category: self.category,
            name: self.name,
            query,
            message,
            detail: self.detail,
            hint: self.hint,
            description: self.description,
            dependencies: self.dependencies,
        })
    }
}

/// A registered check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    category: String,
    name: String,
    query: String,
    message: String,
    detail: Option<String>,
    hint: Option<String>,
    description: Option<String>,
    dependencies: BTreeMap<String, String>,
}

impl Rule {
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `category.name`, the key `--list` patterns match against.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.category, self.name)
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The detail template, or the message when none was given.
    #[must_use]
    pub fn detail(&self) -> &str {
        self.detail.as_deref().unwrap_or(&self.message)
    }

    /// The hint template, or the message when none was given.
    #[must_use]
    pub fn hint(&self) -> &str {
        self.hint.as_deref().unwrap_or(&self.message)
    }

    /// The explicit description, or the first non-blank line of the message.
    #[must_use]
    pub fn description(&self) -> &str {
        if let Some(ref description) = self.description {
            return description;
        }
        self.message
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("")
    }

    /// Required extensions and their minimum versions.
    #[must_use]
    pub fn dependencies(&self) -> &BTreeMap<String, String> {
        &self.dependencies
    }

    /// Installed versions of the extensions this rule depends on.
    ///
    /// Extensions that are not installed are absent from the map. No query
    /// is issued when the rule has no dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Query`] if the catalog lookup fails.
    pub fn get_versions(&self, db: &mut dyn Database) -> Result<HashMap<String, String>, RuleError> {
        if self.dependencies.is_empty() {
            return Ok(HashMap::new());
        }

        let names = self
            .dependencies
            .keys()
            .map(|name| quote_literal(name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT extname, extversion FROM pg_catalog.pg_extension WHERE extname IN ({names})"
        );

        let versions = db
            .query(&sql)?
            .into_iter()
            .filter_map(|row| {
                let name = row.get("extname").flatten()?.to_owned();
                let version = row.get("extversion").flatten()?.to_owned();
                Some((name, version))
            })
            .collect();
        Ok(versions)
    }

    /// Whether every dependency is installed at a sufficient version.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Query`] if the catalog lookup fails.
    pub fn is_applicable(&self, db: &mut dyn Database) -> Result<bool, RuleError> {
        if self.dependencies.is_empty() {
            return Ok(true);
        }

        let installed = self.get_versions(db)?;
        for (extension, required) in &self.dependencies {
            match installed.get(extension) {
                Some(found) if version::satisfies(found, required) => {}
                Some(found) => {
                    log::debug!(
                        "skipping {}: {extension} {found} is older than {required}",
                        self.qualified_name()
                    );
                    return Ok(false);
                }
                None => {
                    log::debug!(
                        "skipping {}: extension {extension} is not installed",
                        self.qualified_name()
                    );
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Run the rule and render its message once per result row.
    ///
    /// Returns nothing, without running the query, when the rule is not
    /// applicable.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Query`] if the query fails and
    /// [`RuleError::Template`] if a row lacks a referenced column.
    pub fn execute(&self, db: &mut dyn Database) -> Result<Vec<String>, RuleError> {
        self.execute_with(db, &self.message)
    }

    /// Like [`Rule::execute`], rendering `template` instead of the message.
    ///
    /// # Errors
    ///
    /// Same as [`Rule::execute`].
    pub fn execute_with(&self, db: &mut dyn Database, template: &str) -> Result<Vec<String>, RuleError> {
        if !self.is_applicable(db)? {
            return Ok(Vec::new());
        }
        self.execute_unchecked(db, template)
    }

    /// Run the query and render `template`, skipping the precondition check.
    ///
    /// # Errors
    ///
    /// Same as [`Rule::execute`].
    pub fn execute_unchecked(
        &self,
        db: &mut dyn Database,
        template: &str,
    ) -> Result<Vec<String>, RuleError> {
        let rows = db.query(&self.query)?;
        rows.iter()
            .map(|row| template::render(template, row).map_err(RuleError::from))
            .collect()
    }
}
