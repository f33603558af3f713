//! Rule registry.
//!
//! Rules are grouped by category. Both categories and the rules inside them
//! keep registration order, which is also the order the runner reports in.
//! Registering a rule whose `(category, name)` already exists replaces the
//! earlier rule in place.
//!
//! The registry for a run is built once by [`build_registry`] from the static
//! rule catalogue in [`crate::rules`] and is not modified afterwards.

use crate::config::{compile_pattern, ConfigError};
use crate::rule::{Rule, RuleDefinition, RuleError};

/// One category and its rules, in registration order.
#[derive(Debug, Clone)]
struct Category {
    name: String,
    rules: Vec<Rule>,
}

/// Ordered catalogue of rules grouped by category.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    categories: Vec<Category>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `definition` and add it to the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::MissingField`] if the definition lacks a query
    /// or a message.
    pub fn register(&mut self, definition: RuleDefinition) -> Result<&Rule, RuleError> {
        let rule = definition.build()?;

        let cat_idx = match self
            .categories
            .iter()
            .position(|c| c.name == rule.category())
        {
            Some(idx) => idx,
            None => {
                self.categories.push(Category {
                    name: rule.category().to_owned(),
                    rules: Vec::new(),
                });
                self.categories.len() - 1
            }
        };

        let category = &mut self.categories[cat_idx];
        let slot = match category.rules.iter().position(|r| r.name() == rule.name()) {
            Some(pos) => {
                log::debug!("replacing previously registered rule {}", rule.qualified_name());
                category.rules[pos] = rule;
                pos
            }
            None => {
                category.rules.push(rule);
                category.rules.len() - 1
            }
        };

        Ok(&category.rules[slot])
    }

    /// Categories and their rules, in registration order.
    pub fn categories(&self) -> impl Iterator<Item = (&str, &[Rule])> {
        self.categories
            .iter()
            .map(|c| (c.name.as_str(), c.rules.as_slice()))
    }

    /// Every rule, in reporting order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.categories.iter().flat_map(|c| c.rules.iter())
    }

    /// Look up a rule by identity.
    #[must_use]
    pub fn get(&self, category: &str, name: &str) -> Option<&Rule> {
        self.categories
            .iter()
            .find(|c| c.name == category)
            .and_then(|c| c.rules.iter().find(|r| r.name() == name))
    }

    /// Rules whose `category.name` matches the glob `pattern`.
    ///
    /// A bare category name selects the whole category. The iterator is lazy
    /// and yields `(category, name, rule)` in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if `pattern` is not a valid glob.
    pub fn list<'a>(
        &'a self,
        pattern: &str,
    ) -> Result<impl Iterator<Item = (&'a str, &'a str, &'a Rule)> + 'a, ConfigError> {
        let matcher = compile_pattern(pattern)?.compile_matcher();
        Ok(self
            .rules()
            .filter(move |rule| matcher.is_match(rule.qualified_name()))
            .map(|rule| (rule.category(), rule.name(), rule)))
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.rules.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the registry containing every rule in the catalogue.
///
/// # Errors
///
/// Returns [`RuleError::MissingField`] if a catalogue entry is incomplete.
pub fn build_registry() -> Result<Registry, RuleError> {
    let mut registry = Registry::new();
    crate::rules::register_all(&mut registry)?;
    log::debug!("registered {} rules", registry.len());
    Ok(registry)
}
