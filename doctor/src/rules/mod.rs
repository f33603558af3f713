//! The rule catalogue.
//!
//! Each submodule is one category; its rules take the category name from the
//! module through [`rule_definition!`](crate::rule_definition). A new category
//! is a new submodule plus one line in [`register_all`].

pub mod compression;
pub mod hypertable;
pub mod index;

use crate::registry::Registry;
use crate::rule::RuleError;

/// Register every rule of every category, in reporting order.
///
/// # Errors
///
/// Returns [`RuleError::MissingField`] if a rule definition is incomplete.
pub fn register_all(registry: &mut Registry) -> Result<(), RuleError> {
    compression::register(registry)?;
    hypertable::register(registry)?;
    index::register(registry)?;
    Ok(())
}
