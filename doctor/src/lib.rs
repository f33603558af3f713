//! Timescale Doctor: read-only diagnostics for PostgreSQL and TimescaleDB.
//!
//! A fixed catalogue of rules, each a SQL query plus a message template, is
//! run against one database connection. Every returned row becomes one
//! advisory finding, printed under the rule's category:
//!
//! ```text
//! index:
//! - Index 'my_index' on table 'my_table' is not used.
//! ```
//!
//! The pieces, bottom-up:
//! - [`rule`] defines rules and executes a single one
//! - [`registry`] holds the catalogue in [`rules`], grouped by category
//! - [`engine`] runs every selected rule and isolates failures
//! - [`reporter`] renders findings, listings, and JSON
//! - [`connection`] is the `Database` seam and its PostgreSQL implementation
//! - [`config`] and [`cli`] resolve settings from files, flags and environment

pub mod cli;
pub mod config;
pub mod connection;
pub mod engine;
pub mod registry;
pub mod reporter;
pub mod rule;
pub mod rules;
pub mod template;
pub mod types;
pub mod version;

pub use config::{ConfigError, DoctorConfig};
pub use connection::{ConnectParams, Database, DbError, PgDatabase};
pub use engine::CheckRunner;
pub use registry::{build_registry, Registry};
pub use rule::{Rule, RuleDefinition, RuleError};
pub use types::{Finding, Row, RuleFailure, RunReport};
