//! Check runner: executes every selected rule once and streams the results.
//!
//! Categories and rules run in registration order, strictly one after the
//! other on a single connection. A rule whose query or template fails is
//! reported as a [`RuleFailure`] and the run continues with the next rule.
//! A rule whose extension preconditions are not met is skipped silently.

use std::io;
use std::time::Instant;

use chrono::Utc;

use crate::config::{ConfigError, DoctorConfig, RuleFilter};
use crate::connection::Database;
use crate::registry::Registry;
use crate::reporter::ReportSink;
use crate::rule::{Rule, RuleError};
use crate::types::{CategoryReport, Finding, RuleFailure, RunReport};

/// Outcome of running one rule.
enum RuleOutcome {
    Skipped,
    Messages(Vec<String>),
}

/// Runs the rules of a [`Registry`] against a database.
pub struct CheckRunner<'r> {
    registry: &'r Registry,
    filter: RuleFilter,
}

impl<'r> CheckRunner<'r> {
    /// Create a runner applying the rule selection in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if a `select` or `exclude`
    /// pattern is not a valid glob.
    pub fn new(registry: &'r Registry, config: &DoctorConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_filter(registry, config.rule_filter()?))
    }

    #[must_use]
    pub fn with_filter(registry: &'r Registry, filter: RuleFilter) -> Self {
        Self { registry, filter }
    }

    /// Run every enabled rule, passing each finding and failure to `sink` as
    /// it is produced.
    ///
    /// # Errors
    ///
    /// Only errors from `sink` abort the run. Rule errors are recorded in the
    /// returned report.
    pub fn check_all(
        &self,
        db: &mut dyn Database,
        sink: &mut dyn ReportSink,
    ) -> io::Result<RunReport> {
        let start = Instant::now();
        let mut report = RunReport::new(Utc::now());

        for (category, rules) in self.registry.categories() {
            let mut section = CategoryReport::new(category);

            for rule in rules {
                if !self.filter.is_enabled(rule) {
                    log::debug!("{} deselected by configuration", rule.qualified_name());
                    report.rules_deselected += 1;
                    continue;
                }

                match run_rule(db, rule) {
                    Ok(RuleOutcome::Skipped) => report.rules_skipped += 1,
                    Ok(RuleOutcome::Messages(messages)) => {
                        report.rules_run += 1;
                        for message in messages {
                            let finding = Finding {
                                category: category.to_owned(),
                                rule: rule.name().to_owned(),
                                message,
                            };
                            sink.finding(&finding)?;
                            section.findings.push(finding);
                        }
                    }
                    Err(err) => {
                        log::warn!("rule {} failed: {err}", rule.qualified_name());
                        report.rules_failed += 1;
                        let failure = RuleFailure {
                            category: category.to_owned(),
                            rule: rule.name().to_owned(),
                            reason: err.to_string(),
                        };
                        sink.failure(&failure)?;
                        section.failures.push(failure);
                    }
                }
            }

            report.total_findings = report
                .total_findings
                .saturating_add(saturating_u32(section.findings.len()));
            if !section.is_empty() {
                report.categories.push(section);
            }
        }

        report.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "{} rules run, {} skipped, {} failed, {} findings in {} ms",
            report.rules_run,
            report.rules_skipped,
            report.rules_failed,
            report.total_findings,
            report.elapsed_ms
        );
        Ok(report)
    }
}

/// Counters in the report are `u32`; larger counts pin at the maximum.
fn saturating_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn run_rule(db: &mut dyn Database, rule: &Rule) -> Result<RuleOutcome, RuleError> {
    if !rule.is_applicable(db)? {
        return Ok(RuleOutcome::Skipped);
    }
    let messages = rule.execute_unchecked(db, rule.message())?;
    Ok(RuleOutcome::Messages(messages))
}
