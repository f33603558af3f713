//! Text and JSON output for Timescale Doctor.
//!
//! Produces three kinds of output:
//!
//! 1. **Findings** as they are produced, through a [`ReportSink`]. The text
//!    form prints a `category:` header before the first entry of each
//!    category, then one wrapped bullet per finding:
//!
//!    ```text
//!    index:
//!    - Index 'my_index' on table 'my_table' is not used.
//!    ! duplicate: query failed: permission denied for table pg_index
//!    ```
//!
//! 2. **Rule listings** for `--list`, at one of the [`ShowLevel`]s.
//!
//! 3. **JSON**, a `serde_json` rendering of the whole [`RunReport`].

use std::io::{self, Write};

use textwrap::Options;

use crate::rule::Rule;
use crate::types::{Finding, RuleFailure, RunReport, ShowLevel};

/// Indentation of template text in `--list` output.
const LISTING_INDENT: &str = "    ";

// ---------------------------------------------------------------------------
// Streaming sinks
// ---------------------------------------------------------------------------

/// Receives findings and failures in output order while a run progresses.
pub trait ReportSink {
    /// Called once per rendered message.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    fn finding(&mut self, finding: &Finding) -> io::Result<()>;

    /// Called once per rule that failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    fn failure(&mut self, failure: &RuleFailure) -> io::Result<()>;
}

/// Plain-text reporter writing the human-readable format.
pub struct TextReporter<W: Write> {
    out: W,
    width: usize,
    current_category: Option<String>,
}

impl<W: Write> TextReporter<W> {
    #[must_use]
    pub fn new(out: W, width: usize) -> Self {
        Self {
            out,
            width,
            current_category: None,
        }
    }

    /// Consume the reporter and hand back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print the category header unless it was the last one printed.
    fn header(&mut self, category: &str) -> io::Result<()> {
        if self.current_category.as_deref() == Some(category) {
            return Ok(());
        }
        writeln!(self.out, "{category}:")?;
        self.current_category = Some(category.to_owned());
        Ok(())
    }
}

impl<W: Write> ReportSink for TextReporter<W> {
    fn finding(&mut self, finding: &Finding) -> io::Result<()> {
        self.header(&finding.category)?;
        writeln!(self.out, "{}", format_message(&finding.message, self.width))
    }

    fn failure(&mut self, failure: &RuleFailure) -> io::Result<()> {
        self.header(&failure.category)?;
        let text = format!("{}: {}", failure.rule, failure.reason);
        writeln!(self.out, "{}", wrap_with_marker(&text, self.width, "! "))
    }
}

/// Sink that discards everything, used with `--json`.
#[derive(Debug, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn finding(&mut self, _finding: &Finding) -> io::Result<()> {
        Ok(())
    }

    fn failure(&mut self, _failure: &RuleFailure) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Text layout
// ---------------------------------------------------------------------------

/// Dedent `text`, collapse runs of whitespace, and fill it to `width` as a
/// `- ` bullet with continuation lines indented by two spaces.
#[must_use]
pub fn format_message(text: &str, width: usize) -> String {
    wrap_with_marker(text, width, "- ")
}

fn wrap_with_marker(text: &str, width: usize, marker: &str) -> String {
    let collapsed = collapse_whitespace(&textwrap::dedent(text));
    if collapsed.is_empty() {
        return marker.trim_end().to_owned();
    }
    let options = Options::new(width)
        .initial_indent(marker)
        .subsequent_indent("  ");
    textwrap::fill(&collapsed, options)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Rule listing
// ---------------------------------------------------------------------------

/// Write `--list` output for `rules`.
///
/// `brief` prints `category.name: description`. `message` adds the dedented
/// message template; `details` also adds the detail and hint templates when
/// they differ from the message.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn write_listing<'a, W, I>(out: &mut W, rules: I, show: ShowLevel) -> io::Result<()>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = (&'a str, &'a str, &'a Rule)>,
{
    for (category, name, rule) in rules {
        writeln!(out, "{category}.{name}: {}", rule.description())?;
        if show == ShowLevel::Brief {
            continue;
        }

        write_block(out, rule.message())?;
        if show == ShowLevel::Details {
            if rule.detail() != rule.message() {
                writeln!(out)?;
                write_block(out, rule.detail())?;
            }
            if rule.hint() != rule.message() {
                writeln!(out)?;
                write_block(out, rule.hint())?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_block<W: Write + ?Sized>(out: &mut W, template: &str) -> io::Result<()> {
    let dedented = textwrap::dedent(template);
    let block = textwrap::indent(dedented.trim_matches('\n'), LISTING_INDENT);
    writeln!(out, "{}", block.trim_end())
}

// ---------------------------------------------------------------------------
// JSON output
// ---------------------------------------------------------------------------

/// Serialize a [`RunReport`] to pretty-printed JSON.
///
/// # Errors
///
/// Returns an error message if serialization fails (should not happen for valid data).
pub fn to_json(report: &RunReport) -> Result<String, String> {
    serde_json::to_string_pretty(report).map_err(|e| format!("JSON serialization failed: {e}"))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use indoc::indoc;

    use super::*;
    use crate::rule::RuleDefinition;
    use crate::types::CategoryReport;

    fn finding(category: &str, rule: &str, message: &str) -> Finding {
        Finding {
            category: category.to_owned(),
            rule: rule.to_owned(),
            message: message.to_owned(),
        }
    }

    fn render(events: &[Result<Finding, RuleFailure>], width: usize) -> String {
        let mut reporter = TextReporter::new(Vec::new(), width);
        for event in events {
            match event {
                Ok(f) => reporter.finding(f).unwrap(),
                Err(f) => reporter.failure(f).unwrap(),
            }
        }
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    // --- Layout tests ---

    #[test]
    fn test_format_message_wraps_with_bullet() {
        assert_eq!(
            format_message("one two three four five six seven", 16),
            "- one two three\n  four five six\n  seven"
        );
    }

    #[test]
    fn test_format_message_dedents_and_collapses() {
        let text = "
            Table 'conditions' might benefit
            from being   a hypertable.
        ";
        assert_eq!(
            format_message(text, 70),
            "- Table 'conditions' might benefit from being a hypertable."
        );
    }

    #[test]
    fn test_format_message_short_line_untouched() {
        assert_eq!(format_message("short", 70), "- short");
    }

    // --- Text reporter tests ---

    #[test]
    fn test_header_printed_once_per_category() {
        let output = render(
            &[
                Ok(finding("index", "unused", "Index 'a' on table 't' is not used.")),
                Ok(finding("index", "unused", "Index 'b' on table 't' is not used.")),
                Ok(finding("compression", "pointless_segmentby", "Column 'x' is pointless.")),
            ],
            70,
        );
        assert_eq!(
            output,
            indoc! {"
                index:
                - Index 'a' on table 't' is not used.
                - Index 'b' on table 't' is not used.
                compression:
                - Column 'x' is pointless.
            "}
        );
    }

    #[test]
    fn test_failure_line() {
        let output = render(
            &[Err(RuleFailure {
                category: "index".to_owned(),
                rule: "duplicate".to_owned(),
                reason: "query failed: permission denied".to_owned(),
            })],
            70,
        );
        assert_eq!(output, "index:\n! duplicate: query failed: permission denied\n");
    }

    #[test]
    fn test_null_sink_writes_nothing() {
        let mut sink = NullSink;
        sink.finding(&finding("index", "unused", "m")).unwrap();
    }

    // --- Listing tests ---

    fn listing_rule() -> Rule {
        RuleDefinition::new("index", "unused")
            .query("SELECT 1")
            .description("Indexes that are never used")
            .message("Index '{indexrelname}' is not used.")
            .hint("Consider removing it.")
            .build()
            .unwrap()
    }

    fn listing(show: ShowLevel) -> String {
        let rule = listing_rule();
        let mut out = Vec::new();
        write_listing(&mut out, [("index", "unused", &rule)], show).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_listing_brief() {
        assert_eq!(listing(ShowLevel::Brief), "index.unused: Indexes that are never used\n");
    }

    #[test]
    fn test_listing_message() {
        assert_eq!(
            listing(ShowLevel::Message),
            indoc! {"
                index.unused: Indexes that are never used
                    Index '{indexrelname}' is not used.

            "}
        );
    }

    #[test]
    fn test_listing_details_skips_defaulted_detail() {
        assert_eq!(
            listing(ShowLevel::Details),
            indoc! {"
                index.unused: Indexes that are never used
                    Index '{indexrelname}' is not used.

                    Consider removing it.

            "}
        );
    }

    // --- JSON output tests ---

    fn make_report() -> RunReport {
        let generated_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut report = RunReport::new(generated_at);
        let mut category = CategoryReport::new("index");
        category
            .findings
            .push(finding("index", "unused", "Index 'my_index' on table 'my_table' is not used."));
        report.categories.push(category);
        report.rules_run = 2;
        report.total_findings = 1;
        report
    }

    #[test]
    fn test_json_output_contains_findings() {
        let json = to_json(&make_report()).unwrap();
        assert!(json.contains("\"category\": \"index\""));
        assert!(json.contains("my_index"));
        assert!(json.contains("\"rules_run\": 2"));
    }

    #[test]
    fn test_json_empty_report() {
        let report = RunReport::new(Utc::now());
        let json = to_json(&report).unwrap();
        assert!(json.contains("\"categories\": []"));
        assert!(json.contains("\"total_findings\": 0"));
    }

    #[test]
    fn test_json_roundtrip() {
        let json = to_json(&make_report()).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.findings().count(), 1);
        assert_eq!(parsed.generated_at, make_report().generated_at);
    }
}
