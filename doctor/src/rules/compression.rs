//! Rules for compressed hypertables.
//!
//! Both rules look at the planner statistics of segment-by columns. A
//! negative `n_distinct` means the number of distinct values scales with the
//! row count; exactly one distinct value means segmenting achieves nothing.

use crate::registry::Registry;
use crate::rule::RuleError;
use crate::rule_definition;

fn segmentby_query(condition: &str) -> String {
    format!(
        r"
SELECT format('%I.%I', c.hypertable_schema, c.hypertable_name)::regclass AS relation,
       s.attname
  FROM timescaledb_information.compression_settings c
  JOIN pg_catalog.pg_stats s
    ON s.attname = c.attname
   AND s.schemaname = c.hypertable_schema
   AND s.tablename = c.hypertable_name
 WHERE c.segmentby_column_index IS NOT NULL AND {condition}
"
    )
}

pub fn register(registry: &mut Registry) -> Result<(), RuleError> {
    registry.register(
        rule_definition!("linear_segmentby")
            .query(segmentby_query("s.n_distinct < 0"))
            .description("Segment-by columns whose distinct values grow with the table")
            .message(
                "Column '{attname}' in hypertable '{relation}' as segment-by column \
                 is probably not a good choice since the number of values seems to \
                 grow with the number of rows of the table.",
            )
            .hint(
                "Choose a segment-by column for '{relation}' with a bounded number \
                 of values, such as a device or tenant identifier.",
            )
            .depends_on("timescaledb", "2.0"),
    )?;

    registry.register(
        rule_definition!("pointless_segmentby")
            .query(segmentby_query("s.n_distinct = 1"))
            .description("Segment-by columns holding a single value")
            .message(
                "Column '{attname}' in hypertable '{relation}' as segment-by column \
                 is pointless since it contains a single value.",
            )
            .hint("Remove '{attname}' from the segment-by columns of '{relation}'.")
            .depends_on("timescaledb", "2.0"),
    )?;

    Ok(())
}
