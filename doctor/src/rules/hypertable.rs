//! Rules for hypertables and tables that could become one.

use crate::registry::Registry;
use crate::rule::RuleError;
use crate::rule_definition;

/// Plain tables with a timestamp column that is indexed and actually used,
/// with live data and more than a handful of pages.
const CANDIDATE_QUERY: &str = r"
SELECT relid::regclass AS table,
       pt.typname AS coltype,
       psui.idx_scan,
       attname AS colname
  FROM pg_catalog.pg_stat_user_indexes AS psui
  LEFT JOIN pg_catalog.pg_inherits ON (inhparent = relid OR inhrelid = relid)
  JOIN pg_catalog.pg_index USING (indexrelid)
  JOIN pg_catalog.pg_attribute ON (attrelid = relid AND attnum = ANY(indkey))
  JOIN pg_catalog.pg_type AS pt ON (atttypid = pt.oid)
  JOIN pg_catalog.pg_stat_user_tables AS psut USING (relid)
  JOIN pg_catalog.pg_class AS pc ON (pc.oid = relid)
  JOIN pg_catalog.pg_class AS pci ON (pci.oid = indexrelid)
 WHERE pg_inherits IS NULL
   AND pt.typname IN ('timestamp', 'timestamptz')
   AND psui.idx_scan > 0
   AND n_live_tup + n_dead_tup > 0
   AND pc.relpages > 10
";

const CANDIDATE_MESSAGE: &str = "
    Table '{table}' might benefit from being transformed to a hypertable.
    It has a column '{colname}' of timestamp type '{coltype}' that is
    used by index scans.
";

const CANDIDATE_DETAIL: &str = "
    Table '{table}' might benefit from being transformed to a hypertable.

    1. The table '{table}' has a column '{colname}' of timestamp type '{coltype}'
    2. The table '{table}' is not partitioned
    3. There are index scans done on '{table}'
    4. There are rows in '{table}'
    5. There are more than 10 pages allocated to '{table}'
";

/// Chunks whose ACL differs from the ACL of their hypertable.
const PERMISSION_QUERY: &str = r"
WITH tables AS (
    SELECT format('%I.%I', hypertable_schema, hypertable_name)::regclass AS hypertable,
           format('%I.%I', chunk_schema, chunk_name)::regclass AS chunk
      FROM timescaledb_information.chunks
)
SELECT hypertable, chunk
  FROM tables
 WHERE (SELECT relacl FROM pg_catalog.pg_class WHERE oid = hypertable)
       IS DISTINCT FROM (SELECT relacl FROM pg_catalog.pg_class WHERE oid = chunk)
";

pub fn register(registry: &mut Registry) -> Result<(), RuleError> {
    registry.register(
        rule_definition!("candidate")
            .query(CANDIDATE_QUERY)
            .description("Tables that might benefit from being a hypertable")
            .message(CANDIDATE_MESSAGE)
            .detail(CANDIDATE_DETAIL)
            .hint("Consider converting it with create_hypertable('{table}', by_range('{colname}'))."),
    )?;

    registry.register(
        rule_definition!("chunk_permissions")
            .query(PERMISSION_QUERY)
            .description("Chunks with permissions different from their hypertable")
            .message("Chunk '{chunk}' have different permissions from hypertable '{hypertable}'.")
            .hint(
                "Grant the same privileges on '{chunk}' as on '{hypertable}', or \
                 re-run the GRANT on the hypertable so it propagates to all chunks.",
            )
            .depends_on("timescaledb", "2.0"),
    )?;

    Ok(())
}
