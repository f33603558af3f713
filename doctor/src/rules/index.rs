//! Rules for indexes.

use crate::registry::Registry;
use crate::rule::RuleError;
use crate::rule_definition;

/// Non-unique indexes that have never been scanned.
const UNUSED_QUERY: &str = r"
SELECT relname,
       indexrelname,
       pg_size_pretty(pg_relation_size(i.indexrelid)) AS index_size
  FROM pg_catalog.pg_stat_user_indexes ui
  JOIN pg_catalog.pg_index i USING (indexrelid)
 WHERE NOT indisunique AND idx_scan = 0
";

/// Pairs of indexes on the same relation with identical keys, operator
/// classes, collations, expressions and predicates.
const DUPLICATE_QUERY: &str = r"
SELECT indrelid::regclass AS relation,
       (array_agg(indexrelid::regclass ORDER BY indexrelid))[1] AS index1,
       (array_agg(indexrelid::regclass ORDER BY indexrelid))[2] AS index2
  FROM pg_catalog.pg_index
  JOIN pg_catalog.pg_stat_user_indexes USING (indexrelid)
 GROUP BY indrelid, indkey::text, indclass::text, indcollation::text,
          coalesce(indexprs::text, ''), coalesce(indpred::text, '')
HAVING count(*) > 1
";

pub fn register(registry: &mut Registry) -> Result<(), RuleError> {
    registry.register(
        rule_definition!("unused")
            .query(UNUSED_QUERY)
            .description("Indexes that are never used")
            .message("Index '{indexrelname}' on table '{relname}' is not used.")
            .detail(
                "Index '{indexrelname}' on table '{relname}' has not been used by \
                 any scan since statistics were last reset. It still has to be \
                 maintained on every write and occupies {index_size}.",
            )
            .hint("Consider removing it and saving {index_size}."),
    )?;

    registry.register(
        rule_definition!("duplicate")
            .query(DUPLICATE_QUERY)
            .description("Indexes that duplicate each other")
            .message("Index '{index1}' and '{index2}' on table '{relation}' seems to be duplicates.")
            .detail(
                "Indexes '{index1}' and '{index2}' on table '{relation}' cover the \
                 same columns with the same operator classes, expressions and \
                 predicates. Only one of them is needed to answer queries.",
            )
            .hint("Drop one of '{index1}' and '{index2}'."),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::FakeDatabase;
    use crate::types::Row;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();
        registry
    }

    #[test]
    fn test_rules_registered_under_index() {
        let registry = registry();
        let names: Vec<&str> = registry.rules().map(|r| r.name()).collect();
        assert_eq!(names, vec!["unused", "duplicate"]);
        assert!(registry.rules().all(|r| r.category() == "index"));
    }

    #[test]
    fn test_unused_message() {
        let registry = registry();
        let rule = registry.get("index", "unused").unwrap();
        let mut db = FakeDatabase::new().respond(
            "idx_scan = 0",
            vec![Row::new()
                .with("relname", "my_table")
                .with("indexrelname", "my_index")
                .with("index_size", "8192 bytes")],
        );
        assert_eq!(
            rule.execute(&mut db).unwrap(),
            vec!["Index 'my_index' on table 'my_table' is not used."]
        );
        assert_eq!(
            rule.execute_with(&mut db, rule.hint()).unwrap(),
            vec!["Consider removing it and saving 8192 bytes."]
        );
    }

    #[test]
    fn test_duplicate_message() {
        let registry = registry();
        let rule = registry.get("index", "duplicate").unwrap();
        let mut db = FakeDatabase::new().respond(
            "HAVING count(*) > 1",
            vec![Row::new()
                .with("relation", "with_duplicate_index")
                .with("index1", "index_one")
                .with("index2", "index_two")],
        );
        let messages = rule.execute(&mut db).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("'index_one' and 'index_two'"));
        assert!(messages[0].contains("with_duplicate_index"));
        assert!(messages[0].contains("seems to be duplicates"));
    }
}
