//! Statement generation for shard maintenance and shard queries

use crate::config::EngineConfig;
use crate::shard::{BoundaryMode, Shard};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Copy the shard's key range out of the logical table
    Materialize,
    /// Trigram index on the content column
    Index,
    /// Bounded count of pattern matches
    Count,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Materialize => "materialize",
            StatementKind::Index => "index",
            StatementKind::Count => "count",
        };
        f.write_str(name)
    }
}

/// One dispatchable unit of work: a statement against a single shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub kind: StatementKind,
    pub shard: usize,
    pub sql: String,
}

/// Builds statement text for the physical shard tables.
#[derive(Debug, Clone)]
pub struct StatementGenerator {
    source_table: String,
    key_column: String,
    content_column: String,
    boundary: BoundaryMode,
}

impl StatementGenerator {
    /// Identifiers are interpolated verbatim; `EngineConfig::validate` keeps
    /// them to plain SQL identifiers.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            source_table: config.source_table.clone(),
            key_column: config.key_column.clone(),
            content_column: config.content_column.clone(),
            boundary: config.boundary,
        }
    }

    pub fn materialize(&self, shard: &Shard) -> Task {
        let sql = format!(
            "CREATE TABLE {} AS SELECT * FROM {} WHERE {} {} {} AND {} < {};",
            shard.table_name(&self.source_table),
            self.source_table,
            self.key_column,
            self.boundary.lower_operator(),
            shard.lower,
            self.key_column,
            shard.upper,
        );
        Task {
            kind: StatementKind::Materialize,
            shard: shard.index,
            sql,
        }
    }

    pub fn index(&self, shard: &Shard) -> Task {
        let table = shard.table_name(&self.source_table);
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {table}_{col}_trgm_idx ON {table} USING GIN ({col} gin_trgm_ops);",
            table = table,
            col = self.content_column,
        );
        Task {
            kind: StatementKind::Index,
            shard: shard.index,
            sql,
        }
    }

    /// Count rows whose content matches `pattern` (POSIX regex). A non-zero
    /// `limit` bounds the inner scan, so the count never exceeds it.
    pub fn count(&self, shard: &Shard, pattern: &str, limit: u64) -> Task {
        let limit_clause = if limit != 0 {
            format!(" limit {}", limit)
        } else {
            String::new()
        };
        let sql = format!(
            "select count(*) from (select {} from {} where {} ~ {}{}) as e;",
            self.key_column,
            shard.table_name(&self.source_table),
            self.content_column,
            quote_literal(pattern),
            limit_clause,
        );
        Task {
            kind: StatementKind::Count,
            shard: shard.index,
            sql,
        }
    }
}

/// SQL string literal with embedded single quotes doubled.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::ShardPlan;

    fn generator() -> StatementGenerator {
        StatementGenerator::new(&EngineConfig::default())
    }

    #[test]
    fn test_materialize_statement() {
        let plan = ShardPlan::new(200, 50_000, BoundaryMode::Exclusive);
        let task = generator().materialize(&plan.shards()[1]);
        assert_eq!(task.kind, StatementKind::Materialize);
        assert_eq!(
            task.sql,
            "CREATE TABLE files_001 AS SELECT * FROM files WHERE id > 50000 AND id < 100000;"
        );
    }

    #[test]
    fn test_materialize_half_open() {
        let config = EngineConfig {
            boundary: BoundaryMode::HalfOpen,
            ..EngineConfig::default()
        };
        let plan = ShardPlan::from_config(&config);
        let task = StatementGenerator::new(&config).materialize(&plan.shards()[0]);
        assert_eq!(
            task.sql,
            "CREATE TABLE files_000 AS SELECT * FROM files WHERE id >= 0 AND id < 50000;"
        );
    }

    #[test]
    fn test_index_statement_is_idempotent() {
        let plan = ShardPlan::new(200, 50_000, BoundaryMode::Exclusive);
        let task = generator().index(&plan.shards()[12]);
        assert_eq!(
            task.sql,
            "CREATE INDEX IF NOT EXISTS files_012_contents_trgm_idx ON files_012 USING GIN (contents gin_trgm_ops);"
        );
        assert_eq!(task.shard, 12);
    }

    #[test]
    fn test_count_statement_with_and_without_limit() {
        let plan = ShardPlan::new(3, 10, BoundaryMode::Exclusive);
        let shard = &plan.shards()[2];

        let capped = generator().count(shard, "fn main", 100);
        assert_eq!(
            capped.sql,
            "select count(*) from (select id from files_002 where contents ~ 'fn main' limit 100) as e;"
        );

        let uncapped = generator().count(shard, "fn main", 0);
        assert_eq!(
            uncapped.sql,
            "select count(*) from (select id from files_002 where contents ~ 'fn main') as e;"
        );
    }

    #[test]
    fn test_pattern_quotes_are_escaped() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        let plan = ShardPlan::new(1, 10, BoundaryMode::Exclusive);
        let task = generator().count(&plan.shards()[0], "'; drop table files; --", 0);
        assert!(task.sql.contains("'''; drop table files; --'"));
    }

    #[test]
    fn test_count_statements_parse_as_postgres() {
        use sqlparser::dialect::PostgreSqlDialect;
        use sqlparser::parser::Parser;

        let plan = ShardPlan::new(3, 10, BoundaryMode::Exclusive);
        for shard in plan.shards() {
            for limit in [0, 25] {
                let task = generator().count(shard, "unsafe|panic!", limit);
                let parsed = Parser::parse_sql(&PostgreSqlDialect {}, &task.sql);
                assert!(parsed.is_ok(), "{}: {:?}", task.sql, parsed.err());
            }
            let task = generator().materialize(shard);
            assert!(Parser::parse_sql(&PostgreSqlDialect {}, &task.sql).is_ok());
        }
    }
}
