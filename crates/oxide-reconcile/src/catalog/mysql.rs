//! MySQL catalog adapter.
//!
//! Introspection goes through `information_schema` with bound parameters,
//! scoped to the connection's current database. DDL is rendered by
//! [`MySqlDialect`] and sent one statement at a time; MySQL commits each DDL
//! statement on its own, so there is no surrounding transaction.

use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;
use tracing::debug;

use crate::changes::ColumnChange;
use crate::dialect::MySqlDialect;
use crate::error::{ReconcileError, Result};
use crate::planner::Step;
use crate::schema::{
    ColumnSpec, DefaultValue, ForeignKeyAction, ForeignKeySpec, LogicalType, TableShape, UniqueKey,
};

use super::CatalogPort;

const TABLE_EXISTS_SQL: &str = r"
SELECT COUNT(*) AS found
FROM information_schema.tables
WHERE table_schema = DATABASE() AND table_name = ?
";

const COLUMNS_SQL: &str = r"
SELECT
    CAST(column_name AS CHAR) AS column_name,
    CAST(data_type AS CHAR) AS data_type,
    CAST(column_type AS CHAR) AS column_type,
    CAST(character_maximum_length AS SIGNED) AS max_length,
    CAST(is_nullable AS CHAR) AS is_nullable,
    CAST(column_default AS CHAR) AS column_default,
    CAST(extra AS CHAR) AS extra
FROM information_schema.columns
WHERE table_schema = DATABASE() AND table_name = ?
ORDER BY ordinal_position
";

const INDEXED_COLUMNS_SQL: &str = r"
SELECT DISTINCT CAST(column_name AS CHAR) AS column_name
FROM information_schema.statistics
WHERE table_schema = DATABASE() AND table_name = ? AND non_unique = 1
";

const PRIMARY_KEY_SQL: &str = r"
SELECT CAST(column_name AS CHAR) AS column_name
FROM information_schema.key_column_usage
WHERE table_schema = DATABASE() AND table_name = ? AND constraint_name = 'PRIMARY'
ORDER BY ordinal_position
";

const UNIQUE_SQL: &str = r"
SELECT
    CAST(tc.constraint_name AS CHAR) AS constraint_name,
    CAST(k.column_name AS CHAR) AS column_name
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage k
    ON k.constraint_schema = tc.constraint_schema
    AND k.table_name = tc.table_name
    AND k.constraint_name = tc.constraint_name
WHERE tc.table_schema = DATABASE() AND tc.table_name = ? AND tc.constraint_type = 'UNIQUE'
ORDER BY tc.constraint_name, k.ordinal_position
";

const FOREIGN_KEYS_SQL: &str = r"
SELECT
    CAST(k.constraint_name AS CHAR) AS constraint_name,
    CAST(k.column_name AS CHAR) AS column_name,
    CAST(k.referenced_table_name AS CHAR) AS referenced_table,
    CAST(k.referenced_column_name AS CHAR) AS referenced_column,
    CAST(r.delete_rule AS CHAR) AS delete_rule
FROM information_schema.key_column_usage k
JOIN information_schema.referential_constraints r
    ON r.constraint_schema = k.constraint_schema
    AND r.constraint_name = k.constraint_name
WHERE k.table_schema = DATABASE() AND k.table_name = ? AND k.referenced_table_name IS NOT NULL
ORDER BY k.constraint_name, k.ordinal_position
";

/// Catalog backed by a MySQL connection pool.
#[derive(Debug, Clone)]
pub struct MySqlCatalog {
    pool: MySqlPool,
    dialect: MySqlDialect,
}

impl MySqlCatalog {
    /// Creates a catalog over an existing pool.
    #[must_use]
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            dialect: MySqlDialect::new(),
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing DDL");
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn execute_step(&self, table: &str, step: &Step) -> Result<()> {
        self.execute(&self.dialect.generate_sql(table, step)).await
    }

    async fn fetch(&self, sql: &str, table: &str) -> Result<Vec<MySqlRow>> {
        Ok(sqlx::query(sql).bind(table).fetch_all(&self.pool).await?)
    }
}

/// Maps an `information_schema` type onto a logical type and signedness.
fn parse_column_type(
    data_type: &str,
    column_type: &str,
    max_length: Option<i64>,
) -> Option<(LogicalType, bool)> {
    let data_type = data_type.to_ascii_lowercase();
    let column_type = column_type.to_ascii_lowercase();
    let unsigned = column_type.contains("unsigned");
    let length = || {
        max_length
            .and_then(|len| u32::try_from(len).ok())
            .unwrap_or(u32::MAX)
    };

    let logical = match data_type.as_str() {
        "tinyint" if column_type.starts_with("tinyint(1)") => LogicalType::Boolean,
        "bool" | "boolean" => LogicalType::Boolean,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" => {
            return Some((LogicalType::Integer, unsigned));
        }
        "float" | "double" | "real" | "decimal" | "numeric" => LogicalType::Float,
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" => {
            LogicalType::String(length())
        }
        "datetime" | "timestamp" => LogicalType::Timestamp,
        "json" => LogicalType::Json,
        _ => return None,
    };
    Some((logical, false))
}

/// Parses the textual `column_default` into a typed default.
///
/// MySQL reports literal defaults unquoted and unescaped. The result is in
/// canonical form so it compares equal to a normalized declared default.
fn parse_default(raw: &str, logical: LogicalType, generated: bool) -> Option<DefaultValue> {
    let expression = || DefaultValue::Expression(raw.to_string());

    let value = if generated {
        expression()
    } else {
        match logical {
            LogicalType::Boolean => match raw {
                "1" | "b'1'" => DefaultValue::Bool(true),
                "0" | "b'0'" => DefaultValue::Bool(false),
                _ => expression(),
            },
            LogicalType::Integer => raw
                .parse()
                .map_or_else(|_| expression(), DefaultValue::Integer),
            LogicalType::Float => raw
                .parse()
                .map_or_else(|_| expression(), DefaultValue::Float),
            LogicalType::Timestamp
                if raw.to_ascii_uppercase().starts_with("CURRENT_TIMESTAMP") =>
            {
                expression()
            }
            LogicalType::String(_) | LogicalType::Json | LogicalType::Timestamp => {
                DefaultValue::String(raw.to_string())
            }
        }
    };
    value.canonical(logical)
}

impl CatalogPort for MySqlCatalog {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let found: i64 = sqlx::query_scalar(TABLE_EXISTS_SQL)
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(found > 0)
    }

    async fn live_columns(&self, table: &str) -> Result<Vec<ColumnSpec>> {
        let indexed: Vec<String> = self
            .fetch(INDEXED_COLUMNS_SQL, table)
            .await?
            .iter()
            .map(|row| row.try_get("column_name"))
            .collect::<std::result::Result<Vec<String>, sqlx::Error>>()?;

        let rows = self.fetch(COLUMNS_SQL, table).await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("column_name")?;
            let data_type: String = row.try_get("data_type")?;
            let column_type: String = row.try_get("column_type")?;
            let max_length: Option<i64> = row.try_get("max_length")?;
            let is_nullable: String = row.try_get("is_nullable")?;
            let column_default: Option<String> = row.try_get("column_default")?;
            let extra: String = row.try_get::<Option<String>, _>("extra")?.unwrap_or_default();

            let (logical_type, unsigned) = parse_column_type(&data_type, &column_type, max_length)
                .ok_or_else(|| ReconcileError::UnsupportedType {
                    table: table.to_string(),
                    column: name.clone(),
                    data_type: column_type.clone(),
                })?;
            let extra = extra.to_ascii_lowercase();
            let default = column_default.as_deref().and_then(|raw| {
                parse_default(raw, logical_type, extra.contains("default_generated"))
            });

            columns.push(ColumnSpec {
                indexed: indexed.contains(&name),
                name,
                logical_type,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
                default,
                unsigned,
                auto_increment: extra.contains("auto_increment"),
            });
        }

        Ok(columns)
    }

    async fn live_primary_key(&self, table: &str) -> Result<Vec<String>> {
        let rows = self.fetch(PRIMARY_KEY_SQL, table).await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get("column_name"))
            .collect::<std::result::Result<Vec<String>, sqlx::Error>>()?)
    }

    async fn live_unique_constraints(&self, table: &str) -> Result<Vec<UniqueKey>> {
        let mut uniques: Vec<UniqueKey> = Vec::new();
        for row in self.fetch(UNIQUE_SQL, table).await? {
            let name: String = row.try_get("constraint_name")?;
            let column: String = row.try_get("column_name")?;
            match uniques.last_mut() {
                Some(last) if last.name == name => last.columns.push(column),
                _ => uniques.push(UniqueKey::new(name, vec![column])),
            }
        }
        Ok(uniques)
    }

    async fn live_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeySpec>> {
        let mut foreign_keys: Vec<ForeignKeySpec> = Vec::new();
        for row in self.fetch(FOREIGN_KEYS_SQL, table).await? {
            let name: String = row.try_get("constraint_name")?;
            // Composite foreign keys are tracked by their first column.
            if foreign_keys.last().is_some_and(|fk| fk.name == name) {
                continue;
            }
            let delete_rule: String = row.try_get("delete_rule")?;
            foreign_keys.push(ForeignKeySpec {
                name,
                column: row.try_get("column_name")?,
                referenced_table: row.try_get("referenced_table")?,
                referenced_column: row.try_get("referenced_column")?,
                on_delete: ForeignKeyAction::from_rule(&delete_rule),
            });
        }
        Ok(foreign_keys)
    }

    async fn create_table(&self, shape: &TableShape) -> Result<()> {
        self.execute(&self.dialect.create_table_sql(shape)).await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.execute(&self.dialect.drop_table_sql(table)).await
    }

    async fn add_column(&self, table: &str, column: &ColumnSpec) -> Result<()> {
        let step = Step::AddColumn {
            column: column.clone(),
        };
        self.execute_step(table, &step).await
    }

    async fn alter_column(
        &self,
        table: &str,
        target: &ColumnSpec,
        changes: &[ColumnChange],
    ) -> Result<()> {
        let step = Step::AlterColumn {
            target: target.clone(),
            changes: changes.to_vec(),
        };
        self.execute_step(table, &step).await
    }

    async fn drop_primary_key(&self, table: &str) -> Result<()> {
        self.execute_step(table, &Step::DropPrimaryKey { columns: vec![] })
            .await
    }

    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()> {
        let step = Step::AddPrimaryKey {
            columns: columns.to_vec(),
        };
        self.execute_step(table, &step).await
    }

    async fn add_unique(&self, table: &str, unique: &UniqueKey) -> Result<()> {
        let step = Step::AddUnique {
            unique: unique.clone(),
        };
        self.execute_step(table, &step).await
    }

    async fn drop_unique(&self, table: &str, name: &str) -> Result<()> {
        let step = Step::DropUnique {
            name: name.to_string(),
        };
        self.execute_step(table, &step).await
    }

    async fn drop_foreign_key(&self, table: &str, name: &str) -> Result<()> {
        let step = Step::DropForeignKey {
            name: name.to_string(),
        };
        self.execute_step(table, &step).await
    }

    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKeySpec) -> Result<()> {
        let step = Step::AddForeignKey {
            foreign_key: foreign_key.clone(),
        };
        self.execute_step(table, &step).await
    }

    async fn apply(&self, table: &str, step: &Step) -> Result<()> {
        self.execute_step(table, step).await
    }
}
