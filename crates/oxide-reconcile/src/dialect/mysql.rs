//! MySQL dialect for reconciliation DDL.
//!
//! MySQL needs the full column definition to change a column's type or
//! nullability (`MODIFY COLUMN`), so alterations always render the declared
//! target column. Default-only changes use `ALTER COLUMN ... SET DEFAULT`.

use crate::changes::ColumnChange;
use crate::planner::Step;
use crate::schema::{ColumnSpec, ForeignKeySpec, LogicalType, TableShape, UniqueKey};

/// MySQL reconciliation dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Quotes an identifier (table name, column name, etc.).
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns the SQL type name for a column.
    #[must_use]
    pub fn type_name(&self, column: &ColumnSpec) -> String {
        match column.logical_type {
            LogicalType::Integer if column.unsigned => "INT UNSIGNED".to_string(),
            LogicalType::Integer => "INT".to_string(),
            LogicalType::Float => "DOUBLE".to_string(),
            LogicalType::String(len) => format!("VARCHAR({len})"),
            LogicalType::Boolean => "TINYINT(1)".to_string(),
            LogicalType::Timestamp => "DATETIME".to_string(),
            LogicalType::Json => "JSON".to_string(),
        }
    }

    /// Generates a column definition.
    #[must_use]
    pub fn column_definition(&self, column: &ColumnSpec) -> String {
        let mut parts = vec![self.quote_identifier(&column.name), self.type_name(column)];

        parts.push(if column.nullable { "NULL" } else { "NOT NULL" }.to_string());

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default.to_sql()));
        }

        if column.auto_increment {
            parts.push("AUTO_INCREMENT".to_string());
        }

        parts.join(" ")
    }

    fn index_name(&self, table: &str, column: &str) -> String {
        format!("{table}_{column}_index")
    }

    fn foreign_key_clause(&self, fk: &ForeignKeySpec) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
            self.quote_identifier(&fk.name),
            self.quote_identifier(&fk.column),
            self.quote_identifier(&fk.referenced_table),
            self.quote_identifier(&fk.referenced_column),
            fk.on_delete.to_sql()
        )
    }

    /// Generates SQL for creating a table from its declared shape.
    #[must_use]
    pub fn create_table_sql(&self, shape: &TableShape) -> String {
        let mut defs: Vec<String> = shape
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        let primary_key = shape.primary_key_columns();
        if !primary_key.is_empty() {
            defs.push(format!("PRIMARY KEY ({})", self.quote_list(primary_key)));
        }

        for unique in shape.unique_keys() {
            defs.push(format!(
                "UNIQUE KEY {} ({})",
                self.quote_identifier(&unique.name),
                self.quote_list(&unique.columns)
            ));
        }

        for column in shape.columns.iter().filter(|c| c.indexed) {
            defs.push(format!(
                "KEY {} ({})",
                self.quote_identifier(&self.index_name(&shape.name, &column.name)),
                self.quote_identifier(&column.name)
            ));
        }

        for fk in shape.foreign_keys() {
            defs.push(self.foreign_key_clause(fk));
        }

        format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&shape.name),
            defs.join(",\n  ")
        )
    }

    /// Generates SQL for dropping a table.
    #[must_use]
    pub fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table))
    }

    fn add_column_sql(&self, table: &str, column: &ColumnSpec) -> String {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)
        );
        if column.indexed {
            sql.push_str(&format!(
                ", ADD INDEX {} ({})",
                self.quote_identifier(&self.index_name(table, &column.name)),
                self.quote_identifier(&column.name)
            ));
        }
        sql
    }

    fn alter_column_sql(&self, table: &str, target: &ColumnSpec, changes: &[ColumnChange]) -> String {
        let needs_modify = changes
            .iter()
            .any(|c| matches!(c, ColumnChange::Type(_) | ColumnChange::Nullable(_)));

        if needs_modify {
            return format!(
                "ALTER TABLE {} MODIFY COLUMN {}",
                self.quote_identifier(table),
                self.column_definition(target)
            );
        }

        let action = target.default.as_ref().map_or_else(
            || "DROP DEFAULT".to_string(),
            |default| format!("SET DEFAULT {}", default.to_sql()),
        );
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {}",
            self.quote_identifier(table),
            self.quote_identifier(&target.name),
            action
        )
    }

    fn add_unique_sql(&self, table: &str, unique: &UniqueKey) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            self.quote_identifier(table),
            self.quote_identifier(&unique.name),
            self.quote_list(&unique.columns)
        )
    }

    /// Generates the single DDL statement for a reconciliation step.
    #[must_use]
    pub fn generate_sql(&self, table: &str, step: &Step) -> String {
        let quoted = self.quote_identifier(table);
        match step {
            Step::AddColumn { column } => self.add_column_sql(table, column),
            Step::AlterColumn { target, changes } => self.alter_column_sql(table, target, changes),
            Step::DropPrimaryKey { .. } => format!("ALTER TABLE {quoted} DROP PRIMARY KEY"),
            Step::AddPrimaryKey { columns } => format!(
                "ALTER TABLE {quoted} ADD PRIMARY KEY ({})",
                self.quote_list(columns)
            ),
            Step::DropUnique { name } => format!(
                "ALTER TABLE {quoted} DROP INDEX {}",
                self.quote_identifier(name)
            ),
            Step::AddUnique { unique } => self.add_unique_sql(table, unique),
            Step::DropForeignKey { name } => format!(
                "ALTER TABLE {quoted} DROP FOREIGN KEY {}",
                self.quote_identifier(name)
            ),
            Step::AddForeignKey { foreign_key } => format!(
                "ALTER TABLE {quoted} ADD {}",
                self.foreign_key_clause(foreign_key)
            ),
        }
    }
}
