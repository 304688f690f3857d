//! In-memory catalog.
//!
//! Keeps live tables as [`TableShape`] values and applies DDL to them with
//! the same rules MySQL enforces for the statements the reconciler issues.
//! Every DDL call is journaled as the SQL the MySQL dialect would send, which
//! makes the catalog useful for tests and for previewing a run offline.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::changes::ColumnChange;
use crate::dialect::MySqlDialect;
use crate::error::{ReconcileError, Result};
use crate::planner::Step;
use crate::schema::{ColumnSpec, ConstraintSpec, ForeignKeySpec, TableShape, UniqueKey};

use super::CatalogPort;

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, TableShape>,
    journal: Vec<String>,
    fail_on: Vec<String>,
    unreadable: HashSet<String>,
}

impl MemoryState {
    fn table_mut(&mut self, table: &str) -> Result<&mut TableShape> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| ReconcileError::Catalog(format!("Table '{table}' doesn't exist")))
    }
}

/// Catalog backed by in-memory table shapes.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    dialect: MySqlDialect,
    state: Mutex<MemoryState>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a live table.
    #[must_use]
    pub fn with_table(self, shape: TableShape) -> Self {
        self.lock().tables.insert(shape.name.clone(), shape);
        self
    }

    /// Makes every DDL statement containing `fragment` fail.
    #[must_use]
    pub fn fail_on(self, fragment: impl Into<String>) -> Self {
        self.lock().fail_on.push(fragment.into());
        self
    }

    /// Makes every introspection query against `table` fail.
    #[must_use]
    pub fn unreadable(self, table: impl Into<String>) -> Self {
        self.lock().unreadable.insert(table.into());
        self
    }

    /// Returns the live shape of a table, if it exists.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<TableShape> {
        self.lock().tables.get(name).cloned()
    }

    /// Returns every DDL statement issued so far.
    #[must_use]
    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    /// Forgets the statements issued so far.
    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, table: &str, f: impl FnOnce(Option<&TableShape>) -> T) -> Result<T> {
        let state = self.lock();
        if state.unreadable.contains(table) {
            return Err(ReconcileError::Catalog(format!(
                "SELECT command denied for table '{table}'"
            )));
        }
        Ok(f(state.tables.get(table)))
    }

    /// Journals `sql`, then applies `f` unless the statement is set to fail.
    fn write(&self, sql: String, f: impl FnOnce(&mut MemoryState) -> Result<()>) -> Result<()> {
        let mut state = self.lock();
        let fails = state.fail_on.iter().any(|fragment| sql.contains(fragment.as_str()));
        state.journal.push(sql.clone());
        if fails {
            return Err(ReconcileError::Catalog(format!("statement rejected: {sql}")));
        }
        f(&mut state)
    }

    fn write_step(
        &self,
        table: &str,
        step: &Step,
        f: impl FnOnce(&mut TableShape) -> Result<()>,
    ) -> Result<()> {
        let sql = self.dialect.generate_sql(table, step);
        self.write(sql, |state| f(state.table_mut(table)?))
    }
}

fn require_columns(shape: &TableShape, columns: &[String]) -> Result<()> {
    match columns.iter().find(|c| shape.get_column(c).is_none()) {
        Some(missing) => Err(ReconcileError::Catalog(format!(
            "Key column '{missing}' doesn't exist in table '{}'",
            shape.name
        ))),
        None => Ok(()),
    }
}

fn require_not_null_key(shape: &TableShape, columns: &[String]) -> Result<()> {
    if columns
        .iter()
        .any(|c| shape.get_column(c).is_some_and(|column| column.nullable))
    {
        return Err(ReconcileError::Catalog(
            "All parts of a PRIMARY KEY must be NOT NULL".to_string(),
        ));
    }
    Ok(())
}

fn remove_constraint(
    shape: &mut TableShape,
    what: &str,
    matches: impl Fn(&ConstraintSpec) -> bool,
) -> Result<()> {
    let position = shape.constraints.iter().position(matches).ok_or_else(|| {
        ReconcileError::Catalog(format!("Can't DROP {what} on table '{}'", shape.name))
    })?;
    shape.constraints.remove(position);
    Ok(())
}

impl CatalogPort for MemoryCatalog {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.read(table, |shape| shape.is_some())
    }

    async fn live_columns(&self, table: &str) -> Result<Vec<ColumnSpec>> {
        self.read(table, |shape| shape.map(|s| s.columns.clone()).unwrap_or_default())
    }

    async fn live_primary_key(&self, table: &str) -> Result<Vec<String>> {
        self.read(table, |shape| {
            shape
                .map(|s| s.primary_key_columns().to_vec())
                .unwrap_or_default()
        })
    }

    async fn live_unique_constraints(&self, table: &str) -> Result<Vec<UniqueKey>> {
        self.read(table, |shape| {
            shape
                .map(|s| s.unique_keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn live_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeySpec>> {
        self.read(table, |shape| {
            shape
                .map(|s| s.foreign_keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn create_table(&self, shape: &TableShape) -> Result<()> {
        let sql = self.dialect.create_table_sql(shape);
        self.write(sql, |state| {
            if state.tables.contains_key(&shape.name) {
                return Err(ReconcileError::Catalog(format!(
                    "Table '{}' already exists",
                    shape.name
                )));
            }
            require_not_null_key(shape, shape.primary_key_columns())?;
            for fk in shape.foreign_keys() {
                if fk.referenced_table != shape.name && !state.tables.contains_key(&fk.referenced_table)
                {
                    return Err(ReconcileError::Catalog(format!(
                        "Failed to open the referenced table '{}'",
                        fk.referenced_table
                    )));
                }
            }
            state.tables.insert(shape.name.clone(), shape.clone());
            Ok(())
        })
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let sql = self.dialect.drop_table_sql(table);
        self.write(sql, |state| {
            let referenced_by = state.tables.values().find(|other| {
                other.name != table && other.foreign_keys().any(|fk| fk.referenced_table == table)
            });
            if let Some(other) = referenced_by {
                return Err(ReconcileError::Catalog(format!(
                    "Cannot drop table '{table}' referenced by a foreign key constraint on table '{}'",
                    other.name
                )));
            }
            state.tables.remove(table);
            Ok(())
        })
    }

    async fn add_column(&self, table: &str, column: &ColumnSpec) -> Result<()> {
        let step = Step::AddColumn {
            column: column.clone(),
        };
        self.write_step(table, &step, |shape| {
            if shape.get_column(&column.name).is_some() {
                return Err(ReconcileError::Catalog(format!(
                    "Duplicate column name '{}'",
                    column.name
                )));
            }
            shape.columns.push(column.clone());
            Ok(())
        })
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
        let modify = changes
            .iter()
            .any(|c| matches!(c, ColumnChange::Type(_) | ColumnChange::Nullable(_)));
        self.write_step(table, &step, |shape| {
            let column = shape
                .columns
                .iter_mut()
                .find(|c| c.name == target.name)
                .ok_or_else(|| {
                    ReconcileError::Catalog(format!("Unknown column '{}'", target.name))
                })?;
            if modify {
                *column = target.clone();
            } else {
                column.default = target.default.clone();
            }
            Ok(())
        })
    }

    async fn drop_primary_key(&self, table: &str) -> Result<()> {
        let step = Step::DropPrimaryKey { columns: vec![] };
        self.write_step(table, &step, |shape| {
            remove_constraint(shape, "PRIMARY", |c| {
                matches!(c, ConstraintSpec::PrimaryKey { .. })
            })
        })
    }

    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()> {
        let step = Step::AddPrimaryKey {
            columns: columns.to_vec(),
        };
        self.write_step(table, &step, |shape| {
            if !shape.primary_key_columns().is_empty() {
                return Err(ReconcileError::Catalog("Multiple primary key defined".to_string()));
            }
            require_columns(shape, columns)?;
            require_not_null_key(shape, columns)?;
            shape.constraints.push(ConstraintSpec::PrimaryKey {
                columns: columns.to_vec(),
            });
            Ok(())
        })
    }

    async fn add_unique(&self, table: &str, unique: &UniqueKey) -> Result<()> {
        let step = Step::AddUnique {
            unique: unique.clone(),
        };
        self.write_step(table, &step, |shape| {
            if shape.unique_keys().any(|u| u.name == unique.name) {
                return Err(ReconcileError::Catalog(format!(
                    "Duplicate key name '{}'",
                    unique.name
                )));
            }
            require_columns(shape, &unique.columns)?;
            shape
                .constraints
                .push(ConstraintSpec::UniqueKey(unique.clone()));
            Ok(())
        })
    }

    async fn drop_unique(&self, table: &str, name: &str) -> Result<()> {
        let step = Step::DropUnique {
            name: name.to_string(),
        };
        self.write_step(table, &step, |shape| {
            remove_constraint(shape, name, |c| {
                matches!(c, ConstraintSpec::UniqueKey(u) if u.name == name)
            })
        })
    }

    async fn drop_foreign_key(&self, table: &str, name: &str) -> Result<()> {
        let step = Step::DropForeignKey {
            name: name.to_string(),
        };
        self.write_step(table, &step, |shape| {
            remove_constraint(shape, name, |c| {
                matches!(c, ConstraintSpec::ForeignKey(fk) if fk.name == name)
            })
        })
    }

    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKeySpec) -> Result<()> {
        let sql = self.dialect.generate_sql(
            table,
            &Step::AddForeignKey {
                foreign_key: foreign_key.clone(),
            },
        );
        self.write(sql, |state| {
            let referenced_ok = state
                .tables
                .get(&foreign_key.referenced_table)
                .is_some_and(|t| t.get_column(&foreign_key.referenced_column).is_some());
            if !referenced_ok {
                return Err(ReconcileError::Catalog(format!(
                    "Cannot add foreign key constraint '{}'",
                    foreign_key.name
                )));
            }
            let shape = state.table_mut(table)?;
            require_columns(shape, std::slice::from_ref(&foreign_key.column))?;
            shape
                .constraints
                .push(ConstraintSpec::ForeignKey(foreign_key.clone()));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LogicalType;

    fn carts() -> TableShape {
        TableShape::new("carts")
            .column(ColumnSpec::new("id", LogicalType::Integer).not_null())
            .primary_key(vec!["id".to_string()])
    }

    #[tokio::test]
    async fn test_live_shape_reads_back_seeded_table() {
        let catalog = MemoryCatalog::new().with_table(carts());
        assert!(catalog.table_exists("carts").await.unwrap());
        assert!(!catalog.table_exists("orders").await.unwrap());
        assert_eq!(catalog.live_shape("carts").await.unwrap(), carts());
    }

    #[tokio::test]
    async fn test_ddl_is_journaled_as_mysql() {
        let catalog = MemoryCatalog::new().with_table(carts());
        catalog
            .add_column("carts", &ColumnSpec::new("token", LogicalType::String(64)))
            .await
            .unwrap();

        assert_eq!(
            catalog.journal(),
            vec!["ALTER TABLE `carts` ADD COLUMN `token` VARCHAR(64) NULL".to_string()]
        );
        assert!(catalog.table("carts").unwrap().get_column("token").is_some());
    }

    #[tokio::test]
    async fn test_second_primary_key_is_rejected() {
        let catalog = MemoryCatalog::new().with_table(carts());
        let err = catalog
            .add_primary_key("carts", &["id".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Multiple primary key"));
    }

    #[tokio::test]
    async fn test_nullable_primary_key_is_refused() {
        let catalog = MemoryCatalog::new();
        let tags = TableShape::new("tags")
            .column(ColumnSpec::new("id", LogicalType::Integer))
            .primary_key(vec!["id".to_string()]);
        let err = catalog.create_table(&tags).await.unwrap_err();
        assert!(err.to_string().contains("must be NOT NULL"));
        assert!(catalog.table("tags").is_none());

        let keyless = TableShape::new("tags").column(ColumnSpec::new("id", LogicalType::Integer));
        let catalog = MemoryCatalog::new().with_table(keyless);
        let err = catalog
            .add_primary_key("tags", &["id".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be NOT NULL"));
        assert!(catalog.table("tags").unwrap().primary_key_columns().is_empty());
    }

    #[tokio::test]
    async fn test_referenced_table_cannot_be_dropped() {
        let items = TableShape::new("cart_items")
            .column(ColumnSpec::new("cart_id", LogicalType::Integer).not_null())
            .constraint(ConstraintSpec::ForeignKey(ForeignKeySpec {
                name: "cart_items_cart_id_foreign".to_string(),
                column: "cart_id".to_string(),
                referenced_table: "carts".to_string(),
                referenced_column: "id".to_string(),
                on_delete: Default::default(),
            }));
        let catalog = MemoryCatalog::new().with_table(carts()).with_table(items);

        assert!(catalog.drop_table("carts").await.is_err());
        catalog.drop_table("cart_items").await.unwrap();
        catalog.drop_table("carts").await.unwrap();
        assert!(catalog.table("carts").is_none());
    }

    #[tokio::test]
    async fn test_foreign_key_requires_referenced_table() {
        let catalog = MemoryCatalog::new().with_table(
            carts().column(ColumnSpec::new("user_id", LogicalType::Integer)),
        );
        let fk = ForeignKeySpec {
            name: "carts_user_id_foreign".to_string(),
            column: "user_id".to_string(),
            referenced_table: "users".to_string(),
            referenced_column: "id".to_string(),
            on_delete: Default::default(),
        };
        assert!(catalog.add_foreign_key("carts", &fk).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let catalog = MemoryCatalog::new()
            .with_table(carts())
            .fail_on("DROP PRIMARY KEY")
            .unreadable("orders");

        assert!(catalog.drop_primary_key("carts").await.is_err());
        assert_eq!(catalog.table("carts").unwrap(), carts());
        assert!(catalog.live_columns("orders").await.is_err());
    }
}
