//! Catalog port.
//!
//! The [`CatalogPort`] trait is the boundary between the reconciler and a
//! concrete database: it reads live structural facts and executes one DDL
//! statement per write method. A port value is constructed once at startup
//! and handed to the [`Reconciler`](crate::executor::Reconciler).

mod memory;
mod mysql;

pub use memory::MemoryCatalog;
pub use mysql::MySqlCatalog;

use crate::changes::ColumnChange;
use crate::error::Result;
use crate::planner::Step;
use crate::schema::{ColumnSpec, ConstraintSpec, ForeignKeySpec, TableShape, UniqueKey};

/// Reads and changes the live database catalog.
///
/// Every write method issues exactly one DDL statement.
#[allow(async_fn_in_trait)]
pub trait CatalogPort {
    /// Returns whether the table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Returns the live columns, in ordinal order.
    async fn live_columns(&self, table: &str) -> Result<Vec<ColumnSpec>>;

    /// Returns the live primary key columns, empty if there is none.
    async fn live_primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// Returns the live unique constraints.
    async fn live_unique_constraints(&self, table: &str) -> Result<Vec<UniqueKey>>;

    /// Returns the live foreign keys.
    async fn live_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeySpec>>;

    /// Creates a table from its declared shape.
    async fn create_table(&self, shape: &TableShape) -> Result<()>;

    /// Drops a table if it exists.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Adds a column.
    async fn add_column(&self, table: &str, column: &ColumnSpec) -> Result<()>;

    /// Alters a column towards `target`.
    async fn alter_column(
        &self,
        table: &str,
        target: &ColumnSpec,
        changes: &[ColumnChange],
    ) -> Result<()>;

    /// Drops the primary key.
    async fn drop_primary_key(&self, table: &str) -> Result<()>;

    /// Adds a primary key.
    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()>;

    /// Adds a unique constraint.
    async fn add_unique(&self, table: &str, unique: &UniqueKey) -> Result<()>;

    /// Drops a unique constraint.
    async fn drop_unique(&self, table: &str, name: &str) -> Result<()>;

    /// Drops a foreign key.
    async fn drop_foreign_key(&self, table: &str, name: &str) -> Result<()>;

    /// Adds a foreign key.
    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKeySpec) -> Result<()>;

    /// Reads the complete live shape of a table.
    async fn live_shape(&self, table: &str) -> Result<TableShape> {
        let mut shape = TableShape::new(table);
        shape.columns = self.live_columns(table).await?;

        let primary_key = self.live_primary_key(table).await?;
        if !primary_key.is_empty() {
            shape.constraints.push(ConstraintSpec::PrimaryKey {
                columns: primary_key,
            });
        }
        for unique in self.live_unique_constraints(table).await? {
            shape.constraints.push(ConstraintSpec::UniqueKey(unique));
        }
        for fk in self.live_foreign_keys(table).await? {
            shape.constraints.push(ConstraintSpec::ForeignKey(fk));
        }

        Ok(shape)
    }

    /// Executes one planned step.
    async fn apply(&self, table: &str, step: &Step) -> Result<()> {
        match step {
            Step::AddColumn { column } => self.add_column(table, column).await,
            Step::AlterColumn { target, changes } => {
                self.alter_column(table, target, changes).await
            }
            Step::DropPrimaryKey { .. } => self.drop_primary_key(table).await,
            Step::AddPrimaryKey { columns } => self.add_primary_key(table, columns).await,
            Step::DropUnique { name } => self.drop_unique(table, name).await,
            Step::AddUnique { unique } => self.add_unique(table, unique).await,
            Step::DropForeignKey { name } => self.drop_foreign_key(table, name).await,
            Step::AddForeignKey { foreign_key } => self.add_foreign_key(table, foreign_key).await,
        }
    }
}
