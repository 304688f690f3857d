//! Declared table registry.
//!
//! The registry maps table names to builder functions. A builder describes a
//! table by calling methods on a [`TableBuilder`], which records the calls
//! into a [`TableShape`]. The same builder serves table creation and
//! diffing, so there is a single source of truth for every table.
//!
//! ```rust
//! use oxide_reconcile::registry::SchemaRegistry;
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register("products", |t| {
//!     t.increments("id");
//!     t.string("name", 255).not_null();
//!     t.float("price").not_null();
//! });
//!
//! let shapes = registry.declared_shapes().unwrap();
//! assert_eq!(shapes[0].columns.len(), 3);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};
use crate::schema::{
    ColumnSpec, ConstraintSpec, DefaultValue, ForeignKeyAction, ForeignKeySpec, LogicalType,
    TableShape, UniqueKey,
};

type Builder = Box<dyn Fn(&mut TableBuilder) + Send + Sync>;

/// Records builder calls into a [`TableShape`].
#[derive(Debug)]
pub struct TableBuilder {
    shape: TableShape,
}

impl TableBuilder {
    fn new(name: &str) -> Self {
        Self {
            shape: TableShape::new(name),
        }
    }

    fn finish(self) -> TableShape {
        self.shape.normalized()
    }

    /// Adds a fully specified column.
    pub fn column(&mut self, column: ColumnSpec) -> ColumnBuilder<'_> {
        self.shape.columns.push(column);
        let last = self.shape.columns.len() - 1;
        ColumnBuilder {
            column: &mut self.shape.columns[last],
        }
    }

    /// Adds a constraint.
    pub fn constraint(&mut self, constraint: ConstraintSpec) {
        self.shape.constraints.push(constraint);
    }

    /// Adds an unsigned auto-increment primary key column.
    pub fn increments(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.primary(&[name]);
        self.column(
            ColumnSpec::new(name, LogicalType::Integer)
                .unsigned()
                .not_null()
                .auto_increment(),
        )
    }

    /// Adds an integer column.
    pub fn integer(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.column(ColumnSpec::new(name, LogicalType::Integer))
    }

    /// Adds a float column.
    pub fn float(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.column(ColumnSpec::new(name, LogicalType::Float))
    }

    /// Adds a string column with a maximum length.
    pub fn string(&mut self, name: &str, length: u32) -> ColumnBuilder<'_> {
        self.column(ColumnSpec::new(name, LogicalType::String(length)))
    }

    /// Adds a boolean column.
    pub fn boolean(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.column(ColumnSpec::new(name, LogicalType::Boolean))
    }

    /// Adds a timestamp column.
    pub fn timestamp(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.column(ColumnSpec::new(name, LogicalType::Timestamp))
    }

    /// Adds a JSON column.
    pub fn json(&mut self, name: &str) -> ColumnBuilder<'_> {
        self.column(ColumnSpec::new(name, LogicalType::Json))
    }

    /// Declares the primary key. Key columns must be declared NOT NULL.
    pub fn primary(&mut self, columns: &[&str]) {
        self.constraint(ConstraintSpec::PrimaryKey {
            columns: columns.iter().map(ToString::to_string).collect(),
        });
    }

    /// Declares a unique constraint.
    pub fn unique(&mut self, name: &str, columns: &[&str]) {
        self.constraint(ConstraintSpec::UniqueKey(UniqueKey::new(
            name,
            columns.iter().map(ToString::to_string).collect(),
        )));
    }

    /// Starts a foreign key declaration on `column`.
    pub fn foreign(&mut self, name: &str, column: &str) -> ForeignKeyBuilder<'_> {
        ForeignKeyBuilder {
            table: self,
            name: name.to_string(),
            column: column.to_string(),
        }
    }
}

/// Chained modifiers for the column most recently added to a
/// [`TableBuilder`].
#[derive(Debug)]
pub struct ColumnBuilder<'a> {
    column: &'a mut ColumnSpec,
}

impl ColumnBuilder<'_> {
    /// Sets the column as NOT NULL.
    pub fn not_null(self) -> Self {
        self.column.nullable = false;
        self
    }

    /// Sets the column as nullable.
    pub fn nullable(self) -> Self {
        self.column.nullable = true;
        self
    }

    /// Sets the default value.
    pub fn default(self, value: DefaultValue) -> Self {
        self.column.default = Some(value);
        self
    }

    /// Marks an integer column as unsigned.
    pub fn unsigned(self) -> Self {
        self.column.unsigned = true;
        self
    }

    /// Adds a secondary index on the column.
    pub fn indexed(self) -> Self {
        self.column.indexed = true;
        self
    }
}

/// Builder for a foreign key started with [`TableBuilder::foreign`].
///
/// Nothing is recorded until [`ForeignKeyBuilder::references`] is called.
#[derive(Debug)]
pub struct ForeignKeyBuilder<'a> {
    table: &'a mut TableBuilder,
    name: String,
    column: String,
}

impl<'a> ForeignKeyBuilder<'a> {
    /// Sets the referenced table and column and records the foreign key.
    pub fn references(self, table: &str, column: &str) -> OnDelete<'a> {
        let index = self.table.shape.constraints.len();
        self.table
            .shape
            .constraints
            .push(ConstraintSpec::ForeignKey(ForeignKeySpec {
                name: self.name,
                column: self.column,
                referenced_table: table.to_string(),
                referenced_column: column.to_string(),
                on_delete: ForeignKeyAction::default(),
            }));
        OnDelete {
            table: self.table,
            index,
        }
    }
}

/// Optional `ON DELETE` policy for a just-recorded foreign key.
#[derive(Debug)]
pub struct OnDelete<'a> {
    table: &'a mut TableBuilder,
    index: usize,
}

impl OnDelete<'_> {
    /// Sets the `ON DELETE` action.
    pub fn on_delete(self, action: ForeignKeyAction) {
        if let Some(ConstraintSpec::ForeignKey(fk)) = self.table.shape.constraints.get_mut(self.index)
        {
            fk.on_delete = action;
        }
    }
}

/// JSON document accepted by [`SchemaRegistry::from_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Declared tables, in declaration order.
    pub tables: Vec<TableShape>,
}

/// Insertion-ordered mapping from table name to builder.
#[derive(Default)]
pub struct SchemaRegistry {
    tables: Vec<(String, Builder)>,
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("tables", &self.table_names().collect::<Vec<_>>())
            .finish()
    }
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table builder.
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F) -> &mut Self
    where
        F: Fn(&mut TableBuilder) + Send + Sync + 'static,
    {
        self.tables.push((name.into(), Box::new(builder)));
        self
    }

    /// Registers a table whose shape is already known.
    pub fn register_shape(&mut self, shape: TableShape) -> &mut Self {
        let name = shape.name.clone();
        self.register(name, move |t| {
            for column in &shape.columns {
                t.column(column.clone());
            }
            for constraint in &shape.constraints {
                t.constraint(constraint.clone());
            }
        })
    }

    /// Builds a registry from a JSON schema document.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Serialization`] if the document is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: SchemaDocument = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for table in document.tables {
            registry.register_shape(table);
        }
        Ok(registry)
    }

    /// Loads a registry from a JSON schema file.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Returns declared table names in declaration order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the number of declared tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no table is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Invokes a single builder and returns the recorded shape.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MalformedSchema`] if the table is not
    /// registered or its shape is invalid.
    pub fn build(&self, name: &str) -> Result<TableShape> {
        let (_, builder) = self
            .tables
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| ReconcileError::MalformedSchema {
                table: name.to_string(),
                reason: "table is not registered".to_string(),
            })?;
        let mut recorder = TableBuilder::new(name);
        builder(&mut recorder);
        let shape = recorder.finish();
        shape.validate()?;
        Ok(shape)
    }

    /// Builds every declared table once, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MalformedSchema`] for duplicate table
    /// registrations or any invalid table shape.
    pub fn declared_shapes(&self) -> Result<Vec<TableShape>> {
        let mut seen = HashSet::new();
        let mut shapes = Vec::with_capacity(self.tables.len());
        for (name, builder) in &self.tables {
            if !seen.insert(name.as_str()) {
                return Err(ReconcileError::MalformedSchema {
                    table: name.clone(),
                    reason: "table registered more than once".to_string(),
                });
            }
            let mut recorder = TableBuilder::new(name);
            builder(&mut recorder);
            let shape = recorder.finish();
            shape.validate()?;
            shapes.push(shape);
        }
        Ok(shapes)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn store_registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register("users", |t| {
                t.increments("id");
                t.string("email", 255).not_null();
                t.unique("users_email_unique", &["email"]);
            })
            .register("orders", |t| {
                t.increments("id");
                t.integer("user_id").unsigned().not_null().indexed();
                t.float("total").not_null().default(DefaultValue::Float(0.0));
                t.foreign("orders_user_id_foreign", "user_id")
                    .references("users", "id")
                    .on_delete(ForeignKeyAction::Cascade);
            });
        registry
    }

    #[test]
    fn test_builder_records_columns_and_constraints() {
        let shapes = store_registry().declared_shapes().unwrap();
        assert_eq!(shapes.len(), 2);

        let orders = &shapes[1];
        assert_eq!(orders.name, "orders");
        assert_eq!(orders.primary_key_columns(), ["id".to_string()]);

        let user_id = orders.get_column("user_id").unwrap();
        assert!(user_id.unsigned);
        assert!(user_id.indexed);
        assert!(!user_id.nullable);

        let fk = orders.foreign_keys().next().unwrap();
        assert_eq!(fk.referenced_table, "users");
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let registry = store_registry();
        let names: Vec<&str> = registry.table_names().collect();
        assert_eq!(names, vec!["users", "orders"]);
    }

    #[test]
    fn test_build_single_table() {
        let users = store_registry().build("users").unwrap();
        assert_eq!(users.unique_keys().count(), 1);
        assert!(store_registry().build("carts").is_err());
    }

    #[test]
    fn test_duplicate_column_is_malformed() {
        let mut registry = SchemaRegistry::new();
        registry.register("carts", |t| {
            t.increments("id");
            t.integer("id");
        });
        let err = registry.declared_shapes().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_duplicate_registration_is_malformed() {
        let mut registry = store_registry();
        registry.register("users", |t| {
            t.increments("id");
        });
        let err = registry.declared_shapes().unwrap_err();
        assert!(err.to_string().contains("registered more than once"));
    }

    #[test]
    fn test_nullable_primary_key_is_malformed() {
        let mut registry = SchemaRegistry::new();
        registry.register("tags", |t| {
            t.integer("id");
            t.primary(&["id"]);
        });
        let err = registry.declared_shapes().unwrap_err();
        assert!(err.to_string().contains("primary key column 'id' must be NOT NULL"));
    }

    #[test]
    fn test_defaults_are_normalized_to_column_type() {
        let mut registry = SchemaRegistry::new();
        registry.register("items", |t| {
            t.increments("id");
            t.float("price").not_null().default(DefaultValue::Integer(0));
            t.boolean("active").default(DefaultValue::Integer(1));
            t.timestamp("seen_at")
                .default(DefaultValue::Expression("now()".to_string()));
        });
        let items = registry.build("items").unwrap();

        let default_of = |name: &str| items.get_column(name).unwrap().default.clone();
        assert_eq!(default_of("price"), Some(DefaultValue::Float(0.0)));
        assert_eq!(default_of("active"), Some(DefaultValue::Bool(true)));
        assert_eq!(
            default_of("seen_at"),
            Some(DefaultValue::Expression("CURRENT_TIMESTAMP".to_string()))
        );
    }

    #[test]
    fn test_default_of_wrong_type_is_malformed() {
        let mut registry = SchemaRegistry::new();
        registry.register("items", |t| {
            t.increments("id");
            t.integer("qty").default(DefaultValue::String("many".to_string()));
        });
        let err = registry.declared_shapes().unwrap_err();
        assert!(err.to_string().contains("does not fit integer column 'qty'"));
    }

    #[test]
    fn test_load_from_file() {
        let shapes = store_registry().declared_shapes().unwrap();
        let document = SchemaDocument { tables: shapes.clone() };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&document).unwrap().as_bytes())
            .unwrap();

        let loaded = SchemaRegistry::load(file.path()).unwrap();
        assert_eq!(loaded.declared_shapes().unwrap(), shapes);
    }
}
