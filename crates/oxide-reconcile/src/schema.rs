//! Table shape types.
//!
//! A [`TableShape`] is one snapshot of one table: either the shape declared
//! in code (see [`crate::registry`]) or the shape read back from the live
//! catalog (see [`crate::catalog`]). Both sides use the same value types so
//! the differ can compare them directly.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

/// Logical column types understood by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    /// Whole numbers.
    Integer,
    /// Double precision floating point.
    Float,
    /// Variable-length string with a maximum length.
    String(u32),
    /// Boolean flag.
    Boolean,
    /// Date and time.
    Timestamp,
    /// JSON document.
    Json,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::String(len) => write!(f, "string({len})"),
            Self::Boolean => f.write_str("boolean"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// The comparable type of a column: its logical type plus signedness.
///
/// Signedness only carries meaning for integers; it is always `false` for
/// other logical types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    /// Logical type.
    pub logical: LogicalType,
    /// Whether the integer is unsigned.
    pub unsigned: bool,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unsigned {
            write!(f, "unsigned {}", self.logical)
        } else {
            write!(f, "{}", self.logical)
        }
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// SQL expression (e.g., "CURRENT_TIMESTAMP").
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL representation of this default value.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''")),
            Self::Expression(expr) => expr.clone(),
        }
    }

    /// Returns the form MySQL reads this default back as on a column of the
    /// given type, or `None` if the value cannot be stored there.
    ///
    /// Declared and live defaults are both kept in this form so they compare
    /// equal once applied.
    #[must_use]
    pub fn canonical(&self, logical: LogicalType) -> Option<Self> {
        let value = match (self, logical) {
            (Self::Expression(expr), _) => Self::Expression(canonical_expression(expr)),
            (Self::Bool(b), LogicalType::Boolean) => Self::Bool(*b),
            (Self::Integer(0), LogicalType::Boolean) => Self::Bool(false),
            (Self::Integer(1), LogicalType::Boolean) => Self::Bool(true),
            (Self::Bool(b), LogicalType::Integer) => Self::Integer(i64::from(*b)),
            (Self::Integer(i), LogicalType::Integer) => Self::Integer(*i),
            (Self::Float(f), LogicalType::Float) => Self::Float(*f),
            #[allow(clippy::cast_precision_loss)]
            (Self::Integer(i), LogicalType::Float) => Self::Float(*i as f64),
            (Self::String(s), LogicalType::String(_) | LogicalType::Json | LogicalType::Timestamp) => {
                Self::String(s.clone())
            }
            (Self::Bool(_) | Self::Integer(_) | Self::Float(_), LogicalType::String(_)) => {
                Self::String(self.to_sql())
            }
            _ => return None,
        };
        Some(value)
    }
}

/// Spells keyword expressions in upper case and maps the aliases of the
/// current time onto `CURRENT_TIMESTAMP`. Expressions holding quoted text are
/// only trimmed.
fn canonical_expression(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.contains(['\'', '"']) {
        return trimmed.to_string();
    }
    let upper = trimmed.to_ascii_uppercase();
    match upper.as_str() {
        "NOW()" | "CURRENT_TIMESTAMP()" | "LOCALTIME" | "LOCALTIME()" | "LOCALTIMESTAMP"
        | "LOCALTIMESTAMP()" => "CURRENT_TIMESTAMP".to_string(),
        _ => upper,
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Referential action taken when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// Reject the delete while referencing rows exist.
    #[default]
    Restrict,
    /// Delete referencing rows as well.
    Cascade,
    /// Set the referencing column to NULL.
    SetNull,
    /// No action (checked at statement end).
    NoAction,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::NoAction => "NO ACTION",
        }
    }

    /// Parses the rule names reported by `information_schema`.
    #[must_use]
    pub fn from_rule(rule: &str) -> Self {
        match rule.to_ascii_uppercase().as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "NO ACTION" => Self::NoAction,
            _ => Self::Restrict,
        }
    }
}

/// Schema definition for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Logical data type.
    pub logical_type: LogicalType,
    /// Whether the column allows NULL values.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Default value, if any.
    #[serde(default)]
    pub default: Option<DefaultValue>,
    /// Whether an integer column is unsigned.
    #[serde(default)]
    pub unsigned: bool,
    /// Whether the column carries a plain secondary index.
    ///
    /// Only honoured when a table or column is created; index drift is not
    /// reconciled.
    #[serde(default)]
    pub indexed: bool,
    /// Whether the column auto-increments. Creation-time only, like `indexed`.
    #[serde(default)]
    pub auto_increment: bool,
}

const fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    /// Creates a new nullable column without a default.
    #[must_use]
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
            default: None,
            unsigned: false,
            indexed: false,
            auto_increment: false,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Marks an integer column as unsigned.
    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    /// Adds a secondary index on the column.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Returns the comparable type of this column.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        ColumnType {
            logical: self.logical_type,
            unsigned: self.unsigned && self.logical_type == LogicalType::Integer,
        }
    }
}

/// A named unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueKey {
    /// Constraint name.
    pub name: String,
    /// Columns that form the unique constraint.
    pub columns: Vec<String>,
}

impl UniqueKey {
    /// Creates a new unique constraint.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

/// A single-column foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    /// Constraint name.
    pub name: String,
    /// Referencing column.
    pub column: String,
    /// Referenced table.
    pub referenced_table: String,
    /// Referenced column.
    pub referenced_column: String,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
}

/// A table-level constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintSpec {
    /// Primary key over an ordered column list.
    PrimaryKey {
        /// Key columns, in key order.
        columns: Vec<String>,
    },
    /// Unique constraint.
    UniqueKey(UniqueKey),
    /// Foreign key constraint.
    ForeignKey(ForeignKeySpec),
}

/// One snapshot of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableShape {
    /// Table name.
    pub name: String,
    /// Column definitions, in declaration (or ordinal) order.
    pub columns: Vec<ColumnSpec>,
    /// Constraint definitions.
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
}

impl TableShape {
    /// Creates an empty table shape.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds a constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: ConstraintSpec) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Sets the primary key columns.
    #[must_use]
    pub fn primary_key(self, columns: Vec<String>) -> Self {
        self.constraint(ConstraintSpec::PrimaryKey { columns })
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the primary key columns, or an empty slice when there is none.
    #[must_use]
    pub fn primary_key_columns(&self) -> &[String] {
        self.constraints
            .iter()
            .find_map(|c| match c {
                ConstraintSpec::PrimaryKey { columns } => Some(columns.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Iterates over unique constraints.
    pub fn unique_keys(&self) -> impl Iterator<Item = &UniqueKey> {
        self.constraints.iter().filter_map(|c| match c {
            ConstraintSpec::UniqueKey(uk) => Some(uk),
            _ => None,
        })
    }

    /// Iterates over foreign keys.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKeySpec> {
        self.constraints.iter().filter_map(|c| match c {
            ConstraintSpec::ForeignKey(fk) => Some(fk),
            _ => None,
        })
    }

    /// Rewrites every column default into its canonical form.
    ///
    /// Defaults that do not fit their column are left untouched for
    /// [`validate`](Self::validate) to reject.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for column in &mut self.columns {
            if let Some(canonical) = column
                .default
                .as_ref()
                .and_then(|d| d.canonical(column.logical_type))
            {
                column.default = Some(canonical);
            }
        }
        self
    }

    /// Checks the structural rules every declared shape must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MalformedSchema`] for duplicate column
    /// names, defaults that do not fit their column, more than one primary
    /// key, nullable primary key columns, or constraints naming columns the
    /// table does not declare.
    pub fn validate(&self) -> Result<()> {
        let malformed = |reason: String| ReconcileError::MalformedSchema {
            table: self.name.clone(),
            reason,
        };

        if self.columns.is_empty() {
            return Err(malformed("table declares no columns".to_string()));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(malformed(format!("duplicate column '{}'", column.name)));
            }
            if let Some(default) = &column.default {
                if default.canonical(column.logical_type).is_none() {
                    return Err(malformed(format!(
                        "default {default} does not fit {} column '{}'",
                        column.logical_type, column.name
                    )));
                }
            }
        }

        let primary_keys = self
            .constraints
            .iter()
            .filter(|c| matches!(c, ConstraintSpec::PrimaryKey { .. }))
            .count();
        if primary_keys > 1 {
            return Err(malformed(format!("{primary_keys} primary keys declared")));
        }

        let check = |kind: &str, column: &str| {
            if seen.contains(column) {
                Ok(())
            } else {
                Err(malformed(format!("{kind} references unknown column '{column}'")))
            }
        };
        for constraint in &self.constraints {
            match constraint {
                ConstraintSpec::PrimaryKey { columns } => {
                    if columns.is_empty() {
                        return Err(malformed("empty primary key".to_string()));
                    }
                    for col in columns {
                        check("primary key", col)?;
                        if self.get_column(col).is_some_and(|c| c.nullable) {
                            return Err(malformed(format!(
                                "primary key column '{col}' must be NOT NULL"
                            )));
                        }
                    }
                }
                ConstraintSpec::UniqueKey(uk) => {
                    if uk.columns.is_empty() {
                        return Err(malformed(format!("unique key '{}' has no columns", uk.name)));
                    }
                    for col in &uk.columns {
                        check("unique key", col)?;
                    }
                }
                ConstraintSpec::ForeignKey(fk) => check("foreign key", &fk.column)?,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableShape {
        TableShape::new("users")
            .column(
                ColumnSpec::new("id", LogicalType::Integer)
                    .unsigned()
                    .not_null()
                    .auto_increment(),
            )
            .column(ColumnSpec::new("email", LogicalType::String(255)).not_null())
            .primary_key(vec!["id".to_string()])
    }

    #[test]
    fn test_column_spec_builder() {
        let col = ColumnSpec::new("qty", LogicalType::Integer)
            .unsigned()
            .not_null()
            .default(DefaultValue::Integer(1));

        assert_eq!(col.name, "qty");
        assert!(!col.nullable);
        assert!(col.unsigned);
        assert_eq!(col.default, Some(DefaultValue::Integer(1)));
    }

    #[test]
    fn test_unsigned_only_counts_for_integers() {
        let col = ColumnSpec::new("price", LogicalType::Float).unsigned();
        assert!(!col.column_type().unsigned);

        let col = ColumnSpec::new("qty", LogicalType::Integer).unsigned();
        assert!(col.column_type().unsigned);
    }

    #[test]
    fn test_primary_key_accessor() {
        assert_eq!(users().primary_key_columns(), ["id".to_string()]);
        assert!(TableShape::new("t").primary_key_columns().is_empty());
    }

    #[test]
    fn test_validate_accepts_well_formed_table() {
        users().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_duplicate_columns() {
        let table = users().column(ColumnSpec::new("email", LogicalType::Json));
        let err = table.validate().unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedSchema { .. }));
        assert!(err.to_string().contains("duplicate column 'email'"));
    }

    #[test]
    fn test_validate_rejects_two_primary_keys() {
        let table = users().primary_key(vec!["email".to_string()]);
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_constraint_column() {
        let table = users().constraint(ConstraintSpec::UniqueKey(UniqueKey::new(
            "users_login_unique",
            vec!["login".to_string()],
        )));
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("unknown column 'login'"));
    }

    #[test]
    fn test_validate_rejects_nullable_primary_key_column() {
        let table = TableShape::new("tags")
            .column(ColumnSpec::new("id", LogicalType::Integer))
            .primary_key(vec!["id".to_string()]);
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("must be NOT NULL"));
    }

    #[test]
    fn test_validate_rejects_misfit_default() {
        let table = users().column(
            ColumnSpec::new("active", LogicalType::Boolean).default(DefaultValue::Float(0.5)),
        );
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_canonical_defaults() {
        let canonical = |value: DefaultValue, logical| value.canonical(logical);

        assert_eq!(
            canonical(DefaultValue::Integer(0), LogicalType::Float),
            Some(DefaultValue::Float(0.0))
        );
        assert_eq!(
            canonical(DefaultValue::Integer(1), LogicalType::Boolean),
            Some(DefaultValue::Bool(true))
        );
        assert_eq!(canonical(DefaultValue::Integer(2), LogicalType::Boolean), None);
        assert_eq!(
            canonical(DefaultValue::Bool(true), LogicalType::String(8)),
            Some(DefaultValue::String("1".to_string()))
        );
        assert_eq!(
            canonical(DefaultValue::String("x".to_string()), LogicalType::Integer),
            None
        );
        for alias in ["now()", "current_timestamp()", "Current_Timestamp", " NOW() "] {
            assert_eq!(
                canonical(DefaultValue::Expression(alias.to_string()), LogicalType::Timestamp),
                Some(DefaultValue::Expression("CURRENT_TIMESTAMP".to_string()))
            );
        }
        assert_eq!(
            canonical(DefaultValue::Expression("uuid()".to_string()), LogicalType::String(36)),
            Some(DefaultValue::Expression("UUID()".to_string()))
        );
    }

    #[test]
    fn test_default_value_to_sql() {
        assert_eq!(DefaultValue::Bool(true).to_sql(), "1");
        assert_eq!(DefaultValue::Integer(42).to_sql(), "42");
        assert_eq!(DefaultValue::String("it's".to_string()).to_sql(), "'it''s'");
        assert_eq!(DefaultValue::String("a\\".to_string()).to_sql(), "'a\\\\'");
        assert_eq!(
            DefaultValue::Expression("CURRENT_TIMESTAMP".to_string()).to_sql(),
            "CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn test_shape_round_trips_through_json() {
        let json = serde_json::to_string(&users()).unwrap();
        let back: TableShape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, users());
    }
}
