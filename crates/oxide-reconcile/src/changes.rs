//! Change sets produced by the differ.
//!
//! A [`ChangeSet`] describes, for one table, everything that separates the
//! live shape from the declared shape. Every entry carries its own
//! destructive flag; [`ChangeSet::has_destructive_changes`] folds them into
//! the table-wide verdict.

use std::fmt;

use serde::Serialize;

use crate::classify;
use crate::schema::{ColumnSpec, ColumnType, DefaultValue, ForeignKeySpec};

/// A `from -> to` transition with its classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition<T> {
    /// Live value.
    pub from: T,
    /// Declared value.
    pub to: T,
    /// Whether applying the transition can lose data.
    pub destructive: bool,
}

/// Kind of column change, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Type change.
    Type,
    /// Nullability change.
    Nullable,
    /// Default value change.
    Default,
}

/// A single change to an existing column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnChange {
    /// The column type changes.
    Type(Transition<ColumnType>),
    /// The column nullability changes.
    Nullable(Transition<bool>),
    /// The column default changes.
    Default(Transition<Option<DefaultValue>>),
}

impl ColumnChange {
    /// Creates a classified type change.
    #[must_use]
    pub fn of_type(from: ColumnType, to: ColumnType) -> Self {
        let destructive = classify::type_change(&from, &to);
        Self::Type(Transition {
            from,
            to,
            destructive,
        })
    }

    /// Creates a classified nullability change.
    #[must_use]
    pub fn of_nullable(from: bool, to: bool) -> Self {
        Self::Nullable(Transition {
            from,
            to,
            destructive: classify::nullability_change(from, to),
        })
    }

    /// Creates a classified default change.
    #[must_use]
    pub fn of_default(from: Option<DefaultValue>, to: Option<DefaultValue>) -> Self {
        let destructive = classify::default_change(from.as_ref(), to.as_ref());
        Self::Default(Transition {
            from,
            to,
            destructive,
        })
    }

    /// Returns the change kind.
    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Type(_) => ChangeKind::Type,
            Self::Nullable(_) => ChangeKind::Nullable,
            Self::Default(_) => ChangeKind::Default,
        }
    }

    /// Returns whether the change is destructive.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        match self {
            Self::Type(t) => t.destructive,
            Self::Nullable(t) => t.destructive,
            Self::Default(t) => t.destructive,
        }
    }
}

impl fmt::Display for ColumnChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(t) => write!(f, "type {} -> {}", t.from, t.to),
            Self::Nullable(t) => write!(f, "nullable {} -> {}", t.from, t.to),
            Self::Default(t) => {
                let show = |v: &Option<DefaultValue>| {
                    v.as_ref().map_or_else(|| "none".to_string(), ToString::to_string)
                };
                write!(f, "default {} -> {}", show(&t.from), show(&t.to))
            }
        }
    }
}

/// All changes to one existing column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnAlteration {
    /// Column name.
    pub name: String,
    /// Declared definition the column converges to.
    pub target: ColumnSpec,
    /// Changes, at most one per kind, ordered type, nullable, default.
    pub changes: Vec<ColumnChange>,
}

impl ColumnAlteration {
    /// Returns the change of the given kind, if present.
    #[must_use]
    pub fn change(&self, kind: ChangeKind) -> Option<&ColumnChange> {
        self.changes.iter().find(|c| c.kind() == kind)
    }

    /// Returns whether any change is destructive.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        self.changes.iter().any(ColumnChange::is_destructive)
    }
}

/// Whether a constraint is being added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintAction {
    /// The constraint is declared but not live.
    Add,
    /// The constraint is live but no longer declared.
    Remove,
}

/// A unique constraint change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniqueChange {
    /// Add or remove.
    pub action: ConstraintAction,
    /// Declared name for additions, live name for removals.
    pub name: String,
    /// Constrained columns.
    pub columns: Vec<String>,
    /// Whether the change is destructive.
    pub destructive: bool,
}

impl UniqueChange {
    /// Creates a classified unique change.
    #[must_use]
    pub fn new(action: ConstraintAction, name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            action,
            name: name.into(),
            columns,
            destructive: classify::unique_change(action == ConstraintAction::Remove),
        }
    }
}

/// A foreign key change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyChange {
    /// Add or remove.
    pub action: ConstraintAction,
    /// Declared key for additions, live key for removals.
    pub foreign_key: ForeignKeySpec,
    /// Whether the change is destructive.
    pub destructive: bool,
}

impl ForeignKeyChange {
    /// Creates a classified foreign key change.
    #[must_use]
    pub fn new(action: ConstraintAction, foreign_key: ForeignKeySpec) -> Self {
        Self {
            action,
            foreign_key,
            destructive: classify::foreign_key_change(action == ConstraintAction::Remove),
        }
    }
}

/// Constraint-level changes of one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConstraintChanges {
    /// Primary key change, if the ordered key differs.
    pub primary: Option<Transition<Vec<String>>>,
    /// Unique constraint changes.
    pub unique: Vec<UniqueChange>,
    /// Foreign key changes.
    pub foreign: Vec<ForeignKeyChange>,
}

impl ConstraintChanges {
    /// Returns true if no constraint differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.unique.is_empty() && self.foreign.is_empty()
    }
}

/// Everything that separates a live table from its declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSet {
    /// Table name.
    pub table: String,
    /// Declared columns missing from the live table.
    pub columns_to_add: Vec<ColumnSpec>,
    /// Live columns no longer declared.
    pub columns_to_remove: Vec<String>,
    /// Columns present on both sides that differ.
    pub columns_to_alter: Vec<ColumnAlteration>,
    /// Constraint differences.
    pub constraint_changes: ConstraintChanges,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns_to_add: Vec::new(),
            columns_to_remove: Vec::new(),
            columns_to_alter: Vec::new(),
            constraint_changes: ConstraintChanges::default(),
        }
    }

    /// Returns true if live and declared shapes already agree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns_to_add.is_empty()
            && self.columns_to_remove.is_empty()
            && self.columns_to_alter.is_empty()
            && self.constraint_changes.is_empty()
    }

    /// Returns true iff at least one contained change is destructive.
    #[must_use]
    pub fn has_destructive_changes(&self) -> bool {
        let constraints = &self.constraint_changes;
        (!self.columns_to_remove.is_empty() && classify::column_removal())
            || self.columns_to_alter.iter().any(ColumnAlteration::is_destructive)
            || constraints.primary.as_ref().is_some_and(|p| p.destructive)
            || constraints.unique.iter().any(|u| u.destructive)
            || constraints.foreign.iter().any(|f| f.destructive)
    }

    /// Describes every destructive entry, one line each.
    #[must_use]
    pub fn destructive_items(&self) -> Vec<String> {
        let mut items: Vec<String> = self
            .columns_to_remove
            .iter()
            .map(|name| format!("drop column {name}"))
            .collect();

        for alteration in &self.columns_to_alter {
            for change in alteration.changes.iter().filter(|c| c.is_destructive()) {
                items.push(format!("alter column {}: {change}", alteration.name));
            }
        }

        let constraints = &self.constraint_changes;
        if let Some(primary) = constraints.primary.as_ref().filter(|p| p.destructive) {
            items.push(format!(
                "primary key ({}) -> ({})",
                primary.from.join(", "),
                primary.to.join(", ")
            ));
        }
        for unique in constraints.unique.iter().filter(|u| u.destructive) {
            items.push(format!(
                "drop unique {} ({})",
                unique.name,
                unique.columns.join(", ")
            ));
        }
        for foreign in constraints.foreign.iter().filter(|f| f.destructive) {
            items.push(format!(
                "drop foreign key {} ({})",
                foreign.foreign_key.name, foreign.foreign_key.column
            ));
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LogicalType;

    #[test]
    fn test_empty_change_set() {
        let changes = ChangeSet::new("products");
        assert!(changes.is_empty());
        assert!(!changes.has_destructive_changes());
        assert!(changes.destructive_items().is_empty());
    }

    #[test]
    fn test_column_removal_dominates() {
        let mut changes = ChangeSet::new("products");
        changes
            .columns_to_add
            .push(ColumnSpec::new("sku", LogicalType::String(64)));
        changes.columns_to_remove.push("legacy_field".to_string());

        assert!(changes.has_destructive_changes());
        assert_eq!(changes.destructive_items(), vec!["drop column legacy_field"]);
    }

    #[test]
    fn test_destructive_alteration_is_described() {
        let mut changes = ChangeSet::new("products");
        changes.columns_to_alter.push(ColumnAlteration {
            name: "stock".to_string(),
            target: ColumnSpec::new("stock", LogicalType::Integer).not_null(),
            changes: vec![ColumnChange::of_nullable(true, false)],
        });

        assert!(changes.has_destructive_changes());
        assert_eq!(
            changes.destructive_items(),
            vec!["alter column stock: nullable true -> false"]
        );
    }

    #[test]
    fn test_unique_addition_is_not_destructive() {
        let mut changes = ChangeSet::new("users");
        changes.constraint_changes.unique.push(UniqueChange::new(
            ConstraintAction::Add,
            "users_email_unique",
            vec!["email".to_string()],
        ));
        assert!(!changes.has_destructive_changes());

        changes.constraint_changes.unique.push(UniqueChange::new(
            ConstraintAction::Remove,
            "users_login_unique",
            vec!["login".to_string()],
        ));
        assert!(changes.has_destructive_changes());
    }

    #[test]
    fn test_change_lookup_by_kind() {
        let alteration = ColumnAlteration {
            name: "price".to_string(),
            target: ColumnSpec::new("price", LogicalType::Float),
            changes: vec![ColumnChange::of_default(
                None,
                Some(DefaultValue::Float(0.5)),
            )],
        };
        assert!(alteration.change(ChangeKind::Default).is_some());
        assert!(alteration.change(ChangeKind::Type).is_none());
        assert!(!alteration.is_destructive());
    }
}
