//! Reconciliation planner.
//!
//! Turns a [`ChangeSet`] into an ordered list of [`Step`]s. The order is
//! fixed and does not depend on the content of the change set:
//!
//! 1. column additions
//! 2. column alterations (type, nullability, default within a column)
//! 3. primary key removal
//! 4. primary key addition
//! 5. unique removals, then additions
//! 6. foreign key removals, then additions
//!
//! There is no step for dropping a column.

use std::fmt;

use serde::Serialize;

use crate::changes::{ChangeSet, ColumnChange, ConstraintAction};
use crate::schema::{ColumnSpec, ForeignKeySpec, UniqueKey};

/// A single DDL step against one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Add a column.
    AddColumn {
        /// Column definition.
        column: ColumnSpec,
    },
    /// Alter an existing column.
    AlterColumn {
        /// Declared definition of the column.
        target: ColumnSpec,
        /// Ordered changes to apply.
        changes: Vec<ColumnChange>,
    },
    /// Drop the primary key.
    DropPrimaryKey {
        /// Live key columns, for reporting.
        columns: Vec<String>,
    },
    /// Add the primary key.
    AddPrimaryKey {
        /// Key columns.
        columns: Vec<String>,
    },
    /// Drop a unique constraint.
    DropUnique {
        /// Live constraint name.
        name: String,
    },
    /// Add a unique constraint.
    AddUnique {
        /// Constraint to add.
        unique: UniqueKey,
    },
    /// Drop a foreign key.
    DropForeignKey {
        /// Live constraint name.
        name: String,
    },
    /// Add a foreign key.
    AddForeignKey {
        /// Foreign key to add.
        foreign_key: ForeignKeySpec,
    },
}

impl Step {
    /// Returns a short human-readable description.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::AddColumn { column } => {
                format!("add column {} {}", column.name, column.column_type())
            }
            Self::AlterColumn { target, changes } => {
                let parts: Vec<String> = changes.iter().map(ToString::to_string).collect();
                format!("alter column {} ({})", target.name, parts.join(", "))
            }
            Self::DropPrimaryKey { columns } => {
                format!("drop primary key ({})", columns.join(", "))
            }
            Self::AddPrimaryKey { columns } => format!("add primary key ({})", columns.join(", ")),
            Self::DropUnique { name } => format!("drop unique {name}"),
            Self::AddUnique { unique } => {
                format!("add unique {} ({})", unique.name, unique.columns.join(", "))
            }
            Self::DropForeignKey { name } => format!("drop foreign key {name}"),
            Self::AddForeignKey { foreign_key } => format!(
                "add foreign key {} ({}) -> {}({})",
                foreign_key.name,
                foreign_key.column,
                foreign_key.referenced_table,
                foreign_key.referenced_column
            ),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// The ordered steps for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    /// Table name.
    pub table: String,
    /// Steps, in execution order.
    pub steps: Vec<Step>,
}

impl Plan {
    /// Returns true if there is nothing to execute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Orders a change set into executable steps.
///
/// Only non-destructive change sets reach the planner; `columns_to_remove`
/// is never looked at.
#[must_use]
pub fn plan(table: &str, changes: &ChangeSet) -> Plan {
    let mut steps: Vec<Step> = changes
        .columns_to_add
        .iter()
        .map(|column| Step::AddColumn {
            column: column.clone(),
        })
        .collect();

    for alteration in &changes.columns_to_alter {
        let mut ordered = alteration.changes.clone();
        ordered.sort_by_key(ColumnChange::kind);
        steps.push(Step::AlterColumn {
            target: alteration.target.clone(),
            changes: ordered,
        });
    }

    let constraints = &changes.constraint_changes;
    if let Some(primary) = &constraints.primary {
        if !primary.from.is_empty() {
            steps.push(Step::DropPrimaryKey {
                columns: primary.from.clone(),
            });
        }
        if !primary.to.is_empty() {
            steps.push(Step::AddPrimaryKey {
                columns: primary.to.clone(),
            });
        }
    }

    let (unique_removals, unique_additions): (Vec<_>, Vec<_>) = constraints
        .unique
        .iter()
        .partition(|u| u.action == ConstraintAction::Remove);
    steps.extend(
        unique_removals
            .into_iter()
            .map(|u| Step::DropUnique { name: u.name.clone() }),
    );
    steps.extend(unique_additions.into_iter().map(|u| Step::AddUnique {
        unique: UniqueKey::new(&u.name, u.columns.clone()),
    }));

    let (fk_removals, fk_additions): (Vec<_>, Vec<_>) = constraints
        .foreign
        .iter()
        .partition(|f| f.action == ConstraintAction::Remove);
    steps.extend(fk_removals.into_iter().map(|f| Step::DropForeignKey {
        name: f.foreign_key.name.clone(),
    }));
    steps.extend(fk_additions.into_iter().map(|f| Step::AddForeignKey {
        foreign_key: f.foreign_key.clone(),
    }));

    Plan {
        table: table.to_string(),
        steps,
    }
}
