//! Schema differ.
//!
//! Compares the declared shape of a table with its live shape and produces
//! the [`ChangeSet`] that would bring the live table in line. The diff is a
//! pure function: output order follows declaration order for additions and
//! alterations, and live order for removals, so the same inputs always yield
//! the same change set.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::changes::{
    ChangeSet, ColumnAlteration, ColumnChange, ConstraintAction, ForeignKeyChange, Transition,
    UniqueChange,
};
use crate::classify;
use crate::schema::{ColumnSpec, TableShape};

/// Compares `declared` against `live` and returns the changes needed.
#[must_use]
pub fn diff(declared: &TableShape, live: &TableShape) -> ChangeSet {
    let mut changes = ChangeSet::new(&declared.name);

    diff_columns(declared, live, &mut changes);
    diff_primary_key(declared, live, &mut changes);
    diff_unique_keys(declared, live, &mut changes);
    diff_foreign_keys(declared, live, &mut changes);

    changes
}

fn diff_columns(declared: &TableShape, live: &TableShape, changes: &mut ChangeSet) {
    let live_cols: HashMap<&str, &ColumnSpec> =
        live.columns.iter().map(|c| (c.name.as_str(), c)).collect();
    let declared_names: HashSet<&str> = declared.columns.iter().map(|c| c.name.as_str()).collect();

    for column in &declared.columns {
        match live_cols.get(column.name.as_str()) {
            None => changes.columns_to_add.push(column.clone()),
            Some(live_col) => {
                if let Some(alteration) = diff_column(column, live_col) {
                    changes.columns_to_alter.push(alteration);
                }
            }
        }
    }

    changes.columns_to_remove = live
        .columns
        .iter()
        .filter(|c| !declared_names.contains(c.name.as_str()))
        .map(|c| c.name.clone())
        .collect();
}

/// Compares type, nullability and default of one column, in that order.
fn diff_column(declared: &ColumnSpec, live: &ColumnSpec) -> Option<ColumnAlteration> {
    let mut column_changes = Vec::new();

    if declared.column_type() != live.column_type() {
        column_changes.push(ColumnChange::of_type(
            live.column_type(),
            declared.column_type(),
        ));
    }

    if declared.nullable != live.nullable {
        column_changes.push(ColumnChange::of_nullable(live.nullable, declared.nullable));
    }

    if declared.default != live.default {
        column_changes.push(ColumnChange::of_default(
            live.default.clone(),
            declared.default.clone(),
        ));
    }

    if column_changes.is_empty() {
        None
    } else {
        Some(ColumnAlteration {
            name: declared.name.clone(),
            target: declared.clone(),
            changes: column_changes,
        })
    }
}

fn diff_primary_key(declared: &TableShape, live: &TableShape, changes: &mut ChangeSet) {
    let from = live.primary_key_columns();
    let to = declared.primary_key_columns();

    if from != to {
        changes.constraint_changes.primary = Some(Transition {
            from: from.to_vec(),
            to: to.to_vec(),
            destructive: classify::primary_key_change(from, to),
        });
    }
}

/// Unique keys match on their column set; names are ignored.
fn diff_unique_keys(declared: &TableShape, live: &TableShape, changes: &mut ChangeSet) {
    fn column_set(columns: &[String]) -> BTreeSet<&str> {
        columns.iter().map(String::as_str).collect()
    }

    let live_sets: Vec<BTreeSet<&str>> = live.unique_keys().map(|u| column_set(&u.columns)).collect();
    let declared_sets: Vec<BTreeSet<&str>> =
        declared.unique_keys().map(|u| column_set(&u.columns)).collect();

    for unique in live.unique_keys() {
        if !declared_sets.contains(&column_set(&unique.columns)) {
            changes.constraint_changes.unique.push(UniqueChange::new(
                ConstraintAction::Remove,
                &unique.name,
                unique.columns.clone(),
            ));
        }
    }

    for unique in declared.unique_keys() {
        if !live_sets.contains(&column_set(&unique.columns)) {
            changes.constraint_changes.unique.push(UniqueChange::new(
                ConstraintAction::Add,
                &unique.name,
                unique.columns.clone(),
            ));
        }
    }
}

/// Foreign keys match on the constrained column only. Catalog-generated
/// names and exact targets are not compared.
fn diff_foreign_keys(declared: &TableShape, live: &TableShape, changes: &mut ChangeSet) {
    let live_columns: HashSet<&str> = live.foreign_keys().map(|fk| fk.column.as_str()).collect();
    let declared_columns: HashSet<&str> =
        declared.foreign_keys().map(|fk| fk.column.as_str()).collect();

    for fk in live.foreign_keys() {
        if !declared_columns.contains(fk.column.as_str()) {
            changes
                .constraint_changes
                .foreign
                .push(ForeignKeyChange::new(ConstraintAction::Remove, fk.clone()));
        }
    }

    for fk in declared.foreign_keys() {
        if !live_columns.contains(fk.column.as_str()) {
            changes
                .constraint_changes
                .foreign
                .push(ForeignKeyChange::new(ConstraintAction::Add, fk.clone()));
        }
    }
}
