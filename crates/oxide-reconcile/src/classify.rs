//! Destructive change classification.
//!
//! Each rule answers one question: can applying this change lose data or
//! silently weaken an integrity guarantee? A `true` answer marks the change
//! destructive, which keeps the whole table out of automatic reconciliation.

use crate::schema::{ColumnType, DefaultValue, LogicalType};

/// Classifies a column type change.
///
/// Only transitions on the widening allow-list are safe:
/// integer to float, and a string growing (or keeping) its maximum length.
/// Every signedness change is destructive.
#[must_use]
pub fn type_change(from: &ColumnType, to: &ColumnType) -> bool {
    if from == to {
        return false;
    }
    match (from.logical, to.logical) {
        (LogicalType::Integer, LogicalType::Integer) => true,
        (LogicalType::Integer, LogicalType::Float) => false,
        (LogicalType::String(old), LogicalType::String(new)) => new < old,
        _ => true,
    }
}

/// Classifies a nullability change. Tightening to NOT NULL is destructive
/// because existing NULLs would violate it.
#[must_use]
pub fn nullability_change(from: bool, to: bool) -> bool {
    from && !to
}

/// Classifies a default value change. Defaults only affect future inserts.
#[must_use]
pub fn default_change(_from: Option<&DefaultValue>, _to: Option<&DefaultValue>) -> bool {
    false
}

/// Classifies a column removal.
#[must_use]
pub fn column_removal() -> bool {
    true
}

/// Classifies a primary key change: removing any column from the key is
/// destructive, widening or first-time assignment is not.
#[must_use]
pub fn primary_key_change(from: &[String], to: &[String]) -> bool {
    from.iter().any(|column| !to.contains(column))
}

/// Classifies a unique constraint change. Removal is destructive; addition is
/// optimistic and left to the catalog to reject on duplicate data.
#[must_use]
pub fn unique_change(removal: bool) -> bool {
    removal
}

/// Classifies a foreign key change. Removal is destructive; addition fails
/// loudly at the catalog if orphans exist.
#[must_use]
pub fn foreign_key_change(removal: bool) -> bool {
    removal
}
