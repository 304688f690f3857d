//! Run report.
//!
//! One [`TableReport`] per declared table, in declaration order. The report
//! renders as a human-readable summary through `Display` and as JSON through
//! serde.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to one table during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// The table was missing and has been created.
    Created,
    /// The table was dropped and created again (force mode).
    Recreated,
    /// Live and declared shapes already agree.
    Unchanged,
    /// Non-destructive changes were applied.
    Applied {
        /// Applied steps, in order.
        steps: Vec<String>,
    },
    /// Destructive changes were found; nothing was applied.
    Skipped {
        /// Every destructive change found.
        destructive: Vec<String>,
    },
    /// A catalog error stopped the table.
    Failed {
        /// The triggering error.
        error: String,
        /// Steps applied before the failure. They are not rolled back.
        applied: Vec<String>,
    },
}

/// Outcome for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    /// Table name.
    pub table: String,
    /// Outcome.
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

/// Summary of a reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Whether DDL was only planned, not executed.
    pub dry_run: bool,
    /// Per-table outcomes, in declaration order.
    pub tables: Vec<TableReport>,
}

impl Report {
    /// Returns the outcome recorded for `table`.
    #[must_use]
    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| &t.outcome)
    }

    /// Returns true if any table failed. Skipped tables are not failures.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.count(|o| matches!(o, TableOutcome::Failed { .. })) > 0
    }

    /// Number of tables skipped because of destructive changes.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Skipped { .. }))
    }

    /// Number of tables that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&TableOutcome) -> bool) -> usize {
        self.tables.iter().filter(|t| predicate(&t.outcome)).count()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "Schema reconciliation (dry run, nothing executed)")?;
        } else {
            writeln!(f, "Schema reconciliation")?;
        }
        writeln!(f, "{:-<60}", "")?;

        for entry in &self.tables {
            match &entry.outcome {
                TableOutcome::Created => writeln!(f, " [+] {}: created", entry.table)?,
                TableOutcome::Recreated => writeln!(f, " [+] {}: recreated", entry.table)?,
                TableOutcome::Unchanged => writeln!(f, " [=] {}: up to date", entry.table)?,
                TableOutcome::Applied { steps } => {
                    writeln!(f, " [~] {}: {} change(s)", entry.table, steps.len())?;
                    for step in steps {
                        writeln!(f, "       {step}")?;
                    }
                }
                TableOutcome::Skipped { destructive } => {
                    writeln!(f, " [!] {}: skipped, destructive changes", entry.table)?;
                    for item in destructive {
                        writeln!(f, "       {item}")?;
                    }
                }
                TableOutcome::Failed { error, applied } => {
                    writeln!(f, " [x] {}: failed: {error}", entry.table)?;
                    for step in applied {
                        writeln!(f, "       applied before failure: {step}")?;
                    }
                }
            }
        }

        writeln!(f, "{:-<60}", "")?;
        write!(
            f,
            "{} table(s), {} skipped, {} failed",
            self.tables.len(),
            self.skipped(),
            self.failed()
        )
    }
}
