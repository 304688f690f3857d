//! Reconciliation executor.
//!
//! This module drives a run: it creates missing tables, diffs the rest
//! against the live catalog and applies the non-destructive plans.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::catalog::CatalogPort;
use crate::changes::ChangeSet;
use crate::differ::diff;
use crate::error::Result;
use crate::planner::plan;
use crate::registry::SchemaRegistry;
use crate::report::{Report, TableOutcome, TableReport};
use crate::schema::TableShape;

/// Reconciles declared tables against a catalog.
pub struct Reconciler<C: CatalogPort> {
    catalog: C,
    registry: SchemaRegistry,
    dry_run: bool,
}

impl<C: CatalogPort> Reconciler<C> {
    /// Creates a new reconciler.
    pub fn new(catalog: C, registry: SchemaRegistry) -> Self {
        Self {
            catalog,
            registry,
            dry_run: false,
        }
    }

    /// Enables dry-run mode (the catalog is read but no DDL is issued).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Diffs one declared shape against its live counterpart.
    pub async fn change_set(&self, declared: &TableShape) -> Result<ChangeSet> {
        let live = self.catalog.live_shape(&declared.name).await?;
        Ok(diff(declared, &live))
    }

    /// Runs one reconciliation pass.
    ///
    /// Per-table problems end up in the report; the run continues with the
    /// next table.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MalformedSchema`](crate::error::ReconcileError::MalformedSchema)
    /// if a declaration is invalid. Nothing is read or written in that case.
    pub async fn reconcile(&self) -> Result<Report> {
        let started_at = Utc::now();
        let shapes = self.registry.declared_shapes()?;
        info!(
            tables = shapes.len(),
            dry_run = self.dry_run,
            "Starting schema reconciliation"
        );

        let mut outcomes: HashMap<&str, TableOutcome> = HashMap::with_capacity(shapes.len());

        for shape in &shapes {
            if let Some(outcome) = self.create_if_missing(shape).await {
                outcomes.insert(shape.name.as_str(), outcome);
            }
        }

        for shape in &shapes {
            if outcomes.contains_key(shape.name.as_str()) {
                continue;
            }
            let outcome = self.reconcile_table(shape).await;
            outcomes.insert(shape.name.as_str(), outcome);
        }

        let tables = shapes
            .iter()
            .map(|shape| TableReport {
                table: shape.name.clone(),
                outcome: outcomes
                    .remove(shape.name.as_str())
                    .unwrap_or(TableOutcome::Unchanged),
            })
            .collect();

        let report = Report {
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            tables,
        };
        info!(
            skipped = report.skipped(),
            failed = report.failed(),
            "Schema reconciliation finished"
        );
        Ok(report)
    }

    /// Drops every declared table, then creates them again.
    ///
    /// Tables are dropped in reverse declaration order and created in
    /// declaration order. The differ is bypassed and all data is lost.
    ///
    /// Declarations must list a referenced table before the tables whose
    /// foreign keys point at it. Otherwise the referenced table cannot be
    /// dropped while its dependents still exist, and it is reported failed.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MalformedSchema`](crate::error::ReconcileError::MalformedSchema)
    /// if a declaration is invalid.
    pub async fn recreate_all(&self) -> Result<Report> {
        let started_at = Utc::now();
        let shapes = self.registry.declared_shapes()?;
        warn!(tables = shapes.len(), "Recreating every declared table");

        let mut failures: HashMap<&str, String> = HashMap::new();

        for shape in shapes.iter().rev() {
            info!(table = %shape.name, "Dropping table");
            if self.dry_run {
                continue;
            }
            if let Err(e) = self.catalog.drop_table(&shape.name).await {
                error!(table = %shape.name, error = %e, "Failed to drop table");
                failures.insert(shape.name.as_str(), e.to_string());
            }
        }

        for shape in &shapes {
            if failures.contains_key(shape.name.as_str()) {
                continue;
            }
            info!(table = %shape.name, "Creating table");
            if self.dry_run {
                continue;
            }
            if let Err(e) = self.catalog.create_table(shape).await {
                error!(table = %shape.name, error = %e, "Failed to create table");
                failures.insert(shape.name.as_str(), e.to_string());
            }
        }

        let tables = shapes
            .iter()
            .map(|shape| TableReport {
                table: shape.name.clone(),
                outcome: match failures.remove(shape.name.as_str()) {
                    Some(error) => TableOutcome::Failed {
                        error,
                        applied: Vec::new(),
                    },
                    None => TableOutcome::Recreated,
                },
            })
            .collect();

        Ok(Report {
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            tables,
        })
    }

    /// Creation phase for one table. Returns `None` if the table exists.
    async fn create_if_missing(&self, shape: &TableShape) -> Option<TableOutcome> {
        match self.catalog.table_exists(&shape.name).await {
            Ok(true) => None,
            Ok(false) => {
                info!(table = %shape.name, "Creating missing table");
                if self.dry_run {
                    return Some(TableOutcome::Created);
                }
                match self.catalog.create_table(shape).await {
                    Ok(()) => Some(TableOutcome::Created),
                    Err(e) => {
                        error!(table = %shape.name, error = %e, "Failed to create table");
                        Some(failed(e.to_string(), Vec::new()))
                    }
                }
            }
            Err(e) => {
                error!(table = %shape.name, error = %e, "Failed to read catalog");
                Some(failed(e.to_string(), Vec::new()))
            }
        }
    }

    /// Diff phase for one existing table.
    async fn reconcile_table(&self, shape: &TableShape) -> TableOutcome {
        let changes = match self.change_set(shape).await {
            Ok(changes) => changes,
            Err(e) => {
                error!(table = %shape.name, error = %e, "Failed to read live table");
                return failed(e.to_string(), Vec::new());
            }
        };

        if changes.is_empty() {
            debug!(table = %shape.name, "Table is up to date");
            return TableOutcome::Unchanged;
        }

        if changes.has_destructive_changes() {
            let destructive = changes.destructive_items();
            for item in &destructive {
                warn!(table = %shape.name, change = %item, "Destructive change detected");
            }
            warn!(
                table = %shape.name,
                count = destructive.len(),
                "Skipping table with destructive changes"
            );
            return TableOutcome::Skipped { destructive };
        }

        let plan = plan(&shape.name, &changes);
        let mut applied = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            info!(table = %shape.name, step = %step, "Applying step");
            if !self.dry_run {
                if let Err(e) = self.catalog.apply(&shape.name, step).await {
                    error!(
                        table = %shape.name,
                        step = %step,
                        error = %e,
                        "Step failed, abandoning table"
                    );
                    return failed(e.to_string(), applied);
                }
            }
            applied.push(step.description());
        }

        TableOutcome::Applied { steps: applied }
    }
}

fn failed(error: String, applied: Vec<String>) -> TableOutcome {
    TableOutcome::Failed { error, applied }
}
