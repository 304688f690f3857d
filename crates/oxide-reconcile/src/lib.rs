//! Declarative schema reconciliation for Rust.
//!
//! `oxide-reconcile` keeps a live MySQL catalog in line with table shapes
//! declared in code (or in a JSON schema document), without versioned
//! migration files:
//! - Missing tables are created from their declared shape
//! - Existing tables are diffed column by column and constraint by constraint
//! - Changes that could lose data are reported and never applied
//!
//! # Architecture
//!
//! - **Registry** - Declared table shapes, captured through `TableBuilder`
//! - **Differ** - Compares a declared shape with the live shape
//! - **Classifier** - Decides which changes are destructive
//! - **Planner** - Orders safe changes into executable steps
//! - **Catalog** - Reads and changes the live database (`CatalogPort`)
//! - **Executor** - Runs the whole pass and produces a `Report`
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_reconcile::prelude::*;
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register("users", |t| {
//!     t.increments("id");
//!     t.string("email", 255).not_null();
//!     t.unique("users_email_unique", &["email"]);
//! });
//!
//! let catalog = MySqlCatalog::new(pool);
//! let report = Reconciler::new(catalog, registry).reconcile().await?;
//! println!("{report}");
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Reconcile the database with a schema document
//! oxide-reconcile --schema demos/store_schema.json
//!
//! # Show what would change without issuing DDL
//! oxide-reconcile --schema demos/store_schema.json --dry-run
//!
//! # Drop and recreate every declared table
//! oxide-reconcile --schema demos/store_schema.json --force
//! ```

pub mod catalog;
pub mod changes;
pub mod classify;
pub mod dialect;
pub mod differ;
pub mod error;
pub mod executor;
pub mod planner;
pub mod registry;
pub mod report;
pub mod schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::catalog::{CatalogPort, MemoryCatalog, MySqlCatalog};
    pub use crate::changes::{ChangeSet, ColumnChange};
    pub use crate::dialect::MySqlDialect;
    pub use crate::differ::diff;
    pub use crate::error::{ReconcileError, Result};
    pub use crate::executor::Reconciler;
    pub use crate::planner::{plan, Plan, Step};
    pub use crate::registry::{SchemaRegistry, TableBuilder};
    pub use crate::report::{Report, TableOutcome};
    pub use crate::schema::{
        ColumnSpec, ConstraintSpec, DefaultValue, ForeignKeyAction, ForeignKeySpec, LogicalType,
        TableShape, UniqueKey,
    };
}
