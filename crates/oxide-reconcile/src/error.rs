//! Error types for the reconciler.

/// Errors that can occur while reconciling a schema.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Database error during introspection or DDL execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Catalog failure not originating from the database driver.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A live column uses a type outside the supported logical types.
    #[error("Unsupported type '{data_type}' for column '{table}.{column}'")]
    UnsupportedType {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Type as reported by the catalog.
        data_type: String,
    },

    /// A declared table is malformed. This is a programming error in the
    /// declarations and aborts the whole run.
    #[error("Malformed declaration for table '{table}': {reason}")]
    MalformedSchema {
        /// Table name.
        table: String,
        /// What is wrong with it.
        reason: String,
    },

    /// IO error (reading schema files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcileError {
    /// Returns whether this error is a run-level error that must abort the
    /// whole reconciliation instead of being recorded against one table.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedSchema { .. })
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
