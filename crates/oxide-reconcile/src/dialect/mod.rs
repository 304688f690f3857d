//! SQL generation for the catalog adapters.
//!
//! The dialect knows how to spell each reconciliation step as a single DDL
//! statement. Identifiers cannot be bound as parameters, so every identifier
//! goes through [`MySqlDialect::quote_identifier`].

mod mysql;

pub use mysql::MySqlDialect;
