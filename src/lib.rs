//! # Tidemark
//!
//! Plan-driven, dialect-neutral schema migrations with resumable upgrades.
//!
//! Steps describe schema and data changes through fluent builders; a syntax
//! provider renders them for SQL Server, SQLite or PostgreSQL. Plans chain
//! steps between named states, and the upgrader walks a plan under a database
//! lock, persisting the state reached after every step.
//!
//! See [`migration`] for an end-to-end example.

pub mod config;
pub mod database;
pub mod error;
pub mod expressions;
pub mod metrics;
pub mod migration;
pub mod schema;
pub mod syntax;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::MigrationConfig;
pub use database::{Database, DatabaseProvider, DbError, Row, Value};
pub use error::MigrationError;
pub use migration::{
    Migration, MigrationContext, MigrationPlan, PlanBuilder, PlanRegistry, RunResult, Upgrader,
};
pub use schema::RowData;
pub use syntax::{syntax_for, syntax_for_database, SqlSyntaxProvider};
