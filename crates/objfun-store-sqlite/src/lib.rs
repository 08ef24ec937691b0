// crates/objfun-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Lookup Store
// Description: Durable LookupStore backend using SQLite WAL.
// Purpose: Persist studies, scenarios and runs shared by optimizer and workers.
// Dependencies: objfun-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`LookupStore`] implementation. Every
//! coordinator transaction runs as `BEGIN IMMEDIATE`, so processes holding
//! separate connections to the same database file serialize their
//! read-then-write sequences and never claim the same run twice.
//! Security posture: database contents are untrusted and validated on load.
//!
//! [`LookupStore`]: objfun_core::LookupStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::DEFAULT_DB_FILE;
pub use store::SqliteLookupStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
