// crates/objfun-config/src/lib.rs
// ============================================================================
// Module: Objective Function Config Library
// Description: Canonical configuration model and validation.
// Purpose: Single source of truth for objfun.toml semantics.
// Dependencies: objfun-core, objfun-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `objfun-config` loads the TOML file shared by optimizer drivers and
//! workers. It validates fail-closed and converts the parameter tables into a
//! [`objfun_core::StudySpec`] and the storage tables into a
//! [`objfun_store_sqlite::SqliteStoreConfig`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
