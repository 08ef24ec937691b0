// crates/objfun-core/src/core/mod.rs
// ============================================================================
// Module: Core Types
// Description: Codec, identifiers, run states, payloads and study definitions.
// Purpose: Group the storage-independent lookup-table data model.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Storage-independent types shared by the coordinator, the stores and the
//! command line.

pub mod identifiers;
pub mod parameter;
pub mod payload;
pub mod state;
pub mod study;
