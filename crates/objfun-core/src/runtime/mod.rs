// crates/objfun-core/src/runtime/mod.rs
// ============================================================================
// Module: Lookup Runtime
// Description: Coordinator state machine, objective adapters and in-memory store.
// Purpose: Drive lookups, claims and deposits through a `LookupStore`.
// Dependencies: crate::core, crate::interfaces, rand, tracing
// ============================================================================

//! ## Overview
//! [`coordinator`] implements the run state machine, [`objective`] binds it to
//! a payload kind for the optimizer and [`store`] provides an in-memory
//! backend.

pub mod coordinator;
pub mod objective;
pub mod store;
