// crates/dcal-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Audit Store
// Description: Durable AuditSink backend using SQLite WAL.
// Purpose: Provide production-grade, tamper-evident persistence for the
//          hash-chained audit record (C7).
// Dependencies: dcal-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a `SQLite`-backed [`AuditSink`](dcal_core::AuditSink)
//! implementation. Sequence numbers and the previous chain hash are read
//! and assigned inside the same write transaction, so concurrent callers
//! never observe or reuse the same sequence number. Updates and deletes on
//! the audit table are rejected by triggers at the storage layer, not by
//! this crate's API surface.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteAuditStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
