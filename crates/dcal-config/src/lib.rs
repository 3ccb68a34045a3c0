// crates/dcal-config/src/lib.rs
// ============================================================================
// Module: DCAL Config Library
// Description: Canonical configuration model and fail-closed loading.
// Purpose: Single source of truth for `dcal.toml` semantics.
// Dependencies: dcal-core, serde, toml
// ============================================================================

//! ## Overview
//! `dcal-config` defines the canonical configuration model for the Dynamic
//! Claims Automation Layer. It provides strict, fail-closed validation and
//! conversion methods into the runtime types `dcal-core` accepts at
//! construction.
//!
//! Security posture: config inputs are untrusted; size-capped and
//! path-validated before parsing.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditStoreConfig;
pub use config::BreakerSettingsConfig;
pub use config::ConfigError;
pub use config::DcalConfig;
pub use config::DegradationConfig;
pub use config::IngestionConfig;
pub use config::PublisherConfig;
pub use config::SecretsConfig;
pub use config::SlaConfig;
pub use config::SlaMode;
pub use config::SlaOverrideEntry;
pub use config::ThresholdsConfig;
