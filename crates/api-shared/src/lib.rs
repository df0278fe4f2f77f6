//! # API Shared
//!
//! Shared definitions for the CDS Hooks surface.
//!
//! Contains:
//! - CDS Hooks wire types (`hooks` module): hook request, discovery document, cards
//! - Shared services like `HealthService`
//! - Authorization header checks
//!
//! Used by `api-rest` and the `cds` CLI.

pub mod auth;
pub mod health;
pub mod hooks;

pub use health::{HealthRes, HealthService};
pub use hooks::{Card, HookRequest, HookResponse, ServiceDiscovery};
