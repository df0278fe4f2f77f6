//! # CDS Core
//!
//! Eligibility decision core for the SMART asthma clinical decision support service.
//!
//! This crate contains the whole evaluation of one patient:
//! - planning and running concurrent reads against an upstream FHIR server
//! - routing decoded resources into a per-request aggregate under one lock
//! - normalising each resource type exactly once
//! - grouping medication orders into courses
//! - the three rule stages (registry, eligible, initiated)
//! - the alert-text write-back
//!
//! **No API concerns**: the CDS Hooks surface, card assembly and process bootstrap belong in
//! `api-rest`, `api-shared` and the binaries.

pub mod aggregate;
pub mod config;
pub mod constants;
pub mod control_tool;
pub mod criteria;
pub mod dates;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod grouping;
pub mod normalise;
pub mod pipeline;
pub mod planner;
pub mod writeback;

pub use config::{CdsConfig, ConfigFile, PatternSources};
pub use criteria::Criteria;
pub use error::{CdsError, CdsResult, FetchFailure};
pub use fetch::http::HttpFetcher;
pub use pipeline::{EligibilityService, Evaluation, EvaluationRequest};
