//! # Report Core
//!
//! Core business logic for the patient report service.
//!
//! This crate contains the two subsystems the service is built around,
//! plus the glue between them:
//! - Resilient patient resolution: cache-first lookup with bounded-time
//!   remote fetches, per-source circuit breaking and primary/fallback
//!   source ordering
//! - Template rendering: convention-insensitive placeholder substitution
//!   and simple concatenation expressions
//! - Report assembly: field-map construction, derived fields and the final
//!   report artifact
//!
//! **No API concerns**: HTTP routing, request validation and status mapping
//! belong in `api-rest`.

pub mod breaker;
pub mod cache;
pub mod config;
pub mod error;
pub mod patient;
pub mod report;
pub mod resolver;
pub mod source;
pub mod template;

pub use breaker::{BreakerState, CircuitBreaker};
pub use cache::PatientCache;
pub use config::{CoreConfig, TemplateLocation};
pub use error::{ReportError, ReportResult};
pub use patient::PatientRecord;
pub use report::{build_field_map, Report, ReportService};
pub use resolver::{ResilientResolver, ResolveError, SourceBinding};
pub use source::{
    HttpPatientSource, MockPatientSource, PatientSource, RetryPolicy, SourceError,
};
pub use template::{
    render, FieldMap, TemplateError, TemplateStore, NOT_SPECIFIED,
    TEMPLATE_UNAVAILABLE_MESSAGE,
};

// Re-export the validated id so API crates take the same type the core uses.
pub use report_types::PatientId;
