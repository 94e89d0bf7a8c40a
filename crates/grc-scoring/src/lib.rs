//! GRC Compliance Scoring
//!
//! Aggregates evidence into per-control metrics, overall compliance and
//! risk scores, and a ranked gap list. Control catalogs are reference
//! data injected at startup; scoring never hard-codes a framework's
//! semantic content.

#![warn(missing_docs)]

pub mod frameworks;
pub mod scoring;

pub use frameworks::{ControlCatalog, FrameworkControl};
pub use scoring::{ControlMetric, ControlStatus, FrameworkScore, Gap, ScoringEngine};
