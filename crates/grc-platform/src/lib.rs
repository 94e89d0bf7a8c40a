//! GRC Platform
//!
//! Composition root of the compliance automation core. Wires the
//! integrity engine, audit log, context fabric, evidence store, agent
//! registry, task scheduler, ETL runtime and scoring engine behind one
//! constructor-injected facade, and exposes the external task, evidence
//! and context APIs. No subsystem is a global; everything is owned here
//! and handed out as `Arc`s.

#![warn(missing_docs)]

pub mod agents;
pub mod capability;
pub mod platform;

pub use agents::{QuestionnaireAgent, ScanAgent};
pub use capability::{InferenceProvider, ScannedResource, ScannerPlugin};
pub use platform::GrcPlatform;
