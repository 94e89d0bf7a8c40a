//! GRC Evidence Store
//!
//! Evidence items are keyed by the integrity hash of their canonical
//! content: two agents producing the same artifact collapse to one item,
//! and a mutated item no longer verifies. Items are never mutated in
//! place; status transitions are the only writes after creation.

#![warn(missing_docs)]

pub mod confidence;
pub mod item;
pub mod store;

pub use confidence::composite_confidence;
pub use item::{EvidenceFilter, EvidenceItem, ProvenanceRecord};
pub use store::{EvidenceStore, StoredEvidence};
