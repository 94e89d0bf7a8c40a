//! Composite confidence scoring
//!
//! Downstream scoring consumes `producer confidence × type weight ×
//! status multiplier`. Automated machine-readable artifacts weigh more
//! than narrative ones; unverified and expired items are discounted.

use crate::item::EvidenceItem;
use grc_common::{EvidenceStatus, EvidenceType};

/// Relative reliability of an artifact kind
pub fn type_weight(evidence_type: EvidenceType) -> f64 {
    match evidence_type {
        EvidenceType::ScanResult => 1.0,
        EvidenceType::ApiResponse => 0.95,
        EvidenceType::Config => 0.9,
        EvidenceType::Snapshot => 0.85,
        EvidenceType::Log => 0.8,
        EvidenceType::Policy => 0.75,
        EvidenceType::Report => 0.7,
        EvidenceType::Answer => 0.65,
        EvidenceType::Question => 0.6,
    }
}

/// Discount applied by verification status
pub fn status_multiplier(status: EvidenceStatus) -> f64 {
    match status {
        EvidenceStatus::Verified => 1.0,
        EvidenceStatus::Pending => 0.7,
        EvidenceStatus::Expired => 0.3,
        EvidenceStatus::Rejected => 0.0,
    }
}

/// Effective confidence of an item as consumed by compliance scoring
pub fn composite_confidence(item: &EvidenceItem) -> f64 {
    (item.confidence_score * type_weight(item.evidence_type) * status_multiplier(item.status))
        .clamp(0.0, 1.0)
}
