//! Scoring engine

use crate::frameworks::{ControlCatalog, FrameworkControl};
use chrono::{DateTime, Utc};
use grc_common::{EvidenceStatus, Framework, Severity};
use grc_evidence::{composite_confidence, EvidenceFilter, EvidenceItem, EvidenceStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Compliance posture of one control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    /// Verification rate >= 0.9 and average confidence >= 0.8
    FullyCompliant,
    /// Verification rate >= 0.7 and average confidence >= 0.7
    MostlyCompliant,
    /// Verification rate >= 0.5 and average confidence >= 0.6
    PartiallyCompliant,
    /// Below every threshold
    NonCompliant,
    /// No evidence collected
    Unknown,
}

/// A ranked compliance gap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    /// Control the gap belongs to
    pub control_id: String,
    /// What is missing or weak
    pub description: String,
    /// Gap severity
    pub severity: Severity,
    /// Compound ranking score (severity weight × recency weight)
    pub score: f64,
}

/// Computed metric for one control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMetric {
    /// Control id
    pub control_id: String,
    /// Posture classification
    pub status: ControlStatus,
    /// Evidence items considered
    pub evidence_count: usize,
    /// Mean composite confidence
    pub average_confidence: f64,
    /// Verified share of evidence, as a percentage
    pub compliance_pct: f64,
    /// Gaps found for this control
    pub gaps: Vec<Gap>,
    /// Suggested next actions
    pub recommendations: Vec<String>,
}

/// Whole-framework scoring result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkScore {
    /// Scored framework
    pub framework: Framework,
    /// Scored organization
    pub organization_id: String,
    /// Weighted mean over controls, 0..=100
    pub overall_score: f64,
    /// 100 − overall score
    pub risk_score: f64,
    /// Per-control metrics
    pub controls: Vec<ControlMetric>,
    /// Generation time
    pub generated_at: DateTime<Utc>,
}

/// Computes framework scores from stored evidence
pub struct ScoringEngine {
    catalog: Arc<ControlCatalog>,
    evidence: Arc<EvidenceStore>,
    max_gaps_per_control: usize,
}

impl ScoringEngine {
    /// Wire an engine from its collaborators
    pub fn new(catalog: Arc<ControlCatalog>, evidence: Arc<EvidenceStore>) -> Self {
        Self {
            catalog,
            evidence,
            max_gaps_per_control: 10,
        }
    }

    /// Score one framework for one organization
    pub fn score_framework(&self, organization_id: &str, framework: Framework) -> FrameworkScore {
        let controls = self.catalog.controls(framework);
        let mut metrics = Vec::with_capacity(controls.len());
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for control in &controls {
            let metric = self.score_control(organization_id, control);
            let weight = (metric.evidence_count.max(1) as f64) * metric.average_confidence;
            weighted_sum += metric.compliance_pct * weight;
            weight_total += weight;
            metrics.push(metric);
        }

        let overall = if weight_total > 0.0 {
            round2(weighted_sum / weight_total)
        } else {
            0.0
        };

        tracing::info!(
            %framework,
            organization = organization_id,
            overall,
            controls = metrics.len(),
            "framework scored"
        );

        FrameworkScore {
            framework,
            organization_id: organization_id.to_string(),
            overall_score: overall,
            risk_score: round2(100.0 - overall),
            controls: metrics,
            generated_at: Utc::now(),
        }
    }

    fn score_control(&self, organization_id: &str, control: &FrameworkControl) -> ControlMetric {
        let items = self.evidence.query(&EvidenceFilter {
            framework: Some(control.framework),
            control_id: Some(control.control_id.clone()),
            ..EvidenceFilter::for_org(organization_id)
        });

        if items.is_empty() {
            return ControlMetric {
                control_id: control.control_id.clone(),
                status: ControlStatus::Unknown,
                evidence_count: 0,
                average_confidence: 0.0,
                compliance_pct: 0.0,
                gaps: vec![Gap {
                    control_id: control.control_id.clone(),
                    description: format!("no evidence collected for {}", control.name),
                    severity: control.criticality,
                    score: round2(control.criticality.weight()),
                }],
                recommendations: vec![format!(
                    "schedule evidence collection for {} ({})",
                    control.control_id, control.name
                )],
            };
        }

        let total = items.len();
        let verified = items
            .iter()
            .filter(|item| item.status == EvidenceStatus::Verified)
            .count();
        let verification_rate = verified as f64 / total as f64;
        let average_confidence =
            items.iter().map(composite_confidence).sum::<f64>() / total as f64;

        let status = if verification_rate >= 0.9 && average_confidence >= 0.8 {
            ControlStatus::FullyCompliant
        } else if verification_rate >= 0.7 && average_confidence >= 0.7 {
            ControlStatus::MostlyCompliant
        } else if verification_rate >= 0.5 && average_confidence >= 0.6 {
            ControlStatus::PartiallyCompliant
        } else {
            ControlStatus::NonCompliant
        };

        let mut gaps = self.find_gaps(control, &items);
        gaps.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        gaps.truncate(self.max_gaps_per_control);
        let recommendations = recommendations_for(control, status, &gaps);

        ControlMetric {
            control_id: control.control_id.clone(),
            status,
            evidence_count: total,
            average_confidence: round2(average_confidence),
            compliance_pct: round2(verification_rate * 100.0),
            gaps,
            recommendations,
        }
    }

    fn find_gaps(&self, control: &FrameworkControl, items: &[EvidenceItem]) -> Vec<Gap> {
        let now = Utc::now();
        let mut gaps = Vec::new();

        for item in items {
            let age_days = (now - item.collected_at).num_days().max(0) as f64;
            let recency_weight = 1.0 / (1.0 + age_days / 30.0);

            if item.status == EvidenceStatus::Expired {
                gaps.push(Gap {
                    control_id: control.control_id.clone(),
                    description: format!("expired evidence {}", item.evidence_id),
                    severity: control.criticality,
                    score: round2(control.criticality.weight() * recency_weight),
                });
            } else if composite_confidence(item) < 0.5 {
                gaps.push(Gap {
                    control_id: control.control_id.clone(),
                    description: format!("low-confidence evidence {}", item.evidence_id),
                    severity: Severity::Medium,
                    score: round2(Severity::Medium.weight() * recency_weight),
                });
            }
        }

        gaps
    }
}

fn recommendations_for(
    control: &FrameworkControl,
    status: ControlStatus,
    gaps: &[Gap],
) -> Vec<String> {
    let mut recommendations = Vec::new();
    match status {
        ControlStatus::FullyCompliant => {}
        ControlStatus::MostlyCompliant | ControlStatus::PartiallyCompliant => {
            recommendations.push(format!(
                "verify pending evidence for {} to raise its verification rate",
                control.control_id
            ));
        }
        ControlStatus::NonCompliant => {
            recommendations.push(format!(
                "collect and verify fresh evidence for {} ({})",
                control.control_id, control.name
            ));
        }
        ControlStatus::Unknown => {}
    }
    if gaps.iter().any(|gap| gap.description.starts_with("expired")) {
        recommendations.push(format!(
            "re-collect expired evidence for {}",
            control.control_id
        ));
    }
    recommendations
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
