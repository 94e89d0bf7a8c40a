//! Core enumerations shared across subsystems
//!
//! All enums here are closed: new compliance frameworks extend the control
//! catalog data, not these types.

use serde::{Deserialize, Serialize};

/// Kind of agent hosted by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Gathers evidence artifacts from integrated systems
    EvidenceCollector,
    /// Computes risk profiles from collected state
    RiskAssessor,
    /// Processes security questionnaires
    QuestionnaireProcessor,
    /// Analyzes policy documents against control requirements
    PolicyAnalyzer,
    /// Scans cloud resources for misconfigurations
    SecurityScanner,
    /// Verifies cryptographic material and seals
    CryptoVerifier,
    /// Syncs data with external integrations
    IntegrationConnector,
    /// Watches platform health and raises alerts
    Monitor,
}

impl AgentKind {
    /// All kinds, for policy tables that enumerate "all agent types"
    pub fn all() -> Vec<AgentKind> {
        vec![
            AgentKind::EvidenceCollector,
            AgentKind::RiskAssessor,
            AgentKind::QuestionnaireProcessor,
            AgentKind::PolicyAnalyzer,
            AgentKind::SecurityScanner,
            AgentKind::CryptoVerifier,
            AgentKind::IntegrationConnector,
            AgentKind::Monitor,
        ]
    }

    /// Agents trusted with key material and `secret` data
    pub fn is_keyed(self) -> bool {
        matches!(self, AgentKind::CryptoVerifier)
    }

    /// Stable key segment used in index layouts
    pub fn as_key(&self) -> &'static str {
        match self {
            AgentKind::EvidenceCollector => "evidence_collector",
            AgentKind::RiskAssessor => "risk_assessor",
            AgentKind::QuestionnaireProcessor => "questionnaire_processor",
            AgentKind::PolicyAnalyzer => "policy_analyzer",
            AgentKind::SecurityScanner => "security_scanner",
            AgentKind::CryptoVerifier => "crypto_verifier",
            AgentKind::IntegrationConnector => "integration_connector",
            AgentKind::Monitor => "monitor",
        }
    }
}

/// Supported compliance frameworks
///
/// Control sets are injected as data; this enum only names the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    /// SOC 2 Trust Service Criteria
    Soc2,
    /// ISO 27001:2022 Information Security Management
    Iso27001,
    /// General Data Protection Regulation
    Gdpr,
    /// Health Information Portability and Accountability
    Hipaa,
    /// Payment Card Industry Data Security Standard
    PciDss,
    /// NIST Cybersecurity Framework
    NistCsf,
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Framework::Soc2 => "soc2",
            Framework::Iso27001 => "iso27001",
            Framework::Gdpr => "gdpr",
            Framework::Hipaa => "hipaa",
            Framework::PciDss => "pci_dss",
            Framework::NistCsf => "nist_csf",
        };
        write!(f, "{}", name)
    }
}

/// Type of a shared context entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    /// Evidence pointers and summaries
    Evidence,
    /// Risk profiles
    Risk,
    /// Compliance state snapshots
    Compliance,
    /// Security posture data
    Security,
    /// Integration configuration
    Config,
    /// Policy documents and analysis
    Policy,
    /// Workflow state handoffs
    Workflow,
    /// Learning data shared between agents
    Learning,
    /// Performance metrics
    Metrics,
    /// Integration sync state
    Integration,
}

impl ContextType {
    /// All types, for index scans that span every family
    pub fn all() -> Vec<ContextType> {
        vec![
            ContextType::Evidence,
            ContextType::Risk,
            ContextType::Compliance,
            ContextType::Security,
            ContextType::Config,
            ContextType::Policy,
            ContextType::Workflow,
            ContextType::Learning,
            ContextType::Metrics,
            ContextType::Integration,
        ]
    }

    /// Stable key segment used in index layouts
    pub fn as_key(&self) -> &'static str {
        match self {
            ContextType::Evidence => "evidence",
            ContextType::Risk => "risk",
            ContextType::Compliance => "compliance",
            ContextType::Security => "security",
            ContextType::Config => "config",
            ContextType::Policy => "policy",
            ContextType::Workflow => "workflow",
            ContextType::Learning => "learning",
            ContextType::Metrics => "metrics",
            ContextType::Integration => "integration",
        }
    }
}

/// Sharing scope of a context entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// All agents can access
    Global,
    /// Organization-wide
    Organization,
    /// Bound to one workflow
    Workflow,
    /// Restricted to enumerated agent kinds
    AgentType,
    /// Only the creating agent
    Private,
}

/// Data sensitivity tier, ordered from least to most restricted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// No access restriction
    Public,
    /// Any agent in the organization
    Internal,
    /// Enumerated agent kinds, approval and encryption required
    Confidential,
    /// Keyed agents only, approval and encryption required
    Secret,
}

impl Sensitivity {
    /// Tiers that must be stored encrypted
    pub fn requires_encryption(self) -> bool {
        self >= Sensitivity::Confidential
    }

    /// Tiers that need an approval record before cross-agent reads
    pub fn requires_approval(self) -> bool {
        self >= Sensitivity::Confidential
    }
}

/// Kind of evidence artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// Point-in-time system snapshot
    Snapshot,
    /// Raw API response from an integrated service
    ApiResponse,
    /// Configuration export
    Config,
    /// Log excerpt
    Log,
    /// Policy document
    Policy,
    /// Scanner finding set
    ScanResult,
    /// Questionnaire question
    Question,
    /// Questionnaire answer
    Answer,
    /// Generated report artifact
    Report,
}

/// Verification status of an evidence item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    /// Collected, not yet verified
    Pending,
    /// Verified by rule engine or human
    Verified,
    /// Rejected during verification
    Rejected,
    /// Past its expiry timestamp
    Expired,
}

/// Severity grade used by risk and gap analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational
    Low,
    /// Needs attention
    Medium,
    /// Needs prompt attention
    High,
    /// Blocks certification
    Critical,
}

impl Severity {
    /// Weight used in gap compound scores
    pub fn weight(self) -> f64 {
        match self {
            Severity::Critical => 4.0,
            Severity::High => 3.0,
            Severity::Medium => 2.0,
            Severity::Low => 1.0,
        }
    }
}

/// Identity of an agent instance: its id plus its kind
///
/// Cross-component references carry this pair so access policy (keyed on
/// kind) and audit (keyed on id) both work without a registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentRef {
    /// Unique agent id
    pub agent_id: String,
    /// Kind of the agent
    pub kind: AgentKind,
}

impl AgentRef {
    /// Build a reference
    pub fn new(agent_id: &str, kind: AgentKind) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            kind,
        }
    }
}

/// Clamp a submitted task priority into the supported 1..=10 band
pub fn clamp_priority(priority: u8) -> u8 {
    priority.clamp(1, 10)
}
