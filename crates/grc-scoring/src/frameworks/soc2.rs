//! SOC 2 Trust Service Criteria

use super::{control, FrameworkControl};
use grc_common::{Framework, Severity};

/// Default SOC 2 control set
pub fn controls() -> Vec<FrameworkControl> {
    let f = Framework::Soc2;
    vec![
        control(
            f,
            "CC1.1",
            "Security Policies",
            "The entity defines and maintains security policies approved by management",
            "Control Environment",
            Severity::High,
        ),
        control(
            f,
            "CC2.1",
            "Security Awareness",
            "Security awareness training is provided to all personnel",
            "Communication",
            Severity::Medium,
        ),
        control(
            f,
            "CC5.1",
            "Logical Access Controls",
            "Logical access to systems and data is restricted to authorized users",
            "Access Control",
            Severity::Critical,
        ),
        control(
            f,
            "CC5.2",
            "Multi-Factor Authentication",
            "MFA is required for all administrative access",
            "Access Control",
            Severity::Critical,
        ),
        control(
            f,
            "CC6.1",
            "Encryption in Transit",
            "Data is encrypted during transmission over public networks",
            "System Operations",
            Severity::Critical,
        ),
        control(
            f,
            "CC6.2",
            "Encryption at Rest",
            "Data is encrypted when stored",
            "System Operations",
            Severity::Critical,
        ),
        control(
            f,
            "CC7.1",
            "Change Management",
            "Changes are authorized, tested and approved before implementation",
            "Change Management",
            Severity::High,
        ),
        control(
            f,
            "CC8.1",
            "Vulnerability Management",
            "Vulnerabilities are identified, tracked and remediated within SLA",
            "Risk Mitigation",
            Severity::High,
        ),
        control(
            f,
            "CC9.1",
            "Backup and Recovery",
            "Backups are performed, monitored and recovery-tested",
            "Availability",
            Severity::High,
        ),
    ]
}
