//! PCI-DSS 4.0

use super::{control, FrameworkControl};
use grc_common::{Framework, Severity};

/// Default PCI-DSS control set
pub fn controls() -> Vec<FrameworkControl> {
    let f = Framework::PciDss;
    vec![
        control(
            f,
            "1.2.1",
            "Network Security Controls",
            "Configuration standards for network security controls are defined and implemented",
            "Network Security",
            Severity::Critical,
        ),
        control(
            f,
            "3.5.1",
            "Stored Account Data Protection",
            "Primary account numbers are rendered unreadable anywhere they are stored",
            "Data Protection",
            Severity::Critical,
        ),
        control(
            f,
            "4.2.1",
            "Transmission Encryption",
            "Strong cryptography protects account data during transmission over open networks",
            "Data Protection",
            Severity::Critical,
        ),
        control(
            f,
            "8.3.1",
            "Strong Authentication",
            "All user access is authenticated with strong factors",
            "Access Control",
            Severity::Critical,
        ),
        control(
            f,
            "10.2.1",
            "Audit Log Implementation",
            "Audit logs capture all access to system components and cardholder data",
            "Logging",
            Severity::High,
        ),
        control(
            f,
            "11.3.1",
            "Vulnerability Scanning",
            "Internal vulnerability scans are performed at least quarterly",
            "Testing",
            Severity::High,
        ),
        control(
            f,
            "12.1.1",
            "Security Policy",
            "An overall information security policy is established and maintained",
            "Governance",
            Severity::Medium,
        ),
    ]
}
