//! ISO 27001:2022 Annex A

use super::{control, FrameworkControl};
use grc_common::{Framework, Severity};

/// Default ISO 27001 control set
pub fn controls() -> Vec<FrameworkControl> {
    let f = Framework::Iso27001;
    vec![
        control(
            f,
            "A.5.1",
            "Information Security Policies",
            "Information security policy and topic-specific policies are defined and approved",
            "Organizational",
            Severity::High,
        ),
        control(
            f,
            "A.5.15",
            "Access Control",
            "Rules to control physical and logical access are established",
            "Organizational",
            Severity::Critical,
        ),
        control(
            f,
            "A.5.23",
            "Cloud Services Security",
            "Processes for acquisition, use and exit from cloud services are established",
            "Organizational",
            Severity::High,
        ),
        control(
            f,
            "A.8.2",
            "Privileged Access Rights",
            "Allocation and use of privileged access rights is restricted and managed",
            "Technological",
            Severity::Critical,
        ),
        control(
            f,
            "A.8.12",
            "Data Leakage Prevention",
            "Data leakage prevention measures are applied to systems processing sensitive data",
            "Technological",
            Severity::High,
        ),
        control(
            f,
            "A.8.13",
            "Information Backup",
            "Backup copies are maintained and regularly tested",
            "Technological",
            Severity::High,
        ),
        control(
            f,
            "A.8.15",
            "Logging",
            "Logs recording activities, exceptions and events are produced, stored and analysed",
            "Technological",
            Severity::High,
        ),
        control(
            f,
            "A.8.24",
            "Use of Cryptography",
            "Rules for effective use of cryptography, including key management, are defined",
            "Technological",
            Severity::Critical,
        ),
    ]
}
