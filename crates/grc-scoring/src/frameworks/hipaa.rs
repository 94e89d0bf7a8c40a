//! HIPAA Security Rule

use super::{control, FrameworkControl};
use grc_common::{Framework, Severity};

/// Default HIPAA control set
pub fn controls() -> Vec<FrameworkControl> {
    let f = Framework::Hipaa;
    vec![
        control(
            f,
            "164.308(a)(1)",
            "Security Management Process",
            "Risk analysis and risk management processes are implemented",
            "Administrative Safeguards",
            Severity::Critical,
        ),
        control(
            f,
            "164.308(a)(5)",
            "Security Awareness Training",
            "A security awareness and training program exists for all workforce members",
            "Administrative Safeguards",
            Severity::Medium,
        ),
        control(
            f,
            "164.310(a)(1)",
            "Facility Access Controls",
            "Physical access to electronic information systems is limited",
            "Physical Safeguards",
            Severity::High,
        ),
        control(
            f,
            "164.312(a)(1)",
            "Access Control",
            "Technical policies allow access only to authorized persons or programs",
            "Technical Safeguards",
            Severity::Critical,
        ),
        control(
            f,
            "164.312(b)",
            "Audit Controls",
            "Mechanisms record and examine activity in systems containing ePHI",
            "Technical Safeguards",
            Severity::High,
        ),
        control(
            f,
            "164.312(e)(1)",
            "Transmission Security",
            "ePHI transmitted over networks is guarded against unauthorized access",
            "Technical Safeguards",
            Severity::Critical,
        ),
    ]
}
