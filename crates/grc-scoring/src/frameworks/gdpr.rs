//! GDPR

use super::{control, FrameworkControl};
use grc_common::{Framework, Severity};

/// Default GDPR control set
pub fn controls() -> Vec<FrameworkControl> {
    let f = Framework::Gdpr;
    vec![
        control(
            f,
            "Art.5",
            "Processing Principles",
            "Personal data is processed lawfully, fairly, transparently and minimally",
            "Principles",
            Severity::Critical,
        ),
        control(
            f,
            "Art.17",
            "Right to Erasure",
            "Personal data is erased on request without undue delay",
            "Data Subject Rights",
            Severity::High,
        ),
        control(
            f,
            "Art.25",
            "Data Protection by Design",
            "Technical and organisational measures implement data protection principles",
            "Controller Obligations",
            Severity::High,
        ),
        control(
            f,
            "Art.30",
            "Records of Processing",
            "Records of processing activities are maintained",
            "Controller Obligations",
            Severity::Medium,
        ),
        control(
            f,
            "Art.32",
            "Security of Processing",
            "Appropriate security measures including encryption and pseudonymisation are applied",
            "Security",
            Severity::Critical,
        ),
        control(
            f,
            "Art.33",
            "Breach Notification",
            "Personal data breaches are notified to the supervisory authority within 72 hours",
            "Security",
            Severity::Critical,
        ),
        control(
            f,
            "Art.35",
            "Impact Assessments",
            "Data protection impact assessments are performed for high-risk processing",
            "Controller Obligations",
            Severity::High,
        ),
    ]
}
