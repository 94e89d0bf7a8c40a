//! Framework control catalogs
//!
//! Reference data only: each framework module returns its default control
//! set, and deployments can inject replacements without touching code.

pub mod gdpr;
pub mod hipaa;
pub mod iso27001;
pub mod pci_dss;
pub mod soc2;

use arc_swap::ArcSwap;
use grc_common::{Framework, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One requirement within a framework
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkControl {
    /// Control id, e.g. `CC6.1`
    pub control_id: String,
    /// Owning framework
    pub framework: Framework,
    /// Short name
    pub name: String,
    /// Requirement text
    pub requirement_text: String,
    /// Control family or trust criteria group
    pub family: String,
    /// How severe a gap in this control is
    pub criticality: Severity,
}

/// Hot-swappable catalog of controls per framework
pub struct ControlCatalog {
    controls: ArcSwap<HashMap<Framework, Vec<FrameworkControl>>>,
}

impl ControlCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self {
            controls: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Catalog preloaded with the bundled framework data
    pub fn with_defaults() -> Self {
        let catalog = Self::new();
        catalog.inject(Framework::Soc2, soc2::controls());
        catalog.inject(Framework::Iso27001, iso27001::controls());
        catalog.inject(Framework::Gdpr, gdpr::controls());
        catalog.inject(Framework::Hipaa, hipaa::controls());
        catalog.inject(Framework::PciDss, pci_dss::controls());
        catalog
    }

    /// Replace one framework's control set
    pub fn inject(&self, framework: Framework, controls: Vec<FrameworkControl>) {
        let mut map = (**self.controls.load()).clone();
        tracing::info!(%framework, count = controls.len(), "control catalog loaded");
        map.insert(framework, controls);
        self.controls.store(Arc::new(map));
    }

    /// Controls of one framework
    pub fn controls(&self, framework: Framework) -> Vec<FrameworkControl> {
        self.controls
            .load()
            .get(&framework)
            .cloned()
            .unwrap_or_default()
    }

    /// Total control count across frameworks
    pub fn len(&self) -> usize {
        self.controls.load().values().map(|c| c.len()).sum()
    }

    /// Whether the catalog holds no controls
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ControlCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub(crate) fn control(
    framework: Framework,
    control_id: &str,
    name: &str,
    requirement_text: &str,
    family: &str,
    criticality: Severity,
) -> FrameworkControl {
    FrameworkControl {
        control_id: control_id.into(),
        framework,
        name: name.into(),
        requirement_text: requirement_text.into(),
        family: family.into(),
        criticality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_frameworks() {
        let catalog = ControlCatalog::with_defaults();
        for framework in [
            Framework::Soc2,
            Framework::Iso27001,
            Framework::Gdpr,
            Framework::Hipaa,
            Framework::PciDss,
        ] {
            assert!(
                !catalog.controls(framework).is_empty(),
                "{} has no controls",
                framework
            );
        }
        assert!(catalog.len() > 30);
    }

    #[test]
    fn test_injection_replaces_set() {
        let catalog = ControlCatalog::new();
        assert!(catalog.controls(Framework::NistCsf).is_empty());
        catalog.inject(
            Framework::NistCsf,
            vec![control(
                Framework::NistCsf,
                "PR.AC-1",
                "Identity Management",
                "Identities and credentials are issued and managed",
                "Protect",
                Severity::High,
            )],
        );
        assert_eq!(catalog.controls(Framework::NistCsf).len(), 1);
    }
}
