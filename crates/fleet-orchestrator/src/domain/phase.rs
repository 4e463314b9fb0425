//! Bootstrap state machine phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of a network through configuration and bootstrap.
///
/// Networks without subnets go straight from `Created` to `AllStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    Unconfigured,
    Configured,
    Created,
    SingleNodeUp,
    SubnetsCreated,
    ValidatorsAssigned,
    ChainsCreated,
    Restarted,
    AllStarted,
}

impl BootstrapPhase {
    /// Whether subnet provisioning progress should be recorded.
    pub fn is_provisioning(self) -> bool {
        self >= Self::SingleNodeUp && self < Self::Restarted
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Created => "created",
            Self::SingleNodeUp => "single node up",
            Self::SubnetsCreated => "subnets created",
            Self::ValidatorsAssigned => "validators assigned",
            Self::ChainsCreated => "chains created",
            Self::Restarted => "restarted",
            Self::AllStarted => "all started",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_window() {
        assert!(!BootstrapPhase::Created.is_provisioning());
        assert!(BootstrapPhase::SingleNodeUp.is_provisioning());
        assert!(BootstrapPhase::ChainsCreated.is_provisioning());
        assert!(!BootstrapPhase::Restarted.is_provisioning());
        assert!(!BootstrapPhase::AllStarted.is_provisioning());
    }
}
