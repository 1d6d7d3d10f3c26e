//! Orphaned resource report

use core_directory::{Device, ExternalAccount, IdentityResourceSummary};

/// Resources with nobody accountable for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanReport {
    /// Devices whose owner was never inferred
    pub devices_without_owner: Vec<Device>,
    /// Downstream accounts not linked to any identity
    pub accounts_without_identity: Vec<ExternalAccount>,
    /// Disabled identities that still own devices or accounts
    pub disabled_identities_with_resources: Vec<IdentityResourceSummary>,
}

impl OrphanReport {
    pub fn total(&self) -> usize {
        self.devices_without_owner.len()
            + self.accounts_without_identity.len()
            + self.disabled_identities_with_resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
