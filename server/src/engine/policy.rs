use super::catalog::{self, Capabilities};
use super::tier::Tier;
use crate::config::PolicySection;
use crate::error::AccessResult;

/// Resolved authorization policy data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    owners_delete: Capabilities,
    masters_delete: Capabilities,
    moderators_delete: Capabilities,
    members_delete: Capabilities,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            owners_delete: Capabilities::DELETE_MASTERS_FROM_SERVER
                | Capabilities::DELETE_MODERATORS_FROM_SERVER
                | Capabilities::DELETE_MEMBERS_FROM_SERVER,
            masters_delete: Capabilities::DELETE_MODERATORS_FROM_SERVER
                | Capabilities::DELETE_MEMBERS_FROM_SERVER,
            moderators_delete: Capabilities::DELETE_MEMBERS_FROM_SERVER,
            members_delete: Capabilities::empty(),
        }
    }
}

impl AccessPolicy {
    /// Resolve the configured codenames. Unknown names are an error.
    pub fn from_config(section: &PolicySection) -> AccessResult<Self> {
        Ok(Self {
            owners_delete: catalog::resolve_all(&section.owners_delete)?,
            masters_delete: catalog::resolve_all(&section.masters_delete)?,
            moderators_delete: catalog::resolve_all(&section.moderators_delete)?,
            members_delete: catalog::resolve_all(&section.members_delete)?,
        })
    }

    /// The capabilities a tier must hold in full to remove anyone.
    pub fn delete_bundle(&self, tier: Tier) -> Capabilities {
        match tier {
            Tier::Owner => self.owners_delete,
            Tier::Master => self.masters_delete,
            Tier::Moderator => self.moderators_delete,
            Tier::Member => self.members_delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_default_policy() {
        let policy = AccessPolicy::from_config(&PolicySection::default()).unwrap();
        assert_eq!(policy, AccessPolicy::default());
    }

    #[test]
    fn test_bundles_shrink_down_the_ranks() {
        let policy = AccessPolicy::default();
        assert!(policy.delete_bundle(Tier::Owner).contains(policy.delete_bundle(Tier::Master)));
        assert!(policy.delete_bundle(Tier::Master).contains(policy.delete_bundle(Tier::Moderator)));
        assert!(policy.delete_bundle(Tier::Member).is_empty());
    }

    #[test]
    fn test_unknown_codename_rejected() {
        let section = PolicySection {
            masters_delete: vec!["delete_admins_from_server".into()],
            ..PolicySection::default()
        };
        assert!(AccessPolicy::from_config(&section).is_err());
    }
}
