use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use super::catalog::{self, Capabilities};
use super::role_store;
use super::settings::{PermissionSettings, field_capabilities};
use super::tier::Tier;
use crate::error::AccessResult;

/// Capabilities actually added to or removed from one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierChange {
    pub tier: Tier,
    #[serde(serialize_with = "catalog::serialize_codenames")]
    pub granted: Capabilities,
    #[serde(serialize_with = "catalog::serialize_codenames")]
    pub revoked: Capabilities,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    pub changes: Vec<TierChange>,
}

impl PropagationReport {
    /// True when no tier's capability set changed.
    pub fn is_noop(&self) -> bool {
        self.changes
            .iter()
            .all(|c| c.granted.is_empty() && c.revoked.is_empty())
    }

    pub fn for_tier(&self, tier: Tier) -> Option<&TierChange> {
        self.changes.iter().find(|c| c.tier == tier)
    }
}

/// What the settings ask for a tier: capabilities to grant and to revoke.
/// Owners are never governed by settings.
pub fn desired_changes(tier: Tier, settings: &PermissionSettings) -> (Capabilities, Capabilities) {
    let mut grant = Capabilities::empty();
    let mut revoke = Capabilities::empty();
    for (field, setting) in settings.tier_settings(tier) {
        let caps = field_capabilities(tier, field);
        if setting.is_allowed() {
            grant |= caps;
        } else {
            revoke |= caps;
        }
    }
    (grant, revoke - grant)
}

/// Apply settings to the masters, moderators and members roles.
///
/// Each tier is updated with a single statement. Must run inside the
/// caller's transaction while the server lock is held.
pub async fn propagate(
    conn: &mut SqliteConnection,
    server_id: &str,
    settings: &PermissionSettings,
) -> AccessResult<PropagationReport> {
    let mut report = PropagationReport::default();

    for tier in Tier::CONFIGURABLE {
        let Some(role) = role_store::role_for_tier(&mut *conn, server_id, tier).await? else {
            warn!(%server_id, tier = %tier, "tier role missing, skipping propagation");
            continue;
        };

        let (grant, revoke) = desired_changes(tier, settings);
        role_store::apply(&mut *conn, &role.id, grant, revoke).await?;

        let change = TierChange {
            tier,
            granted: grant - role.permissions,
            revoked: revoke & role.permissions,
        };
        if !change.granted.is_empty() || !change.revoked.is_empty() {
            info!(
                %server_id,
                tier = %tier,
                granted = ?catalog::codenames(change.granted),
                revoked = ?catalog::codenames(change.revoked),
                "permission settings propagated"
            );
        }
        report.changes.push(change);
    }

    Ok(report)
}
