use serde::Serialize;
use sqlx::{SqliteConnection, SqliteExecutor};
use tracing::warn;

use super::catalog::{self, Capabilities};
use super::policy::AccessPolicy;
use super::role_store::{self, Role};
use super::tier::Tier;
use crate::db::queries::users;
use crate::error::{AccessError, AccessResult};

// ── Pure decisions ──────────────────────────────────────────────────

/// Decide whether `actor_role` may remove a user whose tier is `target_tier`.
pub fn check_delete(
    policy: &AccessPolicy,
    actor_role: Option<&Role>,
    target_tier: Option<Tier>,
) -> AccessResult<()> {
    let Some(target_tier) = target_tier else {
        return Err(AccessError::denied("target holds no tier in this server"));
    };
    let Some(victim_cap) = target_tier.delete_capability() else {
        return Err(AccessError::denied("owners cannot be removed"));
    };
    let Some(actor_role) = actor_role else {
        return Err(AccessError::denied("actor holds no tier in this server"));
    };

    let bundle = policy.delete_bundle(actor_role.tier);
    if bundle.is_empty() || !actor_role.has(bundle) {
        return Err(AccessError::denied(format!(
            "{} do not hold their full delete bundle",
            actor_role.tier
        )));
    }
    if !bundle.contains(victim_cap) {
        return Err(AccessError::denied(format!(
            "{} may not remove {}",
            actor_role.tier, target_tier
        )));
    }
    Ok(())
}

/// Decide whether an actor may move a user from `current` to `dest`.
///
/// `Conflict` for moves into or out of owners, `PermissionDenied` when the
/// actor lacks authority.
pub fn check_change_rank(
    actor_is_target: bool,
    actor_role: Option<&Role>,
    actor_direct: Capabilities,
    current: Tier,
    dest: Tier,
) -> AccessResult<()> {
    if dest == Tier::Owner {
        return Err(AccessError::conflict("nobody can be moved into owners"));
    }
    if current == Tier::Owner {
        return Err(AccessError::conflict("owners cannot be moved to another tier"));
    }
    if actor_is_target {
        return Err(AccessError::denied("users cannot change their own tier"));
    }
    if actor_direct.contains(Capabilities::CHANGE_USER_GROUP) {
        return Ok(());
    }

    let needed = current.edit_group_capability().unwrap_or(Capabilities::empty())
        | dest.edit_group_capability().unwrap_or(Capabilities::empty());
    match actor_role {
        Some(role) if role.has(needed) => Ok(()),
        _ => Err(AccessError::denied(format!(
            "moving a user from {current} to {dest} requires {}",
            catalog::codenames(needed).join(" and ")
        ))),
    }
}

// ── Storage-backed evaluation ───────────────────────────────────────

/// Role lookup for decisions: an inconsistent record counts as no role.
async fn decision_role<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    user_id: &str,
) -> AccessResult<Option<Role>> {
    match role_store::role_of(ex, server_id, user_id).await {
        Err(AccessError::Inconsistent(reason)) => {
            warn!(%server_id, %user_id, %reason, "treating inconsistent role as absent");
            Ok(None)
        }
        other => other,
    }
}

/// Does the actor's tier in this server carry `cap`?
pub async fn can_perform<'e>(
    ex: impl SqliteExecutor<'e>,
    actor_id: &str,
    server_id: &str,
    cap: Capabilities,
) -> AccessResult<bool> {
    Ok(decision_role(ex, server_id, actor_id)
        .await?
        .is_some_and(|role| role.has(cap)))
}

/// `can_perform`, failing with `PermissionDenied` naming the capability.
pub async fn ensure_can_perform<'e>(
    ex: impl SqliteExecutor<'e>,
    actor_id: &str,
    server_id: &str,
    cap: Capabilities,
) -> AccessResult<()> {
    if can_perform(ex, actor_id, server_id, cap).await? {
        Ok(())
    } else {
        Err(AccessError::denied(format!(
            "missing {}",
            catalog::codenames(cap).join(", ")
        )))
    }
}

/// Does the user hold a direct (server-independent) grant of `cap`?
pub async fn has_direct_capability<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: &str,
    cap: Capabilities,
) -> AccessResult<bool> {
    let bits = users::direct_permissions(ex, user_id).await?;
    Ok(Capabilities::from_db(bits).contains(cap))
}

pub async fn ensure_can_delete_user(
    conn: &mut SqliteConnection,
    policy: &AccessPolicy,
    actor_id: &str,
    target_id: &str,
    server_id: &str,
) -> AccessResult<()> {
    if actor_id == target_id {
        return Err(AccessError::denied("use leave to remove yourself"));
    }
    let actor = decision_role(&mut *conn, server_id, actor_id).await?;
    let target = decision_role(&mut *conn, server_id, target_id).await?;
    check_delete(policy, actor.as_ref(), target.map(|r| r.tier))
}

pub async fn can_delete_user(
    conn: &mut SqliteConnection,
    policy: &AccessPolicy,
    actor_id: &str,
    target_id: &str,
    server_id: &str,
) -> AccessResult<bool> {
    match ensure_can_delete_user(conn, policy, actor_id, target_id, server_id).await {
        Ok(()) => Ok(true),
        Err(AccessError::PermissionDenied(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Check a rank change and return the target's current role.
pub async fn ensure_can_change_rank(
    conn: &mut SqliteConnection,
    actor_id: &str,
    target_id: &str,
    server_id: &str,
    dest: Tier,
) -> AccessResult<Role> {
    let current = role_store::role_of(&mut *conn, server_id, target_id)
        .await?
        .ok_or_else(|| AccessError::not_found("member", target_id))?;
    let actor = decision_role(&mut *conn, server_id, actor_id).await?;
    let direct = Capabilities::from_db(users::direct_permissions(&mut *conn, actor_id).await?);
    check_change_rank(actor_id == target_id, actor.as_ref(), direct, current.tier, dest)?;
    Ok(current)
}

pub async fn can_change_rank(
    conn: &mut SqliteConnection,
    actor_id: &str,
    target_id: &str,
    server_id: &str,
    dest: Tier,
) -> AccessResult<bool> {
    match ensure_can_change_rank(conn, actor_id, target_id, server_id, dest).await {
        Ok(_) => Ok(true),
        Err(
            AccessError::PermissionDenied(_)
            | AccessError::Conflict(_)
            | AccessError::NotFound { .. }
            | AccessError::Inconsistent(_),
        ) => Ok(false),
        Err(e) => Err(e),
    }
}

/// A member's tier and effective capabilities, for display.
#[derive(Debug, Clone, Serialize)]
pub struct MemberCapabilities {
    pub user_id: String,
    pub tier: Option<Tier>,
    pub capabilities: Vec<&'static str>,
    pub direct: Vec<&'static str>,
}

pub async fn member_capabilities(
    conn: &mut SqliteConnection,
    server_id: &str,
    user_id: &str,
) -> AccessResult<MemberCapabilities> {
    let role = decision_role(&mut *conn, server_id, user_id).await?;
    let direct = Capabilities::from_db(users::direct_permissions(&mut *conn, user_id).await?);
    Ok(MemberCapabilities {
        user_id: user_id.to_string(),
        tier: role.as_ref().map(|r| r.tier),
        capabilities: role
            .map(|r| catalog::codenames(r.permissions))
            .unwrap_or_default(),
        direct: catalog::codenames(direct),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(tier: Tier, permissions: Capabilities) -> Role {
        Role {
            id: format!("r-{tier}"),
            server_id: "s1".into(),
            tier,
            permissions,
        }
    }

    fn owners() -> Role {
        role(Tier::Owner, Capabilities::all())
    }

    fn masters() -> Role {
        role(
            Tier::Master,
            Capabilities::DELETE_MODERATORS_FROM_SERVER
                | Capabilities::DELETE_MEMBERS_FROM_SERVER
                | Capabilities::DELETE_USER_FROM_SERVER,
        )
    }

    fn moderators() -> Role {
        role(
            Tier::Moderator,
            Capabilities::DELETE_MEMBERS_FROM_SERVER | Capabilities::DELETE_USER_FROM_SERVER,
        )
    }

    #[test]
    fn test_owner_never_removable() {
        let policy = AccessPolicy::default();
        assert!(check_delete(&policy, Some(&owners()), Some(Tier::Owner)).is_err());
    }

    #[test]
    fn test_delete_follows_bundles() {
        let policy = AccessPolicy::default();
        assert!(check_delete(&policy, Some(&owners()), Some(Tier::Master)).is_ok());
        assert!(check_delete(&policy, Some(&masters()), Some(Tier::Moderator)).is_ok());
        assert!(check_delete(&policy, Some(&masters()), Some(Tier::Member)).is_ok());
        assert!(check_delete(&policy, Some(&masters()), Some(Tier::Master)).is_err());
        assert!(check_delete(&policy, Some(&moderators()), Some(Tier::Member)).is_ok());
        assert!(check_delete(&policy, Some(&moderators()), Some(Tier::Moderator)).is_err());
        let members = role(Tier::Member, Capabilities::all());
        assert!(check_delete(&policy, Some(&members), Some(Tier::Member)).is_err());
    }

    #[test]
    fn test_partial_bundle_denies() {
        let policy = AccessPolicy::default();
        // Masters missing delete_moderators lose the right to remove members too
        let weakened = role(Tier::Master, Capabilities::DELETE_MEMBERS_FROM_SERVER);
        assert!(check_delete(&policy, Some(&weakened), Some(Tier::Member)).is_err());
    }

    #[test]
    fn test_missing_tiers_deny() {
        let policy = AccessPolicy::default();
        assert!(check_delete(&policy, None, Some(Tier::Member)).is_err());
        assert!(check_delete(&policy, Some(&owners()), None).is_err());
    }

    #[test]
    fn test_rank_owner_moves_conflict() {
        let err = check_change_rank(
            false,
            Some(&owners()),
            Capabilities::CHANGE_USER_GROUP,
            Tier::Member,
            Tier::Owner,
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
        let err = check_change_rank(
            false,
            Some(&owners()),
            Capabilities::CHANGE_USER_GROUP,
            Tier::Owner,
            Tier::Member,
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
    }

    #[test]
    fn test_rank_needs_edit_caps_for_both_tiers() {
        let only_members = role(Tier::Master, Capabilities::EDIT_MEMBERS_GROUP);
        let both = role(
            Tier::Master,
            Capabilities::EDIT_MEMBERS_GROUP | Capabilities::EDIT_MODERATORS_GROUP,
        );
        let none = Capabilities::empty();
        let rank = |actor: &Role, from: Tier, to: Tier| {
            check_change_rank(false, Some(actor), none, from, to)
        };
        assert!(rank(&only_members, Tier::Member, Tier::Moderator).is_err());
        assert!(rank(&both, Tier::Member, Tier::Moderator).is_ok());
        assert!(rank(&both, Tier::Moderator, Tier::Master).is_err());
        assert!(rank(&owners(), Tier::Moderator, Tier::Master).is_ok());
    }

    #[test]
    fn test_rank_direct_grant_is_authority() {
        let direct = Capabilities::CHANGE_USER_GROUP;
        assert!(check_change_rank(false, None, direct, Tier::Member, Tier::Master).is_ok());
    }

    #[test]
    fn test_rank_self_change_denied() {
        let err = check_change_rank(
            true,
            Some(&owners()),
            Capabilities::CHANGE_USER_GROUP,
            Tier::Member,
            Tier::Master,
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied(_)));
    }
}
