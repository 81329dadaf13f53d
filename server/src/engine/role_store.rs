use serde::Serialize;
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::warn;

use super::catalog::{self, Capabilities};
use super::tier::Tier;
use crate::db::models::{RoleRow, UserRow};
use crate::db::queries::roles as q;
use crate::error::{AccessError, AccessResult, is_unique_violation};

/// A server's tier role and its capability set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub server_id: String,
    pub tier: Tier,
    pub permissions: Capabilities,
}

impl Role {
    pub fn has(&self, caps: Capabilities) -> bool {
        self.permissions.contains(caps)
    }
}

impl TryFrom<RoleRow> for Role {
    type Error = AccessError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        let tier = row.tier.parse::<Tier>().map_err(|_| {
            AccessError::Inconsistent(format!("role {} has unknown tier '{}'", row.id, row.tier))
        })?;
        Ok(Role {
            id: row.id,
            server_id: row.server_id,
            tier,
            permissions: Capabilities::from_db(row.permissions),
        })
    }
}

/// Serializable view of a role for the HTTP layer.
#[derive(Debug, Serialize)]
pub struct RoleView {
    pub id: String,
    pub tier: Tier,
    pub capabilities: Vec<&'static str>,
}

impl From<&Role> for RoleView {
    fn from(role: &Role) -> Self {
        RoleView {
            id: role.id.clone(),
            tier: role.tier,
            capabilities: catalog::codenames(role.permissions),
        }
    }
}

fn new_role_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Create the role for a tier. `Conflict` if the server already has one.
pub async fn create_role(
    conn: &mut SqliteConnection,
    server_id: &str,
    tier: Tier,
) -> AccessResult<Role> {
    let id = new_role_id();
    match q::insert_role(&mut *conn, &id, server_id, tier.as_str(), 0).await {
        Ok(()) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AccessError::conflict(format!(
                "server {server_id} already has a {tier} role"
            )));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(Role {
        id,
        server_id: server_id.to_string(),
        tier,
        permissions: Capabilities::empty(),
    })
}

/// Return the tier's role, creating it (with no capabilities) if missing.
pub async fn get_or_create_role(
    conn: &mut SqliteConnection,
    server_id: &str,
    tier: Tier,
) -> AccessResult<Role> {
    q::insert_role_if_missing(&mut *conn, &new_role_id(), server_id, tier.as_str()).await?;
    role_for_tier(&mut *conn, server_id, tier)
        .await?
        .ok_or_else(|| AccessError::not_found("role", format!("{server_id}/{tier}")))
}

pub async fn role_for_tier<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    tier: Tier,
) -> AccessResult<Option<Role>> {
    q::get_role_by_tier(ex, server_id, tier.as_str())
        .await?
        .map(Role::try_from)
        .transpose()
}

pub async fn get_role<'e>(ex: impl SqliteExecutor<'e>, role_id: &str) -> AccessResult<Role> {
    q::get_role(ex, role_id)
        .await?
        .ok_or_else(|| AccessError::not_found("role", role_id))?
        .try_into()
}

/// Add capabilities to a role. Idempotent.
pub async fn grant<'e>(
    ex: impl SqliteExecutor<'e>,
    role_id: &str,
    caps: Capabilities,
) -> AccessResult<()> {
    apply(ex, role_id, caps, Capabilities::empty()).await
}

/// Remove capabilities from a role. Idempotent.
pub async fn revoke<'e>(
    ex: impl SqliteExecutor<'e>,
    role_id: &str,
    caps: Capabilities,
) -> AccessResult<()> {
    apply(ex, role_id, Capabilities::empty(), caps).await
}

/// Grant and revoke in one statement, so readers never observe a partial set.
pub async fn apply<'e>(
    ex: impl SqliteExecutor<'e>,
    role_id: &str,
    grant: Capabilities,
    revoke: Capabilities,
) -> AccessResult<()> {
    if q::update_permissions(ex, role_id, grant.to_db(), revoke.to_db()).await? {
        Ok(())
    } else {
        Err(AccessError::not_found("role", role_id))
    }
}

pub async fn has_capability<'e>(
    ex: impl SqliteExecutor<'e>,
    role_id: &str,
    cap: Capabilities,
) -> AccessResult<bool> {
    Ok(get_role(ex, role_id).await?.has(cap))
}

/// Assign a user to a role. Returns false if they already held it;
/// `Conflict` if they hold a different tier in the same server.
pub async fn add_member(
    conn: &mut SqliteConnection,
    role: &Role,
    user_id: &str,
) -> AccessResult<bool> {
    if let Some(current) = role_of(&mut *conn, &role.server_id, user_id).await? {
        if current.id == role.id {
            return Ok(false);
        }
        return Err(AccessError::conflict(format!(
            "user {user_id} already holds the {} tier",
            current.tier
        )));
    }
    match q::add_role_member(&mut *conn, &role.id, &role.server_id, user_id).await {
        Ok(added) => Ok(added),
        Err(e) if is_unique_violation(&e) => Err(AccessError::conflict(format!(
            "user {user_id} already holds a tier in server {}",
            role.server_id
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Remove a user from a role. Idempotent.
pub async fn remove_member<'e>(
    ex: impl SqliteExecutor<'e>,
    role: &Role,
    user_id: &str,
) -> AccessResult<bool> {
    Ok(q::remove_role_member(ex, &role.id, user_id).await?)
}

pub async fn remove_from_all_roles<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    user_id: &str,
) -> AccessResult<u64> {
    Ok(q::remove_from_all_roles(ex, server_id, user_id).await?)
}

/// The single role a user holds in a server, if any.
pub async fn role_of<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    user_id: &str,
) -> AccessResult<Option<Role>> {
    let rows = q::roles_of_user(ex, server_id, user_id).await?;
    single_role(server_id, user_id, rows)
}

/// Collapse a role lookup to at most one role; more than one is `Inconsistent`.
pub fn single_role(
    server_id: &str,
    user_id: &str,
    mut rows: Vec<RoleRow>,
) -> AccessResult<Option<Role>> {
    match rows.len() {
        0 => Ok(None),
        1 => rows.pop().map(Role::try_from).transpose(),
        n => {
            warn!(%server_id, %user_id, roles = n, "user holds more than one tier");
            Err(AccessError::Inconsistent(format!(
                "user {user_id} holds {n} tiers in server {server_id}"
            )))
        }
    }
}

pub async fn list_roles<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
) -> AccessResult<Vec<Role>> {
    q::list_roles(ex, server_id)
        .await?
        .into_iter()
        .map(Role::try_from)
        .collect()
}

pub async fn role_members(pool: &SqlitePool, role_id: &str) -> AccessResult<Vec<UserRow>> {
    Ok(q::role_members(pool, role_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CreateServerParams;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::db::queries::{servers, users};

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        users::create_user(&pool, "u1", "alice").await.unwrap();
        users::create_user(&pool, "u2", "bob").await.unwrap();
        servers::create_server(
            &pool,
            &CreateServerParams {
                id: "s1",
                name: "Rustaceans",
                description: None,
                is_private: false,
                creator_id: "u1",
            },
        )
        .await
        .unwrap();
        pool
    }

    fn row(id: &str, tier: &str) -> RoleRow {
        RoleRow {
            id: id.into(),
            server_id: "s1".into(),
            tier: tier.into(),
            permissions: 0,
            created_at: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_role_conflicts_on_duplicate_tier() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        create_role(&mut conn, "s1", Tier::Master).await.unwrap();
        let err = create_role(&mut conn, "s1", Tier::Master).await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let first = get_or_create_role(&mut conn, "s1", Tier::Member).await.unwrap();
        let second = get_or_create_role(&mut conn, "s1", Tier::Member).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.tier, Tier::Member);
        assert!(first.permissions.is_empty());
    }

    #[tokio::test]
    async fn test_grant_and_revoke_idempotent() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let role = get_or_create_role(&mut conn, "s1", Tier::Moderator).await.unwrap();

        grant(&mut *conn, &role.id, Capabilities::SEND_INVITATION).await.unwrap();
        grant(&mut *conn, &role.id, Capabilities::SEND_INVITATION).await.unwrap();
        assert!(has_capability(&mut *conn, &role.id, Capabilities::SEND_INVITATION).await.unwrap());

        revoke(&mut *conn, &role.id, Capabilities::SEND_INVITATION).await.unwrap();
        revoke(&mut *conn, &role.id, Capabilities::SEND_INVITATION).await.unwrap();
        assert!(
            !has_capability(&mut *conn, &role.id, Capabilities::SEND_INVITATION)
                .await
                .unwrap()
        );

        let err = grant(&mut *conn, "missing", Capabilities::SEND_INVITATION).await.unwrap_err();
        assert!(matches!(err, AccessError::NotFound { kind: "role", .. }));
    }

    #[tokio::test]
    async fn test_add_member_enforces_single_tier() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let members = get_or_create_role(&mut conn, "s1", Tier::Member).await.unwrap();
        let masters = get_or_create_role(&mut conn, "s1", Tier::Master).await.unwrap();

        assert!(add_member(&mut conn, &members, "u2").await.unwrap());
        assert!(!add_member(&mut conn, &members, "u2").await.unwrap());
        let err = add_member(&mut conn, &masters, "u2").await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));

        let held = role_of(&mut *conn, "s1", "u2").await.unwrap().unwrap();
        assert_eq!(held.tier, Tier::Member);

        assert!(remove_member(&mut *conn, &members, "u2").await.unwrap());
        assert!(!remove_member(&mut *conn, &members, "u2").await.unwrap());
        assert!(role_of(&mut *conn, "s1", "u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_roles_highest_first() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        for tier in [Tier::Member, Tier::Owner, Tier::Moderator, Tier::Master] {
            get_or_create_role(&mut conn, "s1", tier).await.unwrap();
        }
        drop(conn);
        let tiers: Vec<Tier> = list_roles(&pool, "s1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.tier)
            .collect();
        assert_eq!(tiers, Tier::ALL.to_vec());
    }

    #[test]
    fn test_single_role_collapses() {
        assert!(single_role("s1", "u1", vec![]).unwrap().is_none());
        let one = single_role("s1", "u1", vec![row("r1", "masters")]).unwrap().unwrap();
        assert_eq!(one.tier, Tier::Master);
    }

    #[test]
    fn test_two_tiers_is_inconsistent() {
        let err = single_role("s1", "u1", vec![row("r1", "masters"), row("r2", "members")])
            .unwrap_err();
        assert!(matches!(err, AccessError::Inconsistent(_)));
    }

    #[test]
    fn test_unknown_stored_tier_is_inconsistent() {
        let err = Role::try_from(row("r1", "admins")).unwrap_err();
        assert!(matches!(err, AccessError::Inconsistent(_)));
    }
}
