use sqlx::SqliteConnection;
use tracing::info;

use super::catalog::Capabilities;
use super::role_store;
use super::settings;
use super::tier::Tier;
use crate::db::queries::servers;
use crate::error::AccessResult;

/// Capabilities each tier's role starts with.
///
/// For masters, moderators and members this is exactly what the default
/// permission settings derive.
pub fn initial_grants(tier: Tier) -> Capabilities {
    match tier {
        Tier::Owner => {
            Capabilities::CREATE_ROOM_IN_SERVER
                | Capabilities::SEND_MESSAGES_IN_SERVER
                | Capabilities::DELETE_MASTERS_FROM_SERVER
                | Capabilities::DELETE_MODERATORS_FROM_SERVER
                | Capabilities::DELETE_MEMBERS_FROM_SERVER
                | Capabilities::DELETE_USER_FROM_SERVER
                | Capabilities::EDIT_PERMISSIONS_IN_SERVER
                | Capabilities::EDIT_MASTERS_GROUP
                | Capabilities::EDIT_MODERATORS_GROUP
                | Capabilities::EDIT_MEMBERS_GROUP
                | Capabilities::EDIT_ROOMS_IN_SERVER
                | Capabilities::DISPLAY_PRIVATE_ROOM_DATA
                | Capabilities::DELETE_MESSAGE_FROM_SERVER
                | Capabilities::SEND_INVITATION
        }
        Tier::Master => {
            Capabilities::DELETE_MESSAGE_FROM_SERVER
                | Capabilities::SEND_INVITATION
                | Capabilities::SEND_MESSAGES_IN_SERVER
                | Capabilities::DELETE_MODERATORS_FROM_SERVER
                | Capabilities::DELETE_MEMBERS_FROM_SERVER
                | Capabilities::DELETE_USER_FROM_SERVER
                | Capabilities::EDIT_ROOMS_IN_SERVER
        }
        Tier::Moderator => {
            Capabilities::DELETE_MESSAGE_FROM_SERVER
                | Capabilities::SEND_INVITATION
                | Capabilities::SEND_MESSAGES_IN_SERVER
                | Capabilities::DELETE_MEMBERS_FROM_SERVER
                | Capabilities::DELETE_USER_FROM_SERVER
        }
        Tier::Member => Capabilities::SEND_INVITATION | Capabilities::SEND_MESSAGES_IN_SERVER,
    }
}

/// What a provisioning run created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub created_roles: Vec<Tier>,
    pub settings_created: bool,
}

impl ProvisionOutcome {
    pub fn is_noop(&self) -> bool {
        self.created_roles.is_empty() && !self.settings_created
    }
}

/// Create whatever tier roles, owner assignment and default settings a
/// server is missing.
///
/// Must run inside the caller's transaction while the server lock is held.
/// Existing roles keep their capabilities, so re-running is a no-op.
pub async fn provision(
    conn: &mut SqliteConnection,
    server_id: &str,
    creator_id: &str,
) -> AccessResult<ProvisionOutcome> {
    let mut outcome = ProvisionOutcome::default();

    for tier in Tier::ALL {
        if role_store::role_for_tier(&mut *conn, server_id, tier).await?.is_some() {
            continue;
        }
        let role = role_store::create_role(&mut *conn, server_id, tier).await?;
        role_store::grant(&mut *conn, &role.id, initial_grants(tier)).await?;

        if tier == Tier::Owner {
            servers::add_server_member(&mut *conn, server_id, creator_id).await?;
            role_store::add_member(&mut *conn, &role, creator_id).await?;
        }
        outcome.created_roles.push(tier);
    }

    outcome.settings_created = settings::insert_default_if_missing(&mut *conn, server_id).await?;

    if !outcome.is_noop() {
        info!(
            %server_id,
            %creator_id,
            roles = ?outcome.created_roles,
            settings_created = outcome.settings_created,
            "server provisioned"
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CreateServerParams;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::db::queries::users;
    use crate::engine::propagation::desired_changes;
    use crate::engine::settings::PermissionSettings;
    use sqlx::{Connection, SqlitePool};

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        users::create_user(&pool, "u1", "alice").await.unwrap();
        servers::create_server(
            &pool,
            &CreateServerParams {
                id: "s1",
                name: "Rustaceans",
                description: None,
                is_private: true,
                creator_id: "u1",
            },
        )
        .await
        .unwrap();
        pool
    }

    #[test]
    fn test_initial_grants_match_default_settings() {
        let defaults = PermissionSettings::default();
        for tier in Tier::CONFIGURABLE {
            let (grant, _) = desired_changes(tier, &defaults);
            assert_eq!(initial_grants(tier), grant, "{tier} initial grants drifted");
        }
    }

    #[test]
    fn test_owner_grants() {
        let owners = initial_grants(Tier::Owner);
        assert!(owners.contains(Capabilities::EDIT_PERMISSIONS_IN_SERVER));
        assert!(owners.contains(Capabilities::DELETE_MASTERS_FROM_SERVER));
        assert!(!owners.contains(Capabilities::CHANGE_USER_GROUP));
        for tier in Tier::CONFIGURABLE {
            assert!(owners.contains(initial_grants(tier)));
        }
    }

    #[tokio::test]
    async fn test_provision_creates_everything() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut tx = conn.begin().await.unwrap();
        let outcome = provision(&mut tx, "s1", "u1").await.unwrap();
        tx.commit().await.unwrap();
        drop(conn);

        assert_eq!(outcome.created_roles, Tier::ALL.to_vec());
        assert!(outcome.settings_created);

        let roles = role_store::list_roles(&pool, "s1").await.unwrap();
        assert_eq!(roles.len(), 4);
        for role in &roles {
            assert_eq!(role.permissions, initial_grants(role.tier));
        }
        let owner = role_store::role_of(&pool, "s1", "u1").await.unwrap().unwrap();
        assert_eq!(owner.tier, Tier::Owner);
        assert!(servers::is_server_member(&pool, "s1", "u1").await.unwrap());
        assert_eq!(
            settings::get_settings(&pool, "s1").await.unwrap(),
            PermissionSettings::default()
        );
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        provision(&mut conn, "s1", "u1").await.unwrap();
        let before = role_store::list_roles(&mut *conn, "s1").await.unwrap();

        let again = provision(&mut conn, "s1", "u1").await.unwrap();
        assert!(again.is_noop());
        assert_eq!(role_store::list_roles(&mut *conn, "s1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_provision_fills_gaps_only() {
        let pool = setup_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let members = role_store::create_role(&mut conn, "s1", Tier::Member).await.unwrap();
        role_store::grant(&mut *conn, &members.id, Capabilities::CREATE_ROOM_IN_SERVER)
            .await
            .unwrap();

        let outcome = provision(&mut conn, "s1", "u1").await.unwrap();
        assert_eq!(outcome.created_roles, vec![Tier::Owner, Tier::Master, Tier::Moderator]);

        // The existing role keeps its own capabilities
        let members = role_store::get_role(&mut *conn, &members.id).await.unwrap();
        assert_eq!(members.permissions, Capabilities::CREATE_ROOM_IN_SERVER);
    }
}
