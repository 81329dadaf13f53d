use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use super::catalog::Capabilities;
use super::chat_engine::ChatEngine;
use super::evaluator;
use super::provisioning;
use super::role_store::{self, Role};
use super::tier::Tier;
use crate::db::models::{InviteRow, ServerRow};
use crate::db::queries::{invites, roles, servers};
use crate::error::{AccessError, AccessResult, is_unique_violation};

/// Lifecycle state of an invite or friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Waiting,
    Accepted,
    Canceled,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Waiting => "waiting",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(RequestStatus::Waiting),
            "accepted" => Ok(RequestStatus::Accepted),
            "canceled" => Ok(RequestStatus::Canceled),
            other => Err(AccessError::Inconsistent(format!("unknown request status '{other}'"))),
        }
    }
}

impl ChatEngine {
    /// Put a user into the server's member set and members tier.
    /// Returns false if they were already a member.
    async fn admit(
        conn: &mut SqliteConnection,
        server: &ServerRow,
        user_id: &str,
    ) -> AccessResult<bool> {
        // Heals a server whose provisioning never completed
        provisioning::provision(&mut *conn, &server.id, &server.creator_id).await?;

        if !servers::add_server_member(&mut *conn, &server.id, user_id).await? {
            return Ok(false);
        }
        let members = role_store::role_for_tier(&mut *conn, &server.id, Tier::Member)
            .await?
            .ok_or_else(|| AccessError::not_found("role", format!("{}/members", server.id)))?;
        role_store::add_member(&mut *conn, &members, user_id).await?;
        Ok(true)
    }

    /// Join a public server as a member. Returns false if already a member.
    pub async fn join_server(&self, user_id: &str, server_id: &str) -> AccessResult<bool> {
        Self::require_user(&self.pool, user_id).await?;
        let server = Self::require_server(&self.pool, server_id).await?;

        let _guard = self.locks.lock(server_id).await;
        let mut tx = self.begin_write().await?;
        if servers::is_server_member(&mut *tx, server_id, user_id).await? {
            return Ok(false);
        }
        if server.is_private() {
            return Err(AccessError::denied(format!(
                "server {server_id} is private and requires an invitation"
            )));
        }
        let joined = Self::admit(&mut tx, &server, user_id).await?;
        tx.commit().await?;

        info!(%server_id, %user_id, "member joined");
        Ok(joined)
    }

    /// Leave a server. The last owner may only leave when nobody else remains.
    pub async fn leave_server(&self, user_id: &str, server_id: &str) -> AccessResult<()> {
        Self::require_server(&self.pool, server_id).await?;

        let _guard = self.locks.lock(server_id).await;
        let mut tx = self.begin_write().await?;
        if !servers::is_server_member(&mut *tx, server_id, user_id).await? {
            return Err(AccessError::not_found("member", user_id));
        }

        let role = role_store::role_of(&mut *tx, server_id, user_id).await?;
        if role.as_ref().is_some_and(|r| r.tier == Tier::Owner) {
            let owners =
                roles::count_tier_members(&mut *tx, server_id, Tier::Owner.as_str()).await?;
            let members = servers::get_member_count(&mut *tx, server_id).await?;
            if owners <= 1 && members > 1 {
                return Err(AccessError::conflict(
                    "the last owner cannot leave while other members remain",
                ));
            }
        }

        role_store::remove_from_all_roles(&mut *tx, server_id, user_id).await?;
        servers::remove_server_member(&mut *tx, server_id, user_id).await?;
        tx.commit().await?;

        info!(%server_id, %user_id, "member left");
        Ok(())
    }

    /// Remove another user from a server, subject to the delete bundles.
    pub async fn kick(&self, actor_id: &str, target_id: &str, server_id: &str) -> AccessResult<()> {
        let server = Self::require_server(&self.pool, server_id).await?;

        let _guard = self.locks.lock(server_id).await;
        let mut tx = self.begin_write().await?;
        if !servers::is_server_member(&mut *tx, server_id, target_id).await? {
            return Err(AccessError::not_found("member", target_id));
        }
        evaluator::ensure_can_delete_user(&mut tx, &self.policy, actor_id, target_id, server_id)
            .await?;

        role_store::remove_from_all_roles(&mut *tx, server_id, target_id).await?;
        servers::remove_server_member(&mut *tx, server_id, target_id).await?;
        tx.commit().await?;

        info!(%server_id, %actor_id, %target_id, "member removed");
        self.notifier
            .notify(target_id, format!("You were removed from {}", server.name));
        Ok(())
    }

    /// Move a user to another tier. The swap is atomic: readers see either
    /// the old tier or the new one.
    pub async fn change_rank(
        &self,
        actor_id: &str,
        target_id: &str,
        server_id: &str,
        dest: Tier,
    ) -> AccessResult<Role> {
        let server = Self::require_server(&self.pool, server_id).await?;

        let _guard = self.locks.lock(server_id).await;
        let mut tx = self.begin_write().await?;
        let current =
            evaluator::ensure_can_change_rank(&mut tx, actor_id, target_id, server_id, dest).await?;
        if current.tier == dest {
            return Ok(current);
        }

        let dest_role = role_store::role_for_tier(&mut *tx, server_id, dest)
            .await?
            .ok_or_else(|| AccessError::not_found("role", format!("{server_id}/{dest}")))?;
        role_store::remove_member(&mut *tx, &current, target_id).await?;
        role_store::add_member(&mut tx, &dest_role, target_id).await?;
        tx.commit().await?;

        info!(%server_id, %actor_id, %target_id, from = %current.tier, to = %dest, "tier changed");
        self.notifier.notify(
            target_id,
            format!("Your tier in {} is now {}", server.name, dest),
        );
        Ok(dest_role)
    }

    // ── Invites ─────────────────────────────────────────────────────

    /// Invite a user to a server. Requires `send_invitation`.
    pub async fn send_invite(
        &self,
        sender_id: &str,
        server_id: &str,
        receiver_id: &str,
    ) -> AccessResult<InviteRow> {
        let server = Self::require_server(&self.pool, server_id).await?;
        let sender = Self::require_user(&self.pool, sender_id).await?;
        Self::require_user(&self.pool, receiver_id).await?;
        Self::require_member(&self.pool, server_id, sender_id).await?;
        evaluator::ensure_can_perform(
            &self.pool,
            sender_id,
            server_id,
            Capabilities::SEND_INVITATION,
        )
        .await?;
        if servers::is_server_member(&self.pool, server_id, receiver_id).await? {
            return Err(AccessError::conflict(format!(
                "user {receiver_id} is already a member"
            )));
        }

        let id = Uuid::new_v4().to_string();
        match invites::create_invite(&self.pool, &id, server_id, sender_id, receiver_id).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AccessError::conflict(format!(
                    "user {receiver_id} already has a pending invite"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        info!(%server_id, %sender_id, %receiver_id, "invite sent");
        self.notifier.notify(
            receiver_id,
            format!("{} invited you to join {}", sender.username, server.name),
        );
        Self::require_invite(&self.pool, &id).await
    }

    async fn require_invite<'e>(
        ex: impl sqlx::SqliteExecutor<'e>,
        invite_id: &str,
    ) -> AccessResult<InviteRow> {
        invites::get_invite(ex, invite_id)
            .await?
            .ok_or_else(|| AccessError::not_found("invite", invite_id))
    }

    pub async fn list_invites(&self, user_id: &str) -> AccessResult<Vec<InviteRow>> {
        Ok(invites::list_for_receiver(&self.pool, user_id).await?)
    }

    pub async fn accept_invite(&self, user_id: &str, invite_id: &str) -> AccessResult<ServerRow> {
        self.resolve_invite(user_id, invite_id, RequestStatus::Accepted).await
    }

    pub async fn decline_invite(&self, user_id: &str, invite_id: &str) -> AccessResult<ServerRow> {
        self.resolve_invite(user_id, invite_id, RequestStatus::Canceled).await
    }

    async fn resolve_invite(
        &self,
        user_id: &str,
        invite_id: &str,
        outcome: RequestStatus,
    ) -> AccessResult<ServerRow> {
        let invite = Self::require_invite(&self.pool, invite_id).await?;
        if invite.receiver_id != user_id {
            return Err(AccessError::denied("only the invited user can answer an invite"));
        }
        let server = Self::require_server(&self.pool, &invite.server_id).await?;
        let receiver = Self::require_user(&self.pool, user_id).await?;

        let _guard = self.locks.lock(&server.id).await;
        let mut tx = self.begin_write().await?;
        let invite = Self::require_invite(&mut *tx, invite_id).await?;
        if invite.status.parse::<RequestStatus>()? != RequestStatus::Waiting {
            return Err(AccessError::conflict(format!("invite {invite_id} was already answered")));
        }

        invites::set_status(&mut *tx, invite_id, outcome.as_str()).await?;
        if outcome == RequestStatus::Accepted {
            Self::admit(&mut tx, &server, user_id).await?;
        }
        let retired = Self::retire_invite(&mut tx, invite_id).await?;
        tx.commit().await?;

        info!(server_id = %server.id, %user_id, status = %retired.status, "invite resolved");
        let verb = match retired.status.parse::<RequestStatus>()? {
            RequestStatus::Accepted => "accepted",
            _ => "declined",
        };
        self.notifier.notify(
            &retired.sender_id,
            format!("{} {} your invitation to join {}", receiver.username, verb, server.name),
        );
        Ok(server)
    }

    /// Delete an answered invite, returning it with its persisted status.
    async fn retire_invite(
        conn: &mut SqliteConnection,
        invite_id: &str,
    ) -> AccessResult<InviteRow> {
        let invite = Self::require_invite(&mut *conn, invite_id).await?;
        invites::delete_invite(&mut *conn, invite_id).await?;
        Ok(invite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::chat_engine::tests::setup_engine;

    #[test]
    fn test_status_parse() {
        for status in [RequestStatus::Waiting, RequestStatus::Accepted, RequestStatus::Canceled] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<RequestStatus>().is_err());
    }

    #[tokio::test]
    async fn test_join_public_and_private() {
        let (engine, _rx) = setup_engine().await;
        let public = engine.create_server("u1", "Public", None, false).await.unwrap();
        let private = engine.create_server("u1", "Private", None, true).await.unwrap();

        assert!(engine.join_server("u2", &public.id).await.unwrap());
        assert!(!engine.join_server("u2", &public.id).await.unwrap());
        let role = role_store::role_of(engine.pool(), &public.id, "u2").await.unwrap().unwrap();
        assert_eq!(role.tier, Tier::Member);

        let err = engine.join_server("u2", &private.id).await.unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied(_)));
        assert!(!servers::is_server_member(engine.pool(), &private.id, "u2").await.unwrap());
    }

    #[tokio::test]
    async fn test_leave_removes_tier() {
        let (engine, _rx) = setup_engine().await;
        let server = engine.create_server("u1", "Public", None, false).await.unwrap();
        engine.join_server("u2", &server.id).await.unwrap();

        engine.leave_server("u2", &server.id).await.unwrap();
        assert!(role_store::role_of(engine.pool(), &server.id, "u2").await.unwrap().is_none());
        let err = engine.leave_server("u2", &server.id).await.unwrap_err();
        assert!(matches!(err, AccessError::NotFound { kind: "member", .. }));
    }

    #[tokio::test]
    async fn test_last_owner_cannot_abandon_members() {
        let (engine, _rx) = setup_engine().await;
        let server = engine.create_server("u1", "Public", None, false).await.unwrap();
        engine.join_server("u2", &server.id).await.unwrap();

        let err = engine.leave_server("u1", &server.id).await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));

        // Once alone, the owner may go
        engine.leave_server("u2", &server.id).await.unwrap();
        engine.leave_server("u1", &server.id).await.unwrap();
        assert_eq!(servers::get_member_count(engine.pool(), &server.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_kick_notifies_removed_user() {
        let (engine, mut rx) = setup_engine().await;
        let server = engine.create_server("u1", "Public", None, false).await.unwrap();
        engine.join_server("u2", &server.id).await.unwrap();

        engine.kick("u1", "u2", &server.id).await.unwrap();
        assert!(!servers::is_server_member(engine.pool(), &server.id, "u2").await.unwrap());
        assert!(role_store::role_of(engine.pool(), &server.id, "u2").await.unwrap().is_none());

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.receiver, "u2");
        assert_eq!(notice.description, "You were removed from Public");
    }

    #[tokio::test]
    async fn test_kick_denied_keeps_membership() {
        let (engine, mut rx) = setup_engine().await;
        let server = engine.create_server("u1", "Public", None, false).await.unwrap();
        engine.join_server("u2", &server.id).await.unwrap();
        engine.join_server("u3", &server.id).await.unwrap();

        let err = engine.kick("u2", "u3", &server.id).await.unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied(_)));
        let err = engine.kick("u2", "u1", &server.id).await.unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied(_)));
        assert!(servers::is_server_member(engine.pool(), &server.id, "u3").await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_change_rank_swaps_tier() {
        let (engine, mut rx) = setup_engine().await;
        let server = engine.create_server("u1", "Public", None, false).await.unwrap();
        engine.join_server("u2", &server.id).await.unwrap();

        let role = engine.change_rank("u1", "u2", &server.id, Tier::Master).await.unwrap();
        assert_eq!(role.tier, Tier::Master);
        let held = role_store::role_of(engine.pool(), &server.id, "u2").await.unwrap().unwrap();
        assert_eq!(held.tier, Tier::Master);

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.receiver, "u2");
        assert!(notice.description.ends_with("is now masters"));

        // Same tier again is a no-op
        let role = engine.change_rank("u1", "u2", &server.id, Tier::Master).await.unwrap();
        assert_eq!(role.tier, Tier::Master);
    }

    #[tokio::test]
    async fn test_change_rank_rejections() {
        let (engine, _rx) = setup_engine().await;
        let server = engine.create_server("u1", "Public", None, false).await.unwrap();
        engine.join_server("u2", &server.id).await.unwrap();

        let err = engine.change_rank("u1", "u2", &server.id, Tier::Owner).await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
        let err = engine.change_rank("u2", "u1", &server.id, Tier::Member).await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
        let err = engine.change_rank("u2", "u2", &server.id, Tier::Master).await.unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied(_)));
        let err = engine.change_rank("u1", "u3", &server.id, Tier::Master).await.unwrap_err();
        assert!(matches!(err, AccessError::NotFound { kind: "member", .. }));
    }

    #[tokio::test]
    async fn test_invite_rules() {
        let (engine, _rx) = setup_engine().await;
        let server = engine.create_server("u1", "Private", None, true).await.unwrap();

        // Non-members cannot invite
        let err = engine.send_invite("u2", &server.id, "u3").await.unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied(_)));

        engine.send_invite("u1", &server.id, "u2").await.unwrap();
        let err = engine.send_invite("u1", &server.id, "u2").await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
        let err = engine.send_invite("u1", &server.id, "u1").await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
        let err = engine.send_invite("u1", &server.id, "ghost").await.unwrap_err();
        assert!(matches!(err, AccessError::NotFound { kind: "user", .. }));
    }

    #[tokio::test]
    async fn test_only_receiver_answers_invite() {
        let (engine, _rx) = setup_engine().await;
        let server = engine.create_server("u1", "Private", None, true).await.unwrap();
        let invite = engine.send_invite("u1", &server.id, "u2").await.unwrap();

        let err = engine.accept_invite("u3", &invite.id).await.unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied(_)));

        engine.decline_invite("u2", &invite.id).await.unwrap();
        assert!(engine.list_invites("u2").await.unwrap().is_empty());
        assert!(!servers::is_server_member(engine.pool(), &server.id, "u2").await.unwrap());

        let err = engine.accept_invite("u2", &invite.id).await.unwrap_err();
        assert!(matches!(err, AccessError::NotFound { kind: "invite", .. }));
    }
}
