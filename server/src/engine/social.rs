use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;
use tracing::info;
use uuid::Uuid;

use super::catalog::Capabilities;
use super::chat_engine::ChatEngine;
use super::evaluator;
use super::membership::RequestStatus;
use super::validation;
use crate::db::models::{FriendRequestRow, UserRow};
use crate::db::queries::{friends, users};
use crate::error::{AccessError, AccessResult, is_unique_violation};

/// Who may see a user's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileVisibility {
    Everyone,
    FriendsOnly,
    Nobody,
}

impl ProfileVisibility {
    fn grants(self) -> Capabilities {
        match self {
            ProfileVisibility::Everyone => Capabilities::EVERYONE_SEE_PROFILE,
            ProfileVisibility::FriendsOnly => Capabilities::FRIENDS_SEE_PROFILE,
            ProfileVisibility::Nobody => Capabilities::empty(),
        }
    }
}

const PROFILE_CAPS: Capabilities =
    Capabilities::EVERYONE_SEE_PROFILE.union(Capabilities::FRIENDS_SEE_PROFILE);

impl ChatEngine {
    // ── Users ───────────────────────────────────────────────────────

    /// Register a user. New profiles are visible to everyone.
    pub async fn register_user(&self, username: &str) -> AccessResult<UserRow> {
        validation::validate_username(username).map_err(AccessError::Invalid)?;
        if users::get_user_by_username(&self.pool, username).await?.is_some() {
            return Err(AccessError::conflict(format!("username '{username}' is taken")));
        }

        let id = Uuid::new_v4().to_string();
        let mut tx = self.begin_write().await?;
        match users::create_user(&mut *tx, &id, username).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AccessError::conflict(format!("username '{username}' is taken")));
            }
            Err(e) => return Err(e.into()),
        }
        users::update_direct_permissions(
            &mut *tx,
            &id,
            Capabilities::EVERYONE_SEE_PROFILE.to_db(),
            0,
        )
        .await?;
        tx.commit().await?;

        info!(user_id = %id, %username, "user registered");
        Self::require_user(&self.pool, &id).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> AccessResult<UserRow> {
        users::get_user_by_username(&self.pool, username)
            .await?
            .ok_or_else(|| AccessError::not_found("user", username))
    }

    /// Add user-level capabilities (e.g. `change_user_group`).
    pub async fn grant_direct(&self, user_id: &str, caps: Capabilities) -> AccessResult<()> {
        Self::require_user(&self.pool, user_id).await?;
        users::update_direct_permissions(&self.pool, user_id, caps.to_db(), 0).await?;
        Ok(())
    }

    pub async fn revoke_direct(&self, user_id: &str, caps: Capabilities) -> AccessResult<()> {
        Self::require_user(&self.pool, user_id).await?;
        users::update_direct_permissions(&self.pool, user_id, 0, caps.to_db()).await?;
        Ok(())
    }

    /// Swap the profile visibility grants in a single update.
    pub async fn set_profile_visibility(
        &self,
        user_id: &str,
        visibility: ProfileVisibility,
    ) -> AccessResult<()> {
        Self::require_user(&self.pool, user_id).await?;
        let grant = visibility.grants();
        users::update_direct_permissions(
            &self.pool,
            user_id,
            grant.to_db(),
            (PROFILE_CAPS - grant).to_db(),
        )
        .await?;
        Ok(())
    }

    pub async fn can_view_profile(&self, viewer_id: &str, owner_id: &str) -> AccessResult<bool> {
        if viewer_id == owner_id {
            return Ok(true);
        }
        let mut conn = self.pool.acquire().await?;
        let everyone = Capabilities::EVERYONE_SEE_PROFILE;
        if evaluator::has_direct_capability(&mut *conn, owner_id, everyone).await? {
            return Ok(true);
        }
        let friends = Capabilities::FRIENDS_SEE_PROFILE;
        Ok(evaluator::has_direct_capability(&mut *conn, owner_id, friends).await?
            && users::are_friends(&mut *conn, viewer_id, owner_id).await?)
    }

    /// Look up a profile by username, honoring its visibility.
    pub async fn view_profile(&self, viewer_id: &str, username: &str) -> AccessResult<UserRow> {
        let owner = self.get_user_by_username(username).await?;
        if self.can_view_profile(viewer_id, &owner.id).await? {
            Ok(owner)
        } else {
            Err(AccessError::denied(format!("profile of {username} is hidden")))
        }
    }

    // ── Friends ─────────────────────────────────────────────────────

    pub async fn send_friend_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> AccessResult<FriendRequestRow> {
        if sender_id == receiver_id {
            return Err(AccessError::conflict("cannot befriend yourself"));
        }
        let sender = Self::require_user(&self.pool, sender_id).await?;
        Self::require_user(&self.pool, receiver_id).await?;
        if users::are_friends(&self.pool, sender_id, receiver_id).await? {
            return Err(AccessError::conflict("already friends"));
        }
        if friends::find_between(&self.pool, sender_id, receiver_id).await?.is_some() {
            return Err(AccessError::conflict("a friend request is already pending"));
        }

        let id = Uuid::new_v4().to_string();
        match friends::create_request(&self.pool, &id, sender_id, receiver_id).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AccessError::conflict("a friend request is already pending"));
            }
            Err(e) => return Err(e.into()),
        }

        info!(%sender_id, %receiver_id, "friend request sent");
        self.notifier.notify(
            receiver_id,
            format!("{} sent you a friend request", sender.username),
        );
        Self::require_friend_request(&self.pool, &id).await
    }

    async fn require_friend_request<'e>(
        ex: impl SqliteExecutor<'e>,
        request_id: &str,
    ) -> AccessResult<FriendRequestRow> {
        friends::get_request(ex, request_id)
            .await?
            .ok_or_else(|| AccessError::not_found("friend request", request_id))
    }

    pub async fn list_friend_requests(&self, user_id: &str) -> AccessResult<Vec<FriendRequestRow>> {
        Ok(friends::list_incoming(&self.pool, user_id).await?)
    }

    pub async fn list_friends(&self, user_id: &str) -> AccessResult<Vec<UserRow>> {
        Ok(users::list_friends(&self.pool, user_id).await?)
    }

    pub async fn accept_friend_request(&self, user_id: &str, request_id: &str) -> AccessResult<()> {
        self.resolve_friend_request(user_id, request_id, RequestStatus::Accepted)
            .await
    }

    pub async fn decline_friend_request(
        &self,
        user_id: &str,
        request_id: &str,
    ) -> AccessResult<()> {
        self.resolve_friend_request(user_id, request_id, RequestStatus::Canceled)
            .await
    }

    /// Persist the answer, then retire the request and tell the sender.
    async fn resolve_friend_request(
        &self,
        user_id: &str,
        request_id: &str,
        outcome: RequestStatus,
    ) -> AccessResult<()> {
        let receiver = Self::require_user(&self.pool, user_id).await?;

        let mut tx = self.begin_write().await?;
        let request = Self::require_friend_request(&mut *tx, request_id).await?;
        if request.receiver_id != user_id {
            return Err(AccessError::denied(
                "only the receiver can answer a friend request",
            ));
        }
        if request.status.parse::<RequestStatus>()? != RequestStatus::Waiting {
            return Err(AccessError::conflict("friend request was already answered"));
        }

        friends::set_status(&mut *tx, request_id, outcome.as_str()).await?;
        if outcome == RequestStatus::Accepted {
            users::add_friendship(&mut *tx, &request.sender_id, &request.receiver_id).await?;
        }
        let retired = Self::require_friend_request(&mut *tx, request_id).await?;
        friends::delete_request(&mut *tx, request_id).await?;
        tx.commit().await?;

        info!(
            sender_id = %retired.sender_id,
            receiver_id = %user_id,
            status = %retired.status,
            "friend request resolved"
        );
        let verb = match retired.status.parse::<RequestStatus>()? {
            RequestStatus::Accepted => "accepted",
            _ => "declined",
        };
        self.notifier.notify(
            &retired.sender_id,
            format!("{} {} your friend request", receiver.username, verb),
        );
        Ok(())
    }

    pub async fn remove_friend(&self, user_id: &str, friend_id: &str) -> AccessResult<()> {
        if users::remove_friendship(&self.pool, user_id, friend_id).await? {
            info!(%user_id, %friend_id, "friendship removed");
            Ok(())
        } else {
            Err(AccessError::not_found("friend", friend_id))
        }
    }
}
