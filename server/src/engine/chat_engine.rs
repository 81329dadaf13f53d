use std::time::Duration;

use sqlx::{Sqlite, SqliteExecutor, SqlitePool, Transaction};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::catalog::Capabilities;
use super::evaluator::{self, MemberCapabilities};
use super::locks::ServerLocks;
use super::notifier::Notifier;
use super::policy::AccessPolicy;
use super::propagation::{self, PropagationReport};
use super::provisioning::{self, ProvisionOutcome};
use super::settings::{self, PermissionSettings};
use super::tier::Tier;
use super::validation;
use crate::config::ProvisioningSection;
use crate::db::models::{
    CreateRoomParams, CreateServerParams, MemberTierRow, MessageRow, NotificationRow, RoomRow,
    ServerRow, UserRow,
};
use crate::db::queries::{messages, notifications, rooms, servers, users};
use crate::error::{AccessError, AccessResult, is_unique_violation};

/// Upper bound on a single history page.
pub const MAX_HISTORY_PAGE: i64 = 100;

/// Entry point for every server, permission, room and message operation.
/// Compound permission changes are serialized per server through `locks`.
pub struct ChatEngine {
    pub(super) pool: SqlitePool,
    pub(super) locks: ServerLocks,
    pub(super) policy: AccessPolicy,
    pub(super) notifier: Notifier,
    provisioning: ProvisioningSection,
}

impl ChatEngine {
    pub fn new(
        pool: SqlitePool,
        policy: AccessPolicy,
        provisioning: ProvisioningSection,
        notifier: Notifier,
    ) -> Self {
        Self {
            pool,
            locks: ServerLocks::new(),
            policy,
            notifier,
            provisioning,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ── Lookups ─────────────────────────────────────────────────────

    pub(super) async fn require_user<'e>(
        ex: impl SqliteExecutor<'e>,
        user_id: &str,
    ) -> AccessResult<UserRow> {
        users::get_user(ex, user_id)
            .await?
            .ok_or_else(|| AccessError::not_found("user", user_id))
    }

    pub(super) async fn require_server<'e>(
        ex: impl SqliteExecutor<'e>,
        server_id: &str,
    ) -> AccessResult<ServerRow> {
        servers::get_server(ex, server_id)
            .await?
            .ok_or_else(|| AccessError::not_found("server", server_id))
    }

    pub(super) async fn require_member<'e>(
        ex: impl SqliteExecutor<'e>,
        server_id: &str,
        user_id: &str,
    ) -> AccessResult<()> {
        if servers::is_server_member(ex, server_id, user_id).await? {
            Ok(())
        } else {
            Err(AccessError::denied(format!(
                "user {user_id} is not a member of server {server_id}"
            )))
        }
    }

    async fn require_room(&self, room_id: &str) -> AccessResult<RoomRow> {
        rooms::get_room(&self.pool, room_id)
            .await?
            .ok_or_else(|| AccessError::not_found("room", room_id))
    }

    pub async fn get_user(&self, user_id: &str) -> AccessResult<UserRow> {
        Self::require_user(&self.pool, user_id).await
    }

    pub async fn get_server(&self, server_id: &str) -> AccessResult<ServerRow> {
        Self::require_server(&self.pool, server_id).await
    }

    pub async fn list_servers_for_user(&self, user_id: &str) -> AccessResult<Vec<ServerRow>> {
        Ok(servers::list_servers_for_user(&self.pool, user_id).await?)
    }

    /// Server details. Private servers are only shown to their members.
    pub async fn view_server(&self, viewer_id: &str, server_id: &str) -> AccessResult<ServerRow> {
        let server = Self::require_server(&self.pool, server_id).await?;
        if server.is_private() {
            Self::require_member(&self.pool, server_id, viewer_id).await?;
        }
        Ok(server)
    }

    pub async fn list_notifications(
        &self,
        user_id: &str,
        limit: i64,
    ) -> AccessResult<Vec<NotificationRow>> {
        let limit = limit.clamp(1, MAX_HISTORY_PAGE);
        Ok(notifications::list_for_user(&self.pool, user_id, limit).await?)
    }

    pub async fn mark_notifications_read(&self, user_id: &str) -> AccessResult<u64> {
        Ok(notifications::mark_all_read(&self.pool, user_id).await?)
    }

    /// Members of a server with their tiers. Private servers are only
    /// listed to their members.
    pub async fn list_members(
        &self,
        viewer_id: &str,
        server_id: &str,
    ) -> AccessResult<Vec<MemberTierRow>> {
        let server = Self::require_server(&self.pool, server_id).await?;
        if server.is_private() {
            Self::require_member(&self.pool, server_id, viewer_id).await?;
        }
        Ok(servers::list_members_with_tier(&self.pool, server_id).await?)
    }

    // ── Server creation & provisioning ──────────────────────────────

    /// Create a server with its default room and its tier roles.
    ///
    /// Everything is written in one transaction, so a failure never leaves
    /// a server without roles. The whole unit is retried on transient
    /// storage errors.
    pub async fn create_server(
        &self,
        creator_id: &str,
        name: &str,
        description: Option<&str>,
        is_private: bool,
    ) -> AccessResult<ServerRow> {
        validation::validate_name("Server", name).map_err(AccessError::Invalid)?;
        if let Some(description) = description {
            validation::validate_description(description).map_err(AccessError::Invalid)?;
        }
        Self::require_user(&self.pool, creator_id).await?;

        let server_id = Uuid::new_v4().to_string();
        let params = CreateServerParams {
            id: &server_id,
            name,
            description,
            is_private,
            creator_id,
        };
        let room_id = Uuid::new_v4().to_string();

        let outcome = self
            .retry_transient(&server_id, || self.create_server_once(&params, &room_id))
            .await
            .inspect_err(|e| {
                if e.is_transient() {
                    error!(%server_id, "server creation gave up: {}", e);
                }
            })?;

        info!(
            %server_id,
            %creator_id,
            %name,
            roles = outcome.created_roles.len(),
            "server created"
        );
        Self::require_server(&self.pool, &server_id).await
    }

    async fn create_server_once(
        &self,
        params: &CreateServerParams<'_>,
        room_id: &str,
    ) -> AccessResult<ProvisionOutcome> {
        let _guard = self.locks.lock(params.id).await;
        let mut tx = self.begin_write().await?;
        match servers::create_server(&mut *tx, params).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AccessError::conflict(format!(
                    "server name '{}' is taken",
                    params.name
                )));
            }
            Err(e) => return Err(e.into()),
        }
        rooms::create_room(
            &mut *tx,
            &CreateRoomParams {
                id: room_id,
                server_id: params.id,
                name: &self.provisioning.default_room_name,
                description: "",
                is_private: false,
            },
        )
        .await?;
        let outcome = provisioning::provision(&mut tx, params.id, params.creator_id).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Run `op` again while it fails with a transient storage error, up to
    /// the configured number of retries.
    async fn retry_transient<T, F, Fut>(&self, server_id: &str, mut op: F) -> AccessResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AccessResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.provisioning.retries => {
                    attempt += 1;
                    warn!(%server_id, attempt, "storage busy, retrying: {}", e);
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                result => return result,
            }
        }
    }

    async fn provision_once(
        &self,
        server_id: &str,
        creator_id: &str,
    ) -> AccessResult<ProvisionOutcome> {
        let _guard = self.locks.lock(server_id).await;
        let mut tx = self.begin_write().await?;
        let outcome = provisioning::provision(&mut tx, server_id, creator_id).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Open a write transaction that takes the database write lock up front.
    ///
    /// A deferred transaction that reads first cannot wait for the lock when
    /// it later writes; `BEGIN IMMEDIATE` waits under `busy_timeout` instead.
    pub(super) async fn begin_write(&self) -> AccessResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Complete provisioning for a server whose roles are missing. No-op
    /// for a fully provisioned server.
    pub async fn ensure_provisioned(&self, server_id: &str) -> AccessResult<ProvisionOutcome> {
        let server = Self::require_server(&self.pool, server_id).await?;
        self.retry_transient(server_id, || self.provision_once(server_id, &server.creator_id))
            .await
    }

    // ── Permission settings ─────────────────────────────────────────

    pub async fn get_settings(
        &self,
        actor_id: &str,
        server_id: &str,
    ) -> AccessResult<PermissionSettings> {
        Self::require_server(&self.pool, server_id).await?;
        Self::require_member(&self.pool, server_id, actor_id).await?;
        settings::get_settings(&self.pool, server_id).await
    }

    /// Store new settings and propagate them to the tier roles atomically.
    pub async fn save_settings(
        &self,
        actor_id: &str,
        server_id: &str,
        new_settings: &PermissionSettings,
    ) -> AccessResult<PropagationReport> {
        Self::require_server(&self.pool, server_id).await?;

        let _guard = self.locks.lock(server_id).await;
        let mut tx = self.begin_write().await?;
        evaluator::ensure_can_perform(
            &mut *tx,
            actor_id,
            server_id,
            Capabilities::EDIT_PERMISSIONS_IN_SERVER,
        )
        .await?;
        settings::store_settings(&mut *tx, server_id, new_settings).await?;
        let report = propagation::propagate(&mut tx, server_id, new_settings).await?;
        tx.commit().await?;

        info!(%server_id, %actor_id, noop = report.is_noop(), "permission settings saved");
        Ok(report)
    }

    // ── Authorization queries ───────────────────────────────────────

    pub async fn can_perform(
        &self,
        actor_id: &str,
        server_id: &str,
        cap: Capabilities,
    ) -> AccessResult<bool> {
        evaluator::can_perform(&self.pool, actor_id, server_id, cap).await
    }

    pub async fn has_direct_capability(
        &self,
        user_id: &str,
        cap: Capabilities,
    ) -> AccessResult<bool> {
        evaluator::has_direct_capability(&self.pool, user_id, cap).await
    }

    pub async fn can_delete_user(
        &self,
        actor_id: &str,
        target_id: &str,
        server_id: &str,
    ) -> AccessResult<bool> {
        let mut conn = self.pool.acquire().await?;
        evaluator::can_delete_user(&mut conn, &self.policy, actor_id, target_id, server_id).await
    }

    pub async fn can_change_rank(
        &self,
        actor_id: &str,
        target_id: &str,
        server_id: &str,
        dest: Tier,
    ) -> AccessResult<bool> {
        let mut conn = self.pool.acquire().await?;
        evaluator::can_change_rank(&mut conn, actor_id, target_id, server_id, dest).await
    }

    /// A member's tier and capabilities, visible to fellow members.
    pub async fn member_capabilities(
        &self,
        viewer_id: &str,
        server_id: &str,
        user_id: &str,
    ) -> AccessResult<MemberCapabilities> {
        let mut conn = self.pool.acquire().await?;
        Self::require_server(&mut *conn, server_id).await?;
        Self::require_member(&mut *conn, server_id, viewer_id).await?;
        evaluator::member_capabilities(&mut conn, server_id, user_id).await
    }

    // ── Rooms ───────────────────────────────────────────────────────

    pub async fn create_room(
        &self,
        actor_id: &str,
        server_id: &str,
        name: &str,
        description: &str,
        is_private: bool,
    ) -> AccessResult<RoomRow> {
        validation::validate_name("Room", name).map_err(AccessError::Invalid)?;
        validation::validate_description(description).map_err(AccessError::Invalid)?;
        Self::require_server(&self.pool, server_id).await?;
        evaluator::ensure_can_perform(
            &self.pool,
            actor_id,
            server_id,
            Capabilities::CREATE_ROOM_IN_SERVER,
        )
        .await?;

        let room_id = Uuid::new_v4().to_string();
        let created = rooms::create_room(
            &self.pool,
            &CreateRoomParams {
                id: &room_id,
                server_id,
                name,
                description,
                is_private,
            },
        )
        .await;
        match created {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AccessError::conflict(format!("room '{name}' already exists")));
            }
            Err(e) => return Err(e.into()),
        }
        info!(%server_id, %room_id, %actor_id, "room created");
        self.require_room(&room_id).await
    }

    pub async fn update_room(
        &self,
        actor_id: &str,
        room_id: &str,
        name: &str,
        description: &str,
        is_private: bool,
    ) -> AccessResult<RoomRow> {
        validation::validate_name("Room", name).map_err(AccessError::Invalid)?;
        validation::validate_description(description).map_err(AccessError::Invalid)?;
        let room = self.require_room(room_id).await?;
        self.ensure_can_view_room(actor_id, &room).await?;
        evaluator::ensure_can_perform(
            &self.pool,
            actor_id,
            &room.server_id,
            Capabilities::EDIT_ROOMS_IN_SERVER,
        )
        .await?;

        match rooms::update_room(&self.pool, room_id, name, description, is_private).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AccessError::conflict(format!("room '{name}' already exists")));
            }
            Err(e) => return Err(e.into()),
        }
        self.require_room(room_id).await
    }

    /// Rooms visible to the viewer. Private rooms need `display_private_room_data`.
    pub async fn list_rooms(&self, viewer_id: &str, server_id: &str) -> AccessResult<Vec<RoomRow>> {
        Self::require_server(&self.pool, server_id).await?;
        Self::require_member(&self.pool, server_id, viewer_id).await?;
        let include_private = evaluator::can_perform(
            &self.pool,
            viewer_id,
            server_id,
            Capabilities::DISPLAY_PRIVATE_ROOM_DATA,
        )
        .await?;
        Ok(rooms::list_rooms(&self.pool, server_id, include_private).await?)
    }

    pub async fn can_view_room(&self, viewer_id: &str, room: &RoomRow) -> AccessResult<bool> {
        if !servers::is_server_member(&self.pool, &room.server_id, viewer_id).await? {
            return Ok(false);
        }
        if !room.is_private() {
            return Ok(true);
        }
        evaluator::can_perform(
            &self.pool,
            viewer_id,
            &room.server_id,
            Capabilities::DISPLAY_PRIVATE_ROOM_DATA,
        )
        .await
    }

    async fn ensure_can_view_room(&self, viewer_id: &str, room: &RoomRow) -> AccessResult<()> {
        if self.can_view_room(viewer_id, room).await? {
            Ok(())
        } else {
            Err(AccessError::denied(format!("room {} is not visible", room.id)))
        }
    }

    // ── Messages ────────────────────────────────────────────────────

    pub async fn send_room_message(
        &self,
        author_id: &str,
        room_id: &str,
        content: &str,
    ) -> AccessResult<MessageRow> {
        validation::validate_message(content).map_err(AccessError::Invalid)?;
        let room = self.require_room(room_id).await?;
        self.ensure_can_view_room(author_id, &room).await?;
        evaluator::ensure_can_perform(
            &self.pool,
            author_id,
            &room.server_id,
            Capabilities::SEND_MESSAGES_IN_SERVER,
        )
        .await?;

        let id = Uuid::new_v4().to_string();
        messages::insert_room_message(&self.pool, &id, room_id, author_id, content).await?;
        self.require_message(&id).await
    }

    /// Send a direct message. Any two distinct users may exchange them.
    pub async fn send_direct_message(
        &self,
        author_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> AccessResult<MessageRow> {
        validation::validate_message(content).map_err(AccessError::Invalid)?;
        if author_id == receiver_id {
            return Err(AccessError::Invalid("cannot message yourself".into()));
        }
        Self::require_user(&self.pool, receiver_id).await?;

        let id = Uuid::new_v4().to_string();
        messages::insert_dm(&self.pool, &id, author_id, receiver_id, content).await?;
        self.require_message(&id).await
    }

    async fn require_message(&self, message_id: &str) -> AccessResult<MessageRow> {
        messages::get_message(&self.pool, message_id)
            .await?
            .ok_or_else(|| AccessError::not_found("message", message_id))
    }

    /// Only the author may edit a message.
    pub async fn edit_message(
        &self,
        actor_id: &str,
        message_id: &str,
        content: &str,
    ) -> AccessResult<MessageRow> {
        validation::validate_message(content).map_err(AccessError::Invalid)?;
        let message = self.require_message(message_id).await?;
        if message.author_id != actor_id {
            return Err(AccessError::denied("only the author can edit a message"));
        }
        messages::update_content(&self.pool, message_id, content).await?;
        self.require_message(message_id).await
    }

    /// The author may always delete; in a room, so may holders of
    /// `delete_message_from_server`.
    pub async fn delete_message(&self, actor_id: &str, message_id: &str) -> AccessResult<()> {
        let message = self.require_message(message_id).await?;
        let allowed = if message.author_id == actor_id {
            true
        } else if let Some(room_id) = &message.room_id {
            let room = self.require_room(room_id).await?;
            evaluator::can_perform(
                &self.pool,
                actor_id,
                &room.server_id,
                Capabilities::DELETE_MESSAGE_FROM_SERVER,
            )
            .await?
        } else {
            false
        };
        if !allowed {
            return Err(AccessError::denied("cannot delete this message"));
        }
        messages::delete_message(&self.pool, message_id).await?;
        info!(%message_id, %actor_id, "message deleted");
        Ok(())
    }

    pub async fn room_history(
        &self,
        viewer_id: &str,
        room_id: &str,
        before: Option<&str>,
        limit: i64,
    ) -> AccessResult<Vec<MessageRow>> {
        let room = self.require_room(room_id).await?;
        self.ensure_can_view_room(viewer_id, &room).await?;
        let limit = limit.clamp(1, MAX_HISTORY_PAGE);
        Ok(messages::fetch_room_history(&self.pool, room_id, before, limit).await?)
    }

    pub async fn dm_history(
        &self,
        user_id: &str,
        other_id: &str,
        limit: i64,
    ) -> AccessResult<Vec<MessageRow>> {
        let limit = limit.clamp(1, MAX_HISTORY_PAGE);
        Ok(messages::fetch_dm_history(&self.pool, user_id, other_id, limit).await?)
    }
}
