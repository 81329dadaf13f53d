use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::engine::role_store::RoleView;
use crate::engine::settings::PermissionSettings;
use crate::engine::social::ProfileVisibility;
use crate::engine::tier::Tier;
use crate::error::AccessError;

use super::app_state::AppState;
use super::auth_middleware::AuthUser;

type ApiResult<T> = Result<T, AccessError>;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = match &self {
            AccessError::NotFound { .. } => StatusCode::NOT_FOUND,
            AccessError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AccessError::Conflict(_) => StatusCode::CONFLICT,
            AccessError::Invalid(_) => StatusCode::BAD_REQUEST,
            AccessError::Inconsistent(_) | AccessError::Storage(_) => {
                error!(error = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        // Storage details stay in the log
        let message = match &self {
            AccessError::Storage(_) => "Database error".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

// ── Users ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

/// POST /api/users: register a user. Called by the upstream authenticator.
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state.engine.register_user(&body.username).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users/:username: a profile, subject to its visibility.
pub async fn get_user_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(username): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.view_profile(&auth.user_id, &username).await?))
}

#[derive(Deserialize)]
pub struct VisibilityRequest {
    pub visibility: ProfileVisibility,
}

/// PUT /api/users/me/visibility
pub async fn set_profile_visibility(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<VisibilityRequest>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .set_profile_visibility(&auth.user_id, body.visibility)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Servers ─────────────────────────────────────────────

/// GET /api/servers: the caller's servers.
pub async fn list_servers(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.list_servers_for_user(&auth.user_id).await?))
}

#[derive(Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_private")]
    pub is_private: bool,
}

fn default_private() -> bool {
    true
}

/// POST /api/servers: create a server; the caller becomes its owner.
pub async fn create_server(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateServerRequest>,
) -> ApiResult<impl IntoResponse> {
    let server = state
        .engine
        .create_server(
            &auth.user_id,
            &body.name,
            body.description.as_deref(),
            body.is_private,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(server)))
}

/// GET /api/servers/:id
pub async fn get_server(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(server_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.view_server(&auth.user_id, &server_id).await?))
}

#[derive(Serialize)]
pub struct JoinResponse {
    pub joined: bool,
}

/// POST /api/servers/:id/join
pub async fn join_server(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(server_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let joined = state.engine.join_server(&auth.user_id, &server_id).await?;
    Ok(Json(JoinResponse { joined }))
}

/// POST /api/servers/:id/leave
pub async fn leave_server(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(server_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.leave_server(&auth.user_id, &server_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/servers/:id/members: members with their tiers.
pub async fn list_server_members(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(server_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.list_members(&auth.user_id, &server_id).await?))
}

/// DELETE /api/servers/:id/members/:user_id: remove a member.
pub async fn kick_member(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((server_id, user_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.engine.kick(&auth.user_id, &user_id, &server_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ChangeTierRequest {
    pub tier: Tier,
}

/// PUT /api/servers/:id/members/:user_id/tier
pub async fn change_member_tier(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((server_id, user_id)): Path<(String, String)>,
    Json(body): Json<ChangeTierRequest>,
) -> ApiResult<impl IntoResponse> {
    let role = state
        .engine
        .change_rank(&auth.user_id, &user_id, &server_id, body.tier)
        .await?;
    Ok(Json(RoleView::from(&role)))
}

/// GET /api/servers/:id/members/:user_id/permissions
pub async fn get_member_permissions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((server_id, user_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .engine
            .member_capabilities(&auth.user_id, &server_id, &user_id)
            .await?,
    ))
}

// ── Permission settings ─────────────────────────────────

/// GET /api/servers/:id/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(server_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.get_settings(&auth.user_id, &server_id).await?))
}

/// PUT /api/servers/:id/settings: save and propagate to the tier roles.
pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(server_id): Path<String>,
    Json(body): Json<PermissionSettings>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .engine
        .save_settings(&auth.user_id, &server_id, &body)
        .await?;
    Ok(Json(report))
}

// ── Rooms ───────────────────────────────────────────────

/// GET /api/servers/:id/rooms
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(server_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.list_rooms(&auth.user_id, &server_id).await?))
}

#[derive(Deserialize)]
pub struct RoomRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_private: bool,
}

/// POST /api/servers/:id/rooms
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(server_id): Path<String>,
    Json(body): Json<RoomRequest>,
) -> ApiResult<impl IntoResponse> {
    let room = state
        .engine
        .create_room(
            &auth.user_id,
            &server_id,
            &body.name,
            &body.description,
            body.is_private,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// PUT /api/rooms/:id
pub async fn update_room(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(room_id): Path<String>,
    Json(body): Json<RoomRequest>,
) -> ApiResult<impl IntoResponse> {
    let room = state
        .engine
        .update_room(
            &auth.user_id,
            &room_id,
            &body.name,
            &body.description,
            body.is_private,
        )
        .await?;
    Ok(Json(room))
}

// ── Messages ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct HistoryParams {
    pub before: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

/// GET /api/rooms/:id/messages
pub async fn get_room_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(room_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<impl IntoResponse> {
    let messages = state
        .engine
        .room_history(
            &auth.user_id,
            &room_id,
            params.before.as_deref(),
            params.limit.unwrap_or(50),
        )
        .await?;
    Ok(Json(messages))
}

/// POST /api/rooms/:id/messages
pub async fn send_room_message(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(room_id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = state
        .engine
        .send_room_message(&auth.user_id, &room_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/dms/:user_id
pub async fn get_dm_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(other_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<impl IntoResponse> {
    let messages = state
        .engine
        .dm_history(&auth.user_id, &other_id, params.limit.unwrap_or(50))
        .await?;
    Ok(Json(messages))
}

/// POST /api/dms/:user_id
pub async fn send_direct_message(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(receiver_id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = state
        .engine
        .send_direct_message(&auth.user_id, &receiver_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// PATCH /api/messages/:id: author only.
pub async fn edit_message(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(message_id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = state
        .engine
        .edit_message(&auth.user_id, &message_id, &body.content)
        .await?;
    Ok(Json(message))
}

/// DELETE /api/messages/:id
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(message_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.delete_message(&auth.user_id, &message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Invites ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TargetUserRequest {
    pub user_id: String,
}

/// POST /api/servers/:id/invites
pub async fn send_invite(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(server_id): Path<String>,
    Json(body): Json<TargetUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let invite = state
        .engine
        .send_invite(&auth.user_id, &server_id, &body.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

/// GET /api/invites: pending invites addressed to the caller.
pub async fn list_invites(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.list_invites(&auth.user_id).await?))
}

/// POST /api/invites/:id/accept
pub async fn accept_invite(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(invite_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.accept_invite(&auth.user_id, &invite_id).await?))
}

/// POST /api/invites/:id/decline
pub async fn decline_invite(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(invite_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.decline_invite(&auth.user_id, &invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Friends ─────────────────────────────────────────────

/// POST /api/friends/requests
pub async fn send_friend_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<TargetUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = state
        .engine
        .send_friend_request(&auth.user_id, &body.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/friends/requests: pending requests addressed to the caller.
pub async fn list_friend_requests(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.list_friend_requests(&auth.user_id).await?))
}

/// POST /api/friends/requests/:id/accept
pub async fn accept_friend_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(request_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .accept_friend_request(&auth.user_id, &request_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/friends/requests/:id/decline
pub async fn decline_friend_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(request_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .decline_friend_request(&auth.user_id, &request_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/friends
pub async fn list_friends(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.list_friends(&auth.user_id).await?))
}

/// DELETE /api/friends/:user_id
pub async fn remove_friend(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(friend_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.remove_friend(&auth.user_id, &friend_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Notifications ───────────────────────────────────────

#[derive(Deserialize)]
pub struct NotificationParams {
    pub limit: Option<i64>,
}

/// GET /api/notifications: newest first.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<NotificationParams>,
) -> ApiResult<impl IntoResponse> {
    let notifications = state
        .engine
        .list_notifications(&auth.user_id, params.limit.unwrap_or(50))
        .await?;
    Ok(Json(notifications))
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

/// POST /api/notifications/read
pub async fn mark_notifications_read(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let updated = state.engine.mark_notifications_read(&auth.user_id).await?;
    Ok(Json(MarkReadResponse { updated }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AccessError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_of(AccessError::not_found("server", "s1")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(AccessError::denied("no")), StatusCode::FORBIDDEN);
        assert_eq!(status_of(AccessError::conflict("dup")), StatusCode::CONFLICT);
        assert_eq!(status_of(AccessError::Invalid("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(AccessError::Inconsistent("two tiers".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(AccessError::Storage(sqlx::Error::PoolTimedOut)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
