use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::app_state::AppState;
use super::rest_api;

/// Build the axum router with all HTTP routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let user_routes = Router::new()
        .route("/api/users", post(rest_api::register_user))
        .route("/api/users/{username}", get(rest_api::get_user_profile))
        .route(
            "/api/users/me/visibility",
            put(rest_api::set_profile_visibility),
        );

    let server_routes = Router::new()
        .route(
            "/api/servers",
            get(rest_api::list_servers).post(rest_api::create_server),
        )
        .route("/api/servers/{id}", get(rest_api::get_server))
        .route("/api/servers/{id}/join", post(rest_api::join_server))
        .route("/api/servers/{id}/leave", post(rest_api::leave_server))
        .route(
            "/api/servers/{id}/members",
            get(rest_api::list_server_members),
        )
        .route(
            "/api/servers/{id}/members/{user_id}",
            delete(rest_api::kick_member),
        )
        .route(
            "/api/servers/{id}/members/{user_id}/tier",
            put(rest_api::change_member_tier),
        )
        .route(
            "/api/servers/{id}/members/{user_id}/permissions",
            get(rest_api::get_member_permissions),
        )
        .route(
            "/api/servers/{id}/settings",
            get(rest_api::get_settings).put(rest_api::save_settings),
        )
        .route(
            "/api/servers/{id}/rooms",
            get(rest_api::list_rooms).post(rest_api::create_room),
        )
        .route("/api/servers/{id}/invites", post(rest_api::send_invite));

    let chat_routes = Router::new()
        .route("/api/rooms/{id}", put(rest_api::update_room))
        .route(
            "/api/rooms/{id}/messages",
            get(rest_api::get_room_history).post(rest_api::send_room_message),
        )
        .route(
            "/api/dms/{user_id}",
            get(rest_api::get_dm_history).post(rest_api::send_direct_message),
        )
        .route(
            "/api/messages/{id}",
            axum::routing::patch(rest_api::edit_message).delete(rest_api::delete_message),
        );

    let social_routes = Router::new()
        .route("/api/invites", get(rest_api::list_invites))
        .route("/api/invites/{id}/accept", post(rest_api::accept_invite))
        .route("/api/invites/{id}/decline", post(rest_api::decline_invite))
        .route(
            "/api/friends/requests",
            get(rest_api::list_friend_requests).post(rest_api::send_friend_request),
        )
        .route(
            "/api/friends/requests/{id}/accept",
            post(rest_api::accept_friend_request),
        )
        .route(
            "/api/friends/requests/{id}/decline",
            post(rest_api::decline_friend_request),
        )
        .route("/api/friends", get(rest_api::list_friends))
        .route("/api/friends/{user_id}", delete(rest_api::remove_friend))
        .route("/api/notifications", get(rest_api::list_notifications))
        .route(
            "/api/notifications/read",
            post(rest_api::mark_notifications_read),
        );

    Router::new()
        .merge(user_routes)
        .merge(server_routes)
        .merge(chat_routes)
        .merge(social_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
