use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

/// A stored server (chat space) from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServerRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_private: i32,
    pub creator_id: String,
    pub created_at: String,
}

impl ServerRow {
    pub fn is_private(&self) -> bool {
        self.is_private != 0
    }
}

/// A server membership record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServerMemberRow {
    pub server_id: String,
    pub user_id: String,
    pub joined_at: String,
}

/// A tier role within a server. `permissions` holds the capability bitfield.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleRow {
    pub id: String,
    pub server_id: String,
    pub tier: String,
    pub permissions: i64,
    pub created_at: String,
}

/// A user-to-role assignment.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleMemberRow {
    pub role_id: String,
    pub server_id: String,
    pub user_id: String,
    pub assigned_at: String,
}

/// Member listing entry: user, handle and tier name (if any).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberTierRow {
    pub user_id: String,
    pub username: String,
    pub tier: Option<String>,
}

/// A room within a server.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoomRow {
    pub id: String,
    pub server_id: String,
    pub name: String,
    pub description: String,
    pub is_private: i32,
    pub created_at: String,
}

impl RoomRow {
    pub fn is_private(&self) -> bool {
        self.is_private != 0
    }
}

/// A stored message. Exactly one of `room_id` / `receiver_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub room_id: Option<String>,
    pub receiver_id: Option<String>,
    pub author_id: String,
    pub content: String,
    pub created_at: String,
    pub edited_at: Option<String>,
}

/// A pending server invitation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InviteRow {
    pub id: String,
    pub server_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: String,
    pub created_at: String,
}

/// A pending friend request.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FriendRequestRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: String,
    pub created_at: String,
}

/// A stored notification.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub receiver_id: String,
    pub description: String,
    pub is_read: i32,
    pub created_at: String,
}

/// Parameters for creating a server (avoids too-many-arguments).
pub struct CreateServerParams<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub is_private: bool,
    pub creator_id: &'a str,
}

/// Parameters for creating a room (avoids too-many-arguments).
pub struct CreateRoomParams<'a> {
    pub id: &'a str,
    pub server_id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub is_private: bool,
}
