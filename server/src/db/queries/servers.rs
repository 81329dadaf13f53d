use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::models::{CreateServerParams, MemberTierRow, ServerRow};

/// Create a new server.
pub async fn create_server<'e>(
    ex: impl SqliteExecutor<'e>,
    params: &CreateServerParams<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO servers (id, name, description, is_private, creator_id) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(params.id)
    .bind(params.name)
    .bind(params.description)
    .bind(params.is_private as i32)
    .bind(params.creator_id)
    .execute(ex)
    .await?;
    Ok(())
}

/// Get a server by ID.
pub async fn get_server<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
) -> Result<Option<ServerRow>, sqlx::Error> {
    sqlx::query_as::<_, ServerRow>("SELECT * FROM servers WHERE id = ?")
        .bind(server_id)
        .fetch_optional(ex)
        .await
}

/// List servers a user belongs to.
pub async fn list_servers_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<ServerRow>, sqlx::Error> {
    sqlx::query_as::<_, ServerRow>(
        "SELECT s.* FROM servers s \
         JOIN server_members sm ON s.id = sm.server_id \
         WHERE sm.user_id = ? ORDER BY s.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Add a user to a server's member set. Returns false if already a member.
pub async fn add_server_member<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("INSERT OR IGNORE INTO server_members (server_id, user_id) VALUES (?, ?)")
            .bind(server_id)
            .bind(user_id)
            .execute(ex)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a user from a server's member set. Returns whether they were a member.
pub async fn remove_server_member<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM server_members WHERE server_id = ? AND user_id = ?")
        .bind(server_id)
        .bind(user_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn is_server_member<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM server_members WHERE server_id = ? AND user_id = ?",
    )
    .bind(server_id)
    .bind(user_id)
    .fetch_one(ex)
    .await
}

pub async fn get_member_count<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM server_members WHERE server_id = ?")
        .bind(server_id)
        .fetch_one(ex)
        .await
}

/// List members with their tier (if any), ordered by username.
pub async fn list_members_with_tier(
    pool: &SqlitePool,
    server_id: &str,
) -> Result<Vec<MemberTierRow>, sqlx::Error> {
    sqlx::query_as::<_, MemberTierRow>(
        "SELECT u.id AS user_id, u.username, r.tier \
         FROM server_members sm \
         JOIN users u ON u.id = sm.user_id \
         LEFT JOIN role_members rm ON rm.server_id = sm.server_id AND rm.user_id = sm.user_id \
         LEFT JOIN roles r ON r.id = rm.role_id \
         WHERE sm.server_id = ? ORDER BY u.username",
    )
    .bind(server_id)
    .fetch_all(pool)
    .await
}
