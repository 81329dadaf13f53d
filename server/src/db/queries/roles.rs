use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::models::{RoleRow, UserRow};

const TIER_ORDER: &str = "CASE tier WHEN 'owners' THEN 0 WHEN 'masters' THEN 1 \
                          WHEN 'moderators' THEN 2 ELSE 3 END";

/// Insert a role. Fails with a unique violation if the tier already exists in the server.
pub async fn insert_role<'e>(
    ex: impl SqliteExecutor<'e>,
    id: &str,
    server_id: &str,
    tier: &str,
    permissions: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO roles (id, server_id, tier, permissions) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(server_id)
        .bind(tier)
        .bind(permissions)
        .execute(ex)
        .await?;
    Ok(())
}

/// Insert a role unless the tier already exists. Returns whether a row was created.
pub async fn insert_role_if_missing<'e>(
    ex: impl SqliteExecutor<'e>,
    id: &str,
    server_id: &str,
    tier: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("INSERT OR IGNORE INTO roles (id, server_id, tier) VALUES (?, ?, ?)")
            .bind(id)
            .bind(server_id)
            .bind(tier)
            .execute(ex)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Get a role by ID.
pub async fn get_role<'e>(
    ex: impl SqliteExecutor<'e>,
    role_id: &str,
) -> Result<Option<RoleRow>, sqlx::Error> {
    sqlx::query_as::<_, RoleRow>("SELECT * FROM roles WHERE id = ?")
        .bind(role_id)
        .fetch_optional(ex)
        .await
}

/// Get a server's role for a tier.
pub async fn get_role_by_tier<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    tier: &str,
) -> Result<Option<RoleRow>, sqlx::Error> {
    sqlx::query_as::<_, RoleRow>("SELECT * FROM roles WHERE server_id = ? AND tier = ?")
        .bind(server_id)
        .bind(tier)
        .fetch_optional(ex)
        .await
}

/// List a server's roles, highest tier first.
pub async fn list_roles<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
) -> Result<Vec<RoleRow>, sqlx::Error> {
    let sql = format!("SELECT * FROM roles WHERE server_id = ? ORDER BY {TIER_ORDER}");
    sqlx::query_as::<_, RoleRow>(&sql)
        .bind(server_id)
        .fetch_all(ex)
        .await
}

/// Apply `(permissions | grant) & ~revoke` to a role in one statement.
/// Returns false if the role does not exist.
pub async fn update_permissions<'e>(
    ex: impl SqliteExecutor<'e>,
    role_id: &str,
    grant: i64,
    revoke: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE roles SET permissions = (permissions | ?) & ~? WHERE id = ?")
        .bind(grant)
        .bind(revoke)
        .bind(role_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Assign a user to a role. Returns false if already assigned to this role.
///
/// A different role in the same server violates `UNIQUE(server_id, user_id)`
/// and surfaces as a database error.
pub async fn add_role_member<'e>(
    ex: impl SqliteExecutor<'e>,
    role_id: &str,
    server_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO role_members (role_id, server_id, user_id) VALUES (?, ?, ?) \
         ON CONFLICT(role_id, user_id) DO NOTHING",
    )
    .bind(role_id)
    .bind(server_id)
    .bind(user_id)
    .execute(ex)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a user from a role. Returns whether they held it.
pub async fn remove_role_member<'e>(
    ex: impl SqliteExecutor<'e>,
    role_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM role_members WHERE role_id = ? AND user_id = ?")
        .bind(role_id)
        .bind(user_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a user from every role in a server.
pub async fn remove_from_all_roles<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    user_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM role_members WHERE server_id = ? AND user_id = ?")
        .bind(server_id)
        .bind(user_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

/// Every role a user holds in a server. More than one row means the
/// one-tier-per-user invariant has been broken.
pub async fn roles_of_user<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    user_id: &str,
) -> Result<Vec<RoleRow>, sqlx::Error> {
    sqlx::query_as::<_, RoleRow>(
        "SELECT r.* FROM roles r \
         JOIN role_members rm ON rm.role_id = r.id \
         WHERE rm.server_id = ? AND rm.user_id = ?",
    )
    .bind(server_id)
    .bind(user_id)
    .fetch_all(ex)
    .await
}

/// Users holding a role, ordered by username.
pub async fn role_members(pool: &SqlitePool, role_id: &str) -> Result<Vec<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        "SELECT u.* FROM users u \
         JOIN role_members rm ON rm.user_id = u.id \
         WHERE rm.role_id = ? ORDER BY u.username",
    )
    .bind(role_id)
    .fetch_all(pool)
    .await
}

/// Number of users holding a tier in a server.
pub async fn count_tier_members<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    tier: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM role_members rm \
         JOIN roles r ON r.id = rm.role_id \
         WHERE r.server_id = ? AND r.tier = ?",
    )
    .bind(server_id)
    .bind(tier)
    .fetch_one(ex)
    .await
}
