use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::models::UserRow;

/// Create a new user.
pub async fn create_user<'e>(
    ex: impl SqliteExecutor<'e>,
    id: &str,
    username: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO users (id, username) VALUES (?, ?)")
        .bind(id)
        .bind(username)
        .execute(ex)
        .await?;
    Ok(())
}

/// Get a user by ID.
pub async fn get_user<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(ex)
        .await
}

/// Look up a user by username (case-insensitive).
pub async fn get_user_by_username<'e>(
    ex: impl SqliteExecutor<'e>,
    username: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ? COLLATE NOCASE")
        .bind(username)
        .fetch_optional(ex)
        .await
}

// ── Direct capability grants ──

/// The user's direct capability bitfield (0 when none recorded).
pub async fn direct_permissions<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: &str,
) -> Result<i64, sqlx::Error> {
    let bits: Option<i64> =
        sqlx::query_scalar("SELECT permissions FROM user_permissions WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(ex)
            .await?;
    Ok(bits.unwrap_or(0))
}

/// Apply `(permissions | grant) & ~revoke` to the user's direct grants in one statement.
pub async fn update_direct_permissions<'e>(
    ex: impl SqliteExecutor<'e>,
    user_id: &str,
    grant: i64,
    revoke: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_permissions (user_id, permissions) VALUES (?, ? & ~?) \
         ON CONFLICT(user_id) DO UPDATE SET permissions = (permissions | ?) & ~?",
    )
    .bind(user_id)
    .bind(grant)
    .bind(revoke)
    .bind(grant)
    .bind(revoke)
    .execute(ex)
    .await?;
    Ok(())
}

// ── Friendships ──

fn canonical<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a < b { (a, b) } else { (b, a) }
}

/// Record a friendship between two users. Idempotent.
pub async fn add_friendship<'e>(
    ex: impl SqliteExecutor<'e>,
    a: &str,
    b: &str,
) -> Result<(), sqlx::Error> {
    let (user_a, user_b) = canonical(a, b);
    sqlx::query("INSERT OR IGNORE INTO friendships (user_a, user_b) VALUES (?, ?)")
        .bind(user_a)
        .bind(user_b)
        .execute(ex)
        .await?;
    Ok(())
}

/// Remove a friendship. Returns whether one existed.
pub async fn remove_friendship<'e>(
    ex: impl SqliteExecutor<'e>,
    a: &str,
    b: &str,
) -> Result<bool, sqlx::Error> {
    let (user_a, user_b) = canonical(a, b);
    let result = sqlx::query("DELETE FROM friendships WHERE user_a = ? AND user_b = ?")
        .bind(user_a)
        .bind(user_b)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn are_friends<'e>(
    ex: impl SqliteExecutor<'e>,
    a: &str,
    b: &str,
) -> Result<bool, sqlx::Error> {
    let (user_a, user_b) = canonical(a, b);
    sqlx::query_scalar("SELECT COUNT(*) > 0 FROM friendships WHERE user_a = ? AND user_b = ?")
        .bind(user_a)
        .bind(user_b)
        .fetch_one(ex)
        .await
}

/// List a user's friends, ordered by username.
pub async fn list_friends(pool: &SqlitePool, user_id: &str) -> Result<Vec<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        "SELECT u.* FROM users u \
         JOIN friendships f ON (f.user_a = ? AND u.id = f.user_b) \
                            OR (f.user_b = ? AND u.id = f.user_a) \
         ORDER BY u.username",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await
}
