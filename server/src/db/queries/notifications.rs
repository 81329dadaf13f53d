use sqlx::SqlitePool;

use crate::db::models::NotificationRow;

/// Store a notification for a user.
pub async fn insert_notification(
    pool: &SqlitePool,
    id: &str,
    receiver_id: &str,
    description: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO notifications (id, receiver_id, description) VALUES (?, ?, ?)")
        .bind(id)
        .bind(receiver_id)
        .bind(description)
        .execute(pool)
        .await?;
    Ok(())
}

/// A user's notifications, newest first.
pub async fn list_for_user(
    pool: &SqlitePool,
    receiver_id: &str,
    limit: i64,
) -> Result<Vec<NotificationRow>, sqlx::Error> {
    sqlx::query_as::<_, NotificationRow>(
        "SELECT * FROM notifications WHERE receiver_id = ? \
         ORDER BY created_at DESC, rowid DESC LIMIT ?",
    )
    .bind(receiver_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Mark all of a user's notifications as read. Returns the number updated.
pub async fn mark_all_read(pool: &SqlitePool, receiver_id: &str) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE receiver_id = ? AND is_read = 0")
            .bind(receiver_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}
