use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::models::InviteRow;

/// Create a waiting invite. A second invite for the same (server, receiver)
/// violates `UNIQUE(server_id, receiver_id)`.
pub async fn create_invite<'e>(
    ex: impl SqliteExecutor<'e>,
    id: &str,
    server_id: &str,
    sender_id: &str,
    receiver_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO invites (id, server_id, sender_id, receiver_id) VALUES (?, ?, ?, ?)",
    )
    .bind(id)
    .bind(server_id)
    .bind(sender_id)
    .bind(receiver_id)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn get_invite<'e>(
    ex: impl SqliteExecutor<'e>,
    invite_id: &str,
) -> Result<Option<InviteRow>, sqlx::Error> {
    sqlx::query_as::<_, InviteRow>("SELECT * FROM invites WHERE id = ?")
        .bind(invite_id)
        .fetch_optional(ex)
        .await
}

/// Pending invites addressed to a user, newest first.
pub async fn list_for_receiver(
    pool: &SqlitePool,
    receiver_id: &str,
) -> Result<Vec<InviteRow>, sqlx::Error> {
    sqlx::query_as::<_, InviteRow>(
        "SELECT * FROM invites WHERE receiver_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(receiver_id)
    .fetch_all(pool)
    .await
}

pub async fn set_status<'e>(
    ex: impl SqliteExecutor<'e>,
    invite_id: &str,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE invites SET status = ? WHERE id = ?")
        .bind(status)
        .bind(invite_id)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn delete_invite<'e>(
    ex: impl SqliteExecutor<'e>,
    invite_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM invites WHERE id = ?")
        .bind(invite_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}
