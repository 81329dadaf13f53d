use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::models::FriendRequestRow;

pub async fn create_request<'e>(
    ex: impl SqliteExecutor<'e>,
    id: &str,
    sender_id: &str,
    receiver_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO friend_requests (id, sender_id, receiver_id) VALUES (?, ?, ?)")
        .bind(id)
        .bind(sender_id)
        .bind(receiver_id)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn get_request<'e>(
    ex: impl SqliteExecutor<'e>,
    request_id: &str,
) -> Result<Option<FriendRequestRow>, sqlx::Error> {
    sqlx::query_as::<_, FriendRequestRow>("SELECT * FROM friend_requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(ex)
        .await
}

/// A pending request between two users in either direction.
pub async fn find_between<'e>(
    ex: impl SqliteExecutor<'e>,
    a: &str,
    b: &str,
) -> Result<Option<FriendRequestRow>, sqlx::Error> {
    sqlx::query_as::<_, FriendRequestRow>(
        "SELECT * FROM friend_requests \
         WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?) \
         LIMIT 1",
    )
    .bind(a)
    .bind(b)
    .bind(b)
    .bind(a)
    .fetch_optional(ex)
    .await
}

/// Requests addressed to a user, newest first.
pub async fn list_incoming(
    pool: &SqlitePool,
    receiver_id: &str,
) -> Result<Vec<FriendRequestRow>, sqlx::Error> {
    sqlx::query_as::<_, FriendRequestRow>(
        "SELECT * FROM friend_requests WHERE receiver_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(receiver_id)
    .fetch_all(pool)
    .await
}

pub async fn set_status<'e>(
    ex: impl SqliteExecutor<'e>,
    request_id: &str,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE friend_requests SET status = ? WHERE id = ?")
        .bind(status)
        .bind(request_id)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn delete_request<'e>(
    ex: impl SqliteExecutor<'e>,
    request_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM friend_requests WHERE id = ?")
        .bind(request_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::db::queries::users;

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        users::create_user(&pool, "u1", "alice").await.unwrap();
        users::create_user(&pool, "u2", "bob").await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_find_between_either_direction() {
        let pool = setup_db().await;
        create_request(&pool, "f1", "u1", "u2").await.unwrap();

        assert_eq!(find_between(&pool, "u1", "u2").await.unwrap().unwrap().id, "f1");
        assert_eq!(find_between(&pool, "u2", "u1").await.unwrap().unwrap().id, "f1");
        assert_eq!(list_incoming(&pool, "u2").await.unwrap().len(), 1);
        assert!(list_incoming(&pool, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_request_rejected() {
        let pool = setup_db().await;
        create_request(&pool, "f1", "u1", "u2").await.unwrap();
        let err = create_request(&pool, "f2", "u1", "u2").await.unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_status_then_delete() {
        let pool = setup_db().await;
        create_request(&pool, "f1", "u1", "u2").await.unwrap();
        set_status(&pool, "f1", "canceled").await.unwrap();
        assert_eq!(get_request(&pool, "f1").await.unwrap().unwrap().status, "canceled");
        assert!(delete_request(&pool, "f1").await.unwrap());
        assert!(find_between(&pool, "u1", "u2").await.unwrap().is_none());
    }
}
