use sqlx::SqlitePool;

use crate::db::models::MessageRow;

/// Insert a new room message.
pub async fn insert_room_message(
    pool: &SqlitePool,
    id: &str,
    room_id: &str,
    author_id: &str,
    content: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO messages (id, room_id, author_id, content) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(room_id)
        .bind(author_id)
        .bind(content)
        .execute(pool)
        .await?;
    Ok(())
}

/// Insert a direct message.
pub async fn insert_dm(
    pool: &SqlitePool,
    id: &str,
    author_id: &str,
    receiver_id: &str,
    content: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO messages (id, receiver_id, author_id, content) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(receiver_id)
        .bind(author_id)
        .bind(content)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_message(
    pool: &SqlitePool,
    message_id: &str,
) -> Result<Option<MessageRow>, sqlx::Error> {
    sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?")
        .bind(message_id)
        .fetch_optional(pool)
        .await
}

/// Fetch room message history with cursor-based pagination.
/// Returns messages before `before_time`, ordered newest first.
pub async fn fetch_room_history(
    pool: &SqlitePool,
    room_id: &str,
    before_time: Option<&str>,
    limit: i64,
) -> Result<Vec<MessageRow>, sqlx::Error> {
    match before_time {
        Some(before) => {
            sqlx::query_as::<_, MessageRow>(
                "SELECT * FROM messages \
                 WHERE room_id = ? AND created_at < ? \
                 ORDER BY created_at DESC, rowid DESC \
                 LIMIT ?",
            )
            .bind(room_id)
            .bind(before)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, MessageRow>(
                "SELECT * FROM messages \
                 WHERE room_id = ? \
                 ORDER BY created_at DESC, rowid DESC \
                 LIMIT ?",
            )
            .bind(room_id)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
    }
}

/// Direct messages exchanged between two users, newest first.
pub async fn fetch_dm_history(
    pool: &SqlitePool,
    user_a: &str,
    user_b: &str,
    limit: i64,
) -> Result<Vec<MessageRow>, sqlx::Error> {
    sqlx::query_as::<_, MessageRow>(
        "SELECT * FROM messages \
         WHERE (author_id = ? AND receiver_id = ?) OR (author_id = ? AND receiver_id = ?) \
         ORDER BY created_at DESC, rowid DESC \
         LIMIT ?",
    )
    .bind(user_a)
    .bind(user_b)
    .bind(user_b)
    .bind(user_a)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Replace a message's content and stamp `edited_at`.
pub async fn update_content(
    pool: &SqlitePool,
    message_id: &str,
    content: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE messages SET content = ?, edited_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
         WHERE id = ?",
    )
    .bind(content)
    .bind(message_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_message(pool: &SqlitePool, message_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM messages WHERE id = ?")
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{CreateRoomParams, CreateServerParams};
    use crate::db::pool::{create_pool, run_migrations};
    use crate::db::queries::{rooms, servers, users};

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        users::create_user(&pool, "u1", "alice").await.unwrap();
        users::create_user(&pool, "u2", "bob").await.unwrap();
        users::create_user(&pool, "u3", "carol").await.unwrap();
        servers::create_server(
            &pool,
            &CreateServerParams {
                id: "s1",
                name: "Rustaceans",
                description: None,
                is_private: false,
                creator_id: "u1",
            },
        )
        .await
        .unwrap();
        rooms::create_room(
            &pool,
            &CreateRoomParams {
                id: "r1",
                server_id: "s1",
                name: "general",
                description: "",
                is_private: false,
            },
        )
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_room_history_newest_first() {
        let pool = setup_db().await;
        for i in 0..5 {
            insert_room_message(&pool, &format!("m{i}"), "r1", "u1", &format!("msg {i}"))
                .await
                .unwrap();
        }

        let history = fetch_room_history(&pool, "r1", None, 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "msg 4");
        assert_eq!(history[2].content, "msg 2");
        assert!(history.iter().all(|m| m.receiver_id.is_none()));
    }

    #[tokio::test]
    async fn test_dm_history_both_directions() {
        let pool = setup_db().await;
        insert_dm(&pool, "d1", "u1", "u2", "hi bob").await.unwrap();
        insert_dm(&pool, "d2", "u2", "u1", "hi alice").await.unwrap();
        insert_dm(&pool, "d3", "u1", "u3", "hi carol").await.unwrap();

        let history = fetch_dm_history(&pool, "u1", "u2", 50).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.room_id.is_none()));
    }

    #[tokio::test]
    async fn test_edit_and_delete() {
        let pool = setup_db().await;
        insert_room_message(&pool, "m1", "r1", "u1", "helo").await.unwrap();
        update_content(&pool, "m1", "hello").await.unwrap();

        let msg = get_message(&pool, "m1").await.unwrap().unwrap();
        assert_eq!(msg.content, "hello");
        assert!(msg.edited_at.is_some());

        assert!(delete_message(&pool, "m1").await.unwrap());
        assert!(!delete_message(&pool, "m1").await.unwrap());
        assert!(get_message(&pool, "m1").await.unwrap().is_none());
    }
}
