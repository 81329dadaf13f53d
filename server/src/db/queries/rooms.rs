use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::models::{CreateRoomParams, RoomRow};

/// Create a room in a server.
pub async fn create_room<'e>(
    ex: impl SqliteExecutor<'e>,
    params: &CreateRoomParams<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO rooms (id, server_id, name, description, is_private) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(params.id)
    .bind(params.server_id)
    .bind(params.name)
    .bind(params.description)
    .bind(params.is_private as i32)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn get_room<'e>(
    ex: impl SqliteExecutor<'e>,
    room_id: &str,
) -> Result<Option<RoomRow>, sqlx::Error> {
    sqlx::query_as::<_, RoomRow>("SELECT * FROM rooms WHERE id = ?")
        .bind(room_id)
        .fetch_optional(ex)
        .await
}

/// List a server's rooms by name. Private rooms are only included when asked for.
pub async fn list_rooms(
    pool: &SqlitePool,
    server_id: &str,
    include_private: bool,
) -> Result<Vec<RoomRow>, sqlx::Error> {
    sqlx::query_as::<_, RoomRow>(
        "SELECT * FROM rooms WHERE server_id = ? AND (is_private = 0 OR ?) ORDER BY name",
    )
    .bind(server_id)
    .bind(include_private)
    .fetch_all(pool)
    .await
}

/// Update a room's editable fields.
pub async fn update_room(
    pool: &SqlitePool,
    room_id: &str,
    name: &str,
    description: &str,
    is_private: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE rooms SET name = ?, description = ?, is_private = ? WHERE id = ?")
        .bind(name)
        .bind(description)
        .bind(is_private as i32)
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CreateServerParams;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::db::queries::{servers, users};

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        users::create_user(&pool, "u1", "alice").await.unwrap();
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
        pool
    }

    fn room<'a>(id: &'a str, name: &'a str, is_private: bool) -> CreateRoomParams<'a> {
        CreateRoomParams {
            id,
            server_id: "s1",
            name,
            description: "",
            is_private,
        }
    }

    #[tokio::test]
    async fn test_private_rooms_filtered() {
        let pool = setup_db().await;
        create_room(&pool, &room("r1", "general", false)).await.unwrap();
        create_room(&pool, &room("r2", "staff", true)).await.unwrap();

        let public = list_rooms(&pool, "s1", false).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].name, "general");

        let all = list_rooms(&pool, "s1", true).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_room_name_unique_per_server() {
        let pool = setup_db().await;
        create_room(&pool, &room("r1", "general", false)).await.unwrap();
        let err = create_room(&pool, &room("r2", "general", true)).await.unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_update_room() {
        let pool = setup_db().await;
        create_room(&pool, &room("r1", "general", false)).await.unwrap();
        update_room(&pool, "r1", "lobby", "say hi", true).await.unwrap();

        let updated = get_room(&pool, "r1").await.unwrap().unwrap();
        assert_eq!(updated.name, "lobby");
        assert_eq!(updated.description, "say hi");
        assert!(updated.is_private());
    }
}
