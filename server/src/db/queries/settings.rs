use sqlx::SqliteExecutor;

/// The stored settings document (JSON) for a server.
pub async fn get_settings<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT settings FROM permission_settings WHERE server_id = ?")
        .bind(server_id)
        .fetch_optional(ex)
        .await
}

/// Store the settings document unless one exists. Returns whether a row was created.
pub async fn insert_settings_if_missing<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    settings: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO permission_settings (server_id, settings) VALUES (?, ?)",
    )
    .bind(server_id)
    .bind(settings)
    .execute(ex)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Insert or replace the settings document.
pub async fn upsert_settings<'e>(
    ex: impl SqliteExecutor<'e>,
    server_id: &str,
    settings: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO permission_settings (server_id, settings) VALUES (?, ?) \
         ON CONFLICT(server_id) DO UPDATE SET settings = excluded.settings, \
         updated_at = datetime('now')",
    )
    .bind(server_id)
    .bind(settings)
    .execute(ex)
    .await?;
    Ok(())
}
