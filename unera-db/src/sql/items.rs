use log::trace;
use sqlx::{query, sqlite::SqliteRow, Error, Row, SqliteConnection};

pub async fn create_items_tables(connection: &mut SqliteConnection) -> Result<(), Error> {
    trace!("Creating local_storage tables");

    query(
        "
        CREATE TABLE IF NOT EXISTS local_storage (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        ",
    )
    .execute(connection)
    .await?;

    Ok(())
}

pub async fn select_item(
    connection: &mut SqliteConnection,
    key: &str,
) -> Result<Option<String>, Error> {
    query("SELECT value FROM local_storage WHERE key = ?")
        .bind(key)
        .map(|row: SqliteRow| row.get(0))
        .fetch_optional(connection)
        .await
}

pub async fn upsert_item(
    connection: &mut SqliteConnection,
    key: &str,
    value: &str,
) -> Result<(), Error> {
    query(
        "INSERT INTO local_storage (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(connection)
    .await?;

    Ok(())
}

pub async fn delete_item(connection: &mut SqliteConnection, key: &str) -> Result<(), Error> {
    query("DELETE FROM local_storage WHERE key = ?")
        .bind(key)
        .execute(connection)
        .await?;

    Ok(())
}
