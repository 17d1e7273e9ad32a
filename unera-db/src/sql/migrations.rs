use log::trace;
use sqlx::{query, sqlite::SqliteRow, Error, Row, SqliteConnection};

pub const MIGRATION_VERSION_NUMBER: i64 = 1;

pub async fn create_migrations_tables(connection: &mut SqliteConnection) -> Result<(), Error> {
    trace!("Creating migrations tables");

    query(
        "CREATE TABLE IF NOT EXISTS migrations (
          id INTEGER PRIMARY KEY,
          version INTEGER
        )",
    )
    .execute(connection)
    .await?;

    Ok(())
}

/// Schema version of an existing db, `None` for a fresh file.
pub async fn select_db_version(connection: &mut SqliteConnection) -> Option<i64> {
    query("SELECT version FROM migrations LIMIT 1")
        .map(|row: SqliteRow| row.get(0))
        .fetch_optional(connection)
        .await
        .unwrap_or(None)
}

pub async fn set_db_version(connection: &mut SqliteConnection) -> Result<(), Error> {
    query("INSERT OR REPLACE INTO migrations (id, version) VALUES (0, ?)")
        .bind(MIGRATION_VERSION_NUMBER)
        .execute(connection)
        .await?;

    Ok(())
}
