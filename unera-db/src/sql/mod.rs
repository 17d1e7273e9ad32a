use sqlx::{
    query,
    sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteRow},
    ConnectOptions, Error as SqlError, Row,
};
use std::{path::Path, str::FromStr};

mod items;
mod migrations;
pub(crate) use self::items::*;
pub(crate) use self::migrations::{select_db_version, MIGRATION_VERSION_NUMBER};
use self::migrations::*;

pub async fn create_file_connection(path: &Path) -> Result<SqliteConnection, SqlError> {
    SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Wal)
        .create_if_missing(true)
        .connect()
        .await
}

pub async fn create_memory_connection() -> Result<SqliteConnection, SqlError> {
    SqliteConnectOptions::from_str("sqlite::memory:")?
        .connect()
        .await
}

pub async fn setup_new_db(connection: &mut SqliteConnection) -> Result<(), SqlError> {
    create_tables(connection).await?;

    set_db_version(connection).await?;

    Ok(())
}

pub async fn setup_db(connection: &mut SqliteConnection) -> Result<(), SqlError> {
    set_pragmas(connection).await?;

    Ok(())
}

pub async fn check_db_integrity(connection: &mut SqliteConnection) -> Result<bool, SqlError> {
    let res: String = query("PRAGMA integrity_check")
        .map(|row: SqliteRow| -> String { row.get(0) })
        .fetch_one(connection)
        .await?;

    if res == "ok" {
        Ok(true)
    } else {
        Ok(false)
    }
}

async fn set_pragmas(connection: &mut SqliteConnection) -> Result<(), SqlError> {
    query("PRAGMA synchronous = NORMAL")
        .execute(&mut *connection)
        .await?;
    Ok(())
}

async fn create_tables(connection: &mut SqliteConnection) -> Result<(), SqlError> {
    create_migrations_tables(connection).await?;
    create_items_tables(connection).await?;

    Ok(())
}
