use log::{info, trace};
use sqlx::{Connection, SqliteConnection};
use std::{io, path::Path};
use thiserror::Error as ThisError;
use unera_ref::{
    BrandId, CommentId, ConversationId, EventId, GroupId, PostId, ReelId, UserId,
};

pub mod sql;
mod store;
mod stores;
use sql::*;
pub use store::{Entity, Store};
pub use stores::{Stores, STORY_TTL_MS};

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Failed to remove file, cause: {0}")]
    RemoveFile(#[source] io::Error),
    #[error("Sql error, cause: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("Sql database failed integrity check")]
    SqlIntegrityCheckFailure {},
    #[error("Unknown user {0}")]
    UnknownUser(UserId),
    #[error("Unknown post {0}")]
    UnknownPost(PostId),
    #[error("Unknown comment {0}")]
    UnknownComment(CommentId),
    #[error("Unknown reel {0}")]
    UnknownReel(ReelId),
    #[error("Unknown group {0}")]
    UnknownGroup(GroupId),
    #[error("Unknown brand {0}")]
    UnknownBrand(BrandId),
    #[error("Unknown event {0}")]
    UnknownEvent(EventId),
    #[error("Unknown conversation {0}")]
    UnknownConversation(ConversationId),
}

/// Persistent key/value storage that survives a restart, the client's
/// equivalent of browser local storage.
pub struct LocalStorage {
    sql: SqliteConnection,
}

impl LocalStorage {
    pub async fn open(path: &Path) -> Result<Self, Error> {
        let mut sql = create_file_connection(path).await?;

        match select_db_version(&mut sql).await {
            None => setup_new_db(&mut sql).await?,
            Some(version) if version != MIGRATION_VERSION_NUMBER => {
                info!("local storage is out of date. Deleting db and it will be rebuilt.");
                sql.close().await?;
                std::fs::remove_file(path).map_err(Error::RemoveFile)?;

                sql = create_file_connection(path).await?;
                setup_new_db(&mut sql).await?;
            }
            Some(_) => {}
        }
        setup_db(&mut sql).await?;

        if !check_db_integrity(&mut sql).await? {
            return Err(Error::SqlIntegrityCheckFailure {});
        }

        Ok(Self { sql })
    }

    pub async fn in_memory() -> Result<Self, Error> {
        let mut sql = create_memory_connection().await?;
        setup_new_db(&mut sql).await?;
        setup_db(&mut sql).await?;
        Ok(Self { sql })
    }

    pub async fn get_item(&mut self, key: &str) -> Result<Option<String>, Error> {
        trace!("get item {}", key);
        Ok(select_item(&mut self.sql, key).await?)
    }

    pub async fn set_item(&mut self, key: &str, value: &str) -> Result<(), Error> {
        trace!("set item {}", key);
        Ok(upsert_item(&mut self.sql, key, value).await?)
    }

    pub async fn remove_item(&mut self, key: &str) -> Result<(), Error> {
        trace!("remove item {}", key);
        Ok(delete_item(&mut self.sql, key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_items_round_trip_in_memory() {
        let mut storage = LocalStorage::in_memory().await.unwrap();
        assert_eq!(storage.get_item("unera_token").await.unwrap(), None);

        storage.set_item("unera_token", "abc").await.unwrap();
        storage.set_item("unera_token", "def").await.unwrap();
        assert_eq!(
            storage.get_item("unera_token").await.unwrap(),
            Some("def".to_string())
        );

        storage.remove_item("unera_token").await.unwrap();
        assert_eq!(storage.get_item("unera_token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_items_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.sqlite3");

        let mut storage = LocalStorage::open(&path).await.unwrap();
        storage.set_item("unera_token", "abc").await.unwrap();
        drop(storage);

        let mut storage = LocalStorage::open(&path).await.unwrap();
        assert_eq!(
            storage.get_item("unera_token").await.unwrap(),
            Some("abc".to_string())
        );
    }
}
