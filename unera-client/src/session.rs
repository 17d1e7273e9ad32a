use log::{info, warn};
use tokio::sync::{Mutex, RwLock};
use unera_db::LocalStorage;
use unera_ref::{AuthToken, UserId};

use crate::Error;

/// Local storage key of the persisted bearer token.
pub const TOKEN_KEY: &str = "unera_token";

#[derive(Clone, Debug, Default)]
struct SessionState {
    user_id: Option<UserId>,
    token: Option<AuthToken>,
    epoch: u64,
}

/// Proof that the guard passed: who is acting, with which token, and in
/// which session epoch.
#[derive(Clone, Debug)]
pub struct Authenticated {
    pub user_id: UserId,
    pub token: AuthToken,
    pub epoch: u64,
}

/// The signed-in identity, or a guest. The user itself lives in the user
/// store; the session only knows its id.
///
/// Every login and logout moves the epoch forward, which is how late server
/// replies recognise that the session they were issued for is gone.
pub struct Session {
    state: RwLock<SessionState>,
    storage: Mutex<LocalStorage>,
}

impl Session {
    /// Picks up a token persisted by an earlier run. A missing token means a
    /// guest session.
    pub async fn restore(mut storage: LocalStorage) -> Result<Self, Error> {
        let token = match storage.get_item(TOKEN_KEY).await? {
            Some(raw) => match AuthToken::from_string(raw) {
                Ok(token) => Some(token),
                Err(err) => {
                    warn!("Discarding persisted token: {}", err);
                    storage.remove_item(TOKEN_KEY).await?;
                    None
                }
            },
            None => None,
        };
        if token.is_some() {
            info!("restored persisted session");
        }

        Ok(Session {
            state: RwLock::new(SessionState {
                user_id: None,
                token,
                epoch: 0,
            }),
            storage: Mutex::new(storage),
        })
    }

    pub async fn token(&self) -> Option<AuthToken> {
        self.state.read().await.token.clone()
    }

    pub async fn user_id(&self) -> Option<UserId> {
        self.state.read().await.user_id
    }

    pub async fn epoch(&self) -> u64 {
        self.state.read().await.epoch
    }

    pub async fn is_current(&self, epoch: u64) -> bool {
        self.epoch().await == epoch
    }

    pub async fn is_guest(&self) -> bool {
        self.authenticated().await.is_none()
    }

    /// The acting user, or `None` for a guest. A restored token whose user
    /// has not been resolved yet does not count as signed in.
    pub async fn authenticated(&self) -> Option<Authenticated> {
        let state = self.state.read().await;
        match (state.user_id, state.token.as_ref()) {
            (Some(user_id), Some(token)) => Some(Authenticated {
                user_id,
                token: token.clone(),
                epoch: state.epoch,
            }),
            _ => None,
        }
    }

    /// Token of session `epoch`, if that session is still the current one.
    pub(crate) async fn token_for(&self, epoch: u64) -> Option<AuthToken> {
        let state = self.state.read().await;
        if state.epoch == epoch {
            state.token.clone()
        } else {
            None
        }
    }

    pub(crate) async fn begin(&self, user_id: UserId, token: AuthToken) -> Result<u64, Error> {
        self.storage
            .lock()
            .await
            .set_item(TOKEN_KEY, token.as_str())
            .await?;

        let mut state = self.state.write().await;
        state.user_id = Some(user_id);
        state.token = Some(token);
        state.epoch += 1;
        info!("session started for user {}", user_id);

        Ok(state.epoch)
    }

    /// Attaches the user behind a restored token. Ignored if the session
    /// changed since `epoch`.
    pub(crate) async fn resolve_user(&self, epoch: u64, user_id: UserId) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != epoch || state.token.is_none() {
            return false;
        }
        state.user_id = Some(user_id);
        true
    }

    pub(crate) async fn end(&self) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            state.user_id = None;
            state.token = None;
            state.epoch += 1;
        }
        self.storage.lock().await.remove_item(TOKEN_KEY).await?;
        info!("session ended");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_storage_is_guest() {
        let session = Session::restore(LocalStorage::in_memory().await.unwrap())
            .await
            .unwrap();
        assert!(session.is_guest().await);
        assert!(session.token().await.is_none());
    }

    #[tokio::test]
    async fn test_implausible_persisted_token_is_dropped() {
        let mut storage = LocalStorage::in_memory().await.unwrap();
        storage.set_item(TOKEN_KEY, "undefined").await.unwrap();

        let session = Session::restore(storage).await.unwrap();

        assert!(session.token().await.is_none());
        let stored = session.storage.lock().await.get_item(TOKEN_KEY).await.unwrap();
        assert_eq!(stored, None);
    }

    #[tokio::test]
    async fn test_epoch_moves_on_begin_and_end() {
        let session = Session::restore(LocalStorage::in_memory().await.unwrap())
            .await
            .unwrap();
        let token = AuthToken::from_string("tok".to_string()).unwrap();

        let epoch = session.begin(UserId(1), token).await.unwrap();
        assert_eq!(epoch, 1);
        assert!(session.token_for(epoch).await.is_some());

        session.end().await.unwrap();
        assert!(!session.is_current(epoch).await);
        assert!(session.token_for(epoch).await.is_none());
        assert!(!session.resolve_user(epoch, UserId(1)).await);
    }
}
