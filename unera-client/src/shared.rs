use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use unera_api::Backend;
use unera_db::Stores;
use unera_msg::User;

use crate::{
    now_ms, session::Authenticated, sync::Synchronizer, ClientConfig, ClientEvent, Error, Session,
};

const EVENT_CAPACITY: usize = 64;

/// State every part of a client session reaches into.
pub(crate) struct Shared<B: Backend> {
    pub backend: B,
    pub stores: Arc<RwLock<Stores>>,
    pub session: Session,
    pub config: ClientConfig,
    pub sync: Synchronizer,
    revision: watch::Sender<u64>,
    events: broadcast::Sender<ClientEvent>,
}

impl<B: Backend> Shared<B> {
    pub fn new(backend: B, session: Session, config: ClientConfig) -> Arc<Self> {
        let (revision, _) = watch::channel(0);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Shared {
            backend,
            stores: Arc::new(RwLock::new(Stores::new())),
            session,
            config,
            sync: Synchronizer::new(),
            revision,
            events,
        })
    }

    pub fn subscribe_revisions(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Runs `mutate` under the store write lock and publishes the new
    /// revision once the lock is released, so subscribers never observe a
    /// half-applied change.
    pub async fn write<T>(
        &self,
        mutate: impl FnOnce(&mut Stores) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut stores = self.stores.write().await;
        let before = stores.revision();
        let result = mutate(&mut stores);
        let revision = stores.revision();
        drop(stores);

        if revision != before {
            self.revision.send_replace(revision);
        }
        result
    }

    pub async fn current_user(&self) -> Option<User> {
        let user_id = self.session.user_id().await?;
        self.stores.read().await.users().get_by_id(&user_id).cloned()
    }

    /// Lets a signed-in user through; a guest gets a login prompt instead.
    pub async fn guard(&self) -> Result<Authenticated, Error> {
        match self.session.authenticated().await {
            Some(authenticated) => Ok(authenticated),
            None => {
                self.emit(ClientEvent::LoginRequired);
                Err(Error::GuardRejected)
            }
        }
    }

    /// Tears the session down after the server rejected its token.
    pub async fn expire_session(&self) {
        info!("session expired, continuing as guest");
        if let Err(err) = self.session.end().await {
            warn!("Failed to clear persisted token, cause: {}", err);
        }
        if let Err(err) = self.clear_private_stores().await {
            warn!("Failed to clear private stores, cause: {}", err);
        }
        self.emit(ClientEvent::SessionExpired);
        // may be the poller itself, so this goes last
        self.sync.stop_polling();
    }

    pub async fn clear_private_stores(&self) -> Result<(), Error> {
        self.write(|stores| {
            stores.conversations_mut().replace_all(Vec::new());
            stores.messages_mut().replace_all(Vec::new());
            stores.notifications_mut().replace_all(Vec::new());
            Ok(())
        })
        .await
    }

    /// Converts a failed server call into the caller's error. A 401 ends the
    /// session and the UI is told, but only while session `epoch` is still
    /// the current one; a late reply to an older session changes nothing.
    pub async fn fail(&self, epoch: u64, err: unera_api::Error) -> Error {
        let err = Error::from(err);
        if !self.session.is_current(epoch).await {
            debug!("ignoring failure of a request from an earlier session: {}", err);
            return err;
        }
        if matches!(err, Error::Unauthorized) {
            self.expire_session().await;
        }
        self.emit(ClientEvent::MutationFailed {
            message: err.to_string(),
        });
        err
    }

    /// Refetches the conversation list for session `epoch`. Returns false
    /// once that session is over and the poller should stop.
    pub async fn poll_conversations(&self, epoch: u64) -> bool {
        let token = match self.session.token_for(epoch).await {
            Some(token) => token,
            None => return false,
        };

        match self.backend.get_conversations(token.as_str()).await {
            Ok(conversations) => {
                if !self.session.is_current(epoch).await {
                    return false;
                }
                let result = self
                    .write(|stores| {
                        stores.reconcile_conversations(conversations);
                        Ok(())
                    })
                    .await;
                if let Err(err) = result {
                    warn!("Failed to apply polled conversations, cause: {}", err);
                }
                true
            }
            Err(unera_api::Error::Unauthorized) => {
                warn!("Conversation poll was rejected as unauthorized");
                self.expire_session().await;
                false
            }
            Err(err) => {
                warn!("Failed to poll conversations, cause: {}", err);
                true
            }
        }
    }

    pub async fn sweep_stories(&self) -> usize {
        let now = now_ms();
        self.write(|stores| Ok(stores.sweep_expired_stories(now).len()))
            .await
            .unwrap_or(0)
    }
}
