// Client session core: who is signed in, the entity stores, optimistic
// mutations and the background refresh timers, behind one `Client` value.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error as ThisError;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use unera_api::Backend;
use unera_db::{LocalStorage, Stores};
use unera_feed::{compose_feed, FeedSnapshot};
use unera_msg::{Conversation, Credentials, Message, Post, ReactionType, Story, User};
use unera_ref::{AuthToken, ConversationId, PostId, UserId};

mod coordinator;
mod session;
mod shared;
mod sync;

#[cfg(test)]
mod fake;

pub use coordinator::{
    my_reaction, CommentDraft, Coordinator, NewGroup, PostDraft, ProductDraft, ProfileUpdate,
    ShareTarget, StoryDraft, MAX_PRODUCT_IMAGES,
};
pub use session::{Authenticated, Session, TOKEN_KEY};
pub use sync::Synchronizer;

use shared::Shared;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Login required")]
    GuardRejected,
    #[error("Session expired, please log in again")]
    Unauthorized,
    #[error("{message}")]
    Request { status: u16, message: String },
    #[error("Failed to log in, cause: {0}")]
    LoginRejected(String),
    #[error("Failed to update local state, cause: {0}")]
    Store(#[from] unera_db::Error),
    #[error("Failed to talk to server, cause: {0}")]
    Api(#[source] unera_api::Error),
    #[error("Not allowed: {0}")]
    Forbidden(&'static str),
    #[error("Invalid input: {0}")]
    Invalid(&'static str),
}

impl From<unera_api::Error> for Error {
    fn from(err: unera_api::Error) -> Self {
        match err {
            unera_api::Error::Unauthorized => Error::Unauthorized,
            unera_api::Error::Request { status, message } => Error::Request { status, message },
            other => Error::Api(other),
        }
    }
}

/// Notifications for a UI layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// A guest tried something that needs an account.
    LoginRequired,
    /// The server rejected the token; the client is a guest again.
    SessionExpired,
    MutationFailed { message: String },
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub poll_interval: Duration,
    pub story_sweep_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            poll_interval: Duration::from_secs(10),
            story_sweep_interval: Duration::from_secs(60),
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

struct FeedCache {
    revision: u64,
    epoch: u64,
    user_id: Option<UserId>,
    feed: Arc<Vec<Post>>,
}

/// One client session against a backend. Must be created inside a tokio
/// runtime, which runs its background timers.
pub struct Client<B: Backend> {
    shared: Arc<Shared<B>>,
    coordinator: Coordinator<B>,
    feed_cache: Mutex<Option<FeedCache>>,
}

impl<B: Backend> Client<B> {
    pub async fn start(
        backend: B,
        storage: LocalStorage,
        config: ClientConfig,
    ) -> Result<Self, Error> {
        let session = Session::restore(storage).await?;
        let shared = Shared::new(backend, session, config);

        shared.sync.start_sweeping(&shared);
        if shared.session.token().await.is_some() {
            let epoch = shared.session.epoch().await;
            shared.sync.start_polling(&shared, epoch);
        }

        Ok(Client {
            coordinator: Coordinator::new(shared.clone()),
            shared,
            feed_cache: Mutex::new(None),
        })
    }

    pub fn coordinator(&self) -> &Coordinator<B> {
        &self.coordinator
    }

    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.shared.sync
    }

    pub fn stores(&self) -> Arc<RwLock<Stores>> {
        self.shared.stores.clone()
    }

    pub fn subscribe_revisions(&self) -> watch::Receiver<u64> {
        self.shared.subscribe_revisions()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.subscribe_events()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.shared.current_user().await
    }

    /// Exchanges credentials for a token, resolves the user behind it and
    /// persists the token. Starts the conversation poll.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, Error> {
        let backend = &self.shared.backend;
        let response = match backend.login(credentials).await {
            Ok(response) => response,
            Err(unera_api::Error::Request { message, .. }) => {
                return Err(Error::LoginRejected(message))
            }
            Err(err) => return Err(err.into()),
        };
        let token = match response.token {
            Some(token) => token,
            None => {
                return Err(Error::LoginRejected(
                    response.message.unwrap_or_else(|| "Login failed".to_string()),
                ))
            }
        };
        let token = AuthToken::from_string(token)
            .map_err(|_| Error::LoginRejected("Server returned an unusable token".to_string()))?;
        let user = backend.get_current_user(token.as_str()).await?;

        self.shared.sync.stop_polling();
        self.shared.clear_private_stores().await?;
        self.shared
            .write(|stores| {
                stores.users_mut().upsert(user.clone());
                Ok(())
            })
            .await?;
        let epoch = self.shared.session.begin(user.id, token).await?;
        self.shared.sync.start_polling(&self.shared, epoch);

        Ok(user)
    }

    /// Back to guest: stops polling, forgets the persisted token and drops
    /// conversations, messages and notifications.
    pub async fn logout(&self) -> Result<(), Error> {
        self.shared.sync.stop_polling();
        self.shared.session.end().await?;
        self.shared.clear_private_stores().await
    }

    pub async fn refresh(&self) -> Result<(), Error> {
        self.coordinator.refresh().await
    }

    /// The composed home feed. Repeated calls over an unchanged snapshot
    /// return the same allocation, so callers can diff by pointer.
    pub async fn feed(&self) -> Arc<Vec<Post>> {
        let epoch = self.shared.session.epoch().await;
        let user_id = self.shared.session.user_id().await;
        let stores = self.shared.stores.read().await;
        let revision = stores.revision();

        let mut cache = self.feed_cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.revision == revision && cached.epoch == epoch && cached.user_id == user_id {
                return cached.feed.clone();
            }
        }

        let current_user = user_id.and_then(|user_id| stores.users().get_by_id(&user_id));
        let feed = Arc::new(compose_feed(&FeedSnapshot::from_stores(&stores, current_user)));
        *cache = Some(FeedCache {
            revision,
            epoch,
            user_id,
            feed: feed.clone(),
        });
        feed
    }

    pub async fn read<T>(&self, view: impl FnOnce(&Stores) -> T) -> T {
        view(&*self.shared.stores.read().await)
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.read(|stores| {
            stores
                .conversations_by_recency()
                .into_iter()
                .cloned()
                .collect()
        })
        .await
    }

    pub async fn messages(&self, conversation_id: ConversationId) -> Vec<Message> {
        self.read(|stores| {
            stores
                .messages_in(conversation_id)
                .into_iter()
                .cloned()
                .collect()
        })
        .await
    }

    pub async fn active_stories(&self) -> Vec<Story> {
        let now = now_ms();
        self.read(|stores| stores.active_stories(now).into_iter().cloned().collect())
            .await
    }

    pub async fn my_reaction(&self, post_id: PostId) -> Option<ReactionType> {
        let user_id = self.shared.session.user_id().await?;
        self.read(|stores| my_reaction(stores, post_id, user_id)).await
    }
}

impl<B: Backend> Drop for Client<B> {
    fn drop(&mut self) {
        self.shared.sync.stop_all();
    }
}
