// In-memory backend for client tests.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use unera_api::{Backend, Error, ProductQuery};
use unera_msg::{
    Conversation, Credentials, LoginResponse, Message, NewMessage, NewPost, Podcast, Post,
    Product, ReactRequest, Reel, Song, Story, User,
};
use unera_ref::{PostId, UserId};

use crate::now_ms;

const TOKEN: &str = "tok-amani";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    Status(u16),
    Unauthorized,
}

impl Failure {
    fn into_error(self) -> Error {
        match self {
            Failure::Status(status) => Error::Request {
                status,
                message: format!("Request failed with status {}", status),
            },
            Failure::Unauthorized => Error::Unauthorized,
        }
    }
}

struct State {
    password: String,
    user: User,
    feed: Vec<Post>,
    conversations: Vec<Conversation>,
    fail_reads: Option<Failure>,
    fail_mutations: Option<Failure>,
    echo_posts: bool,
    react_gate: Option<Arc<Notify>>,
    calls: Vec<String>,
}

impl State {
    fn read(&mut self, call: &str) -> Result<(), Error> {
        self.calls.push(call.to_string());
        match self.fail_reads {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }

    fn mutate(&mut self, call: &str, token: &str) -> Result<(), Error> {
        self.calls.push(call.to_string());
        if let Some(failure) = self.fail_mutations {
            return Err(failure.into_error());
        }
        authorize(token)
    }
}

fn authorize(token: &str) -> Result<(), Error> {
    if token == TOKEN {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}

#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub const ECHO_POST_ID: PostId = PostId(900);

    pub fn new(password: &str) -> Self {
        FakeBackend {
            state: Arc::new(Mutex::new(State {
                password: password.to_string(),
                user: User::new(UserId(1), "Amani"),
                feed: Vec::new(),
                conversations: Vec::new(),
                fail_reads: None,
                fail_mutations: None,
                echo_posts: false,
                react_gate: None,
                calls: Vec::new(),
            })),
        }
    }

    pub fn token(&self) -> &'static str {
        TOKEN
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count(&self, call: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|made| made.as_str() == call)
            .count()
    }

    pub async fn set_feed(&self, feed: Vec<Post>) {
        self.state.lock().await.feed = feed;
    }

    pub async fn set_conversations(&self, conversations: Vec<Conversation>) {
        self.state.lock().await.conversations = conversations;
    }

    pub async fn fail_reads(&self, failure: Option<Failure>) {
        self.state.lock().await.fail_reads = failure;
    }

    pub async fn fail_mutations(&self, failure: Option<Failure>) {
        self.state.lock().await.fail_mutations = failure;
    }

    pub async fn echo_posts(&self, echo: bool) {
        self.state.lock().await.echo_posts = echo;
    }

    /// Makes reactions wait until the returned gate is notified.
    pub async fn hold_reactions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().await.react_gate = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_feed(&self, _token: Option<&str>) -> Result<Vec<Post>, Error> {
        let mut state = self.state.lock().await;
        state.read("feed")?;
        Ok(state.feed.clone())
    }

    async fn get_stories(&self, _token: Option<&str>) -> Result<Vec<Story>, Error> {
        self.state.lock().await.read("stories")?;
        Ok(Vec::new())
    }

    async fn get_reels(&self, _token: Option<&str>) -> Result<Vec<Reel>, Error> {
        self.state.lock().await.read("reels")?;
        Ok(Vec::new())
    }

    async fn get_products(
        &self,
        _token: Option<&str>,
        _query: &ProductQuery,
    ) -> Result<Vec<Product>, Error> {
        self.state.lock().await.read("products")?;
        Ok(Vec::new())
    }

    async fn get_songs(&self, _token: Option<&str>) -> Result<Vec<Song>, Error> {
        self.state.lock().await.read("songs")?;
        Ok(Vec::new())
    }

    async fn get_podcasts(&self, _token: Option<&str>) -> Result<Vec<Podcast>, Error> {
        self.state.lock().await.read("podcasts")?;
        Ok(Vec::new())
    }

    async fn get_current_user(&self, token: &str) -> Result<User, Error> {
        let mut state = self.state.lock().await;
        state.calls.push("users/me".to_string());
        authorize(token)?;
        Ok(state.user.clone())
    }

    async fn create_post(&self, token: &str, post: &NewPost) -> Result<Option<Post>, Error> {
        let mut state = self.state.lock().await;
        state.mutate("posts", token)?;
        if !state.echo_posts {
            return Ok(None);
        }
        let mut stored = Post::new(Self::ECHO_POST_ID, state.user.id);
        stored.content = Some(post.content.clone());
        stored.kind = post.kind;
        stored.created_at = Some(now_ms());
        Ok(Some(stored))
    }

    async fn react_to_post(
        &self,
        token: &str,
        _post_id: PostId,
        _react: &ReactRequest,
    ) -> Result<Option<Post>, Error> {
        let gate = {
            let mut state = self.state.lock().await;
            state.calls.push("react".to_string());
            state.react_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let state = self.state.lock().await;
        if let Some(failure) = state.fail_mutations {
            return Err(failure.into_error());
        }
        authorize(token)?;
        Ok(None)
    }

    async fn get_conversations(&self, token: &str) -> Result<Vec<Conversation>, Error> {
        let mut state = self.state.lock().await;
        state.read("conversations")?;
        authorize(token)?;
        Ok(state.conversations.clone())
    }

    async fn send_message(
        &self,
        token: &str,
        _message: &NewMessage,
    ) -> Result<Option<Message>, Error> {
        self.state.lock().await.mutate("messages", token)?;
        Ok(None)
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, Error> {
        let mut state = self.state.lock().await;
        state.calls.push("login".to_string());
        if credentials.password != state.password {
            return Err(Error::Request {
                status: 400,
                message: "Invalid credentials".to_string(),
            });
        }
        Ok(LoginResponse {
            token: Some(TOKEN.to_string()),
            message: None,
        })
    }
}
