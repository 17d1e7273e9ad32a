use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use unera_msg::{
    Conversation, Credentials, LoginResponse, Message, NewMessage, NewPost, Podcast, Post,
    Product, ReactRequest, Reel, Song, Story, User,
};
use unera_ref::PostId;

use crate::{ApiClient, Error, RequestOptions};

/// Query parameters of `GET /products`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub country: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl ProductQuery {
    pub fn to_query_string(&self) -> String {
        let params: Vec<String> = [
            ("country", &self.country),
            ("category", &self.category),
            ("q", &self.search),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .filter(|value| !value.is_empty())
                .map(|value| format!("{}={}", key, urlencoding::encode(value)))
        })
        .collect();

        if params.is_empty() {
            String::new()
        } else {
            format!("?{}", params.join("&"))
        }
    }
}

/// The REST endpoints the client consumes. [`ApiClient`] is the real
/// implementation; tests substitute an in-memory one.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn get_feed(&self, token: Option<&str>) -> Result<Vec<Post>, Error>;
    async fn get_stories(&self, token: Option<&str>) -> Result<Vec<Story>, Error>;
    async fn get_reels(&self, token: Option<&str>) -> Result<Vec<Reel>, Error>;
    async fn get_products(
        &self,
        token: Option<&str>,
        query: &ProductQuery,
    ) -> Result<Vec<Product>, Error>;
    async fn get_songs(&self, token: Option<&str>) -> Result<Vec<Song>, Error>;
    async fn get_podcasts(&self, token: Option<&str>) -> Result<Vec<Podcast>, Error>;
    async fn get_current_user(&self, token: &str) -> Result<User, Error>;
    /// Returns the stored post when the server echoes one back.
    async fn create_post(&self, token: &str, post: &NewPost) -> Result<Option<Post>, Error>;
    async fn react_to_post(
        &self,
        token: &str,
        post_id: PostId,
        react: &ReactRequest,
    ) -> Result<Option<Post>, Error>;
    async fn get_conversations(&self, token: &str) -> Result<Vec<Conversation>, Error>;
    async fn send_message(
        &self,
        token: &str,
        message: &NewMessage,
    ) -> Result<Option<Message>, Error>;
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, Error>;
}

fn to_body<T: serde::Serialize>(endpoint: &str, body: &T) -> Result<Value, Error> {
    serde_json::to_value(body).map_err(|source| Error::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

// Mutation endpoints may answer with the entity or with an empty object.
fn echoed<T: serde::de::DeserializeOwned>(endpoint: &str, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(entity) => Some(entity),
        Err(err) => {
            debug!("{} did not echo an entity: {}", endpoint, err);
            None
        }
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn get_feed(&self, token: Option<&str>) -> Result<Vec<Post>, Error> {
        self.fetch_list("/feed", token).await
    }

    async fn get_stories(&self, token: Option<&str>) -> Result<Vec<Story>, Error> {
        self.fetch_list("/stories", token).await
    }

    async fn get_reels(&self, token: Option<&str>) -> Result<Vec<Reel>, Error> {
        self.fetch_list("/reels", token).await
    }

    async fn get_products(
        &self,
        token: Option<&str>,
        query: &ProductQuery,
    ) -> Result<Vec<Product>, Error> {
        let endpoint = format!("/products{}", query.to_query_string());
        self.fetch_list(&endpoint, token).await
    }

    async fn get_songs(&self, token: Option<&str>) -> Result<Vec<Song>, Error> {
        self.fetch_list("/songs", token).await
    }

    async fn get_podcasts(&self, token: Option<&str>) -> Result<Vec<Podcast>, Error> {
        self.fetch_list("/podcasts", token).await
    }

    async fn get_current_user(&self, token: &str) -> Result<User, Error> {
        self.fetch("/users/me", RequestOptions::get(Some(token)))
            .await
    }

    async fn create_post(&self, token: &str, post: &NewPost) -> Result<Option<Post>, Error> {
        let endpoint = "/posts";
        let body = to_body(endpoint, post)?;
        let data = self
            .request(endpoint, RequestOptions::post(Some(token), body))
            .await?;
        Ok(echoed(endpoint, data))
    }

    async fn react_to_post(
        &self,
        token: &str,
        post_id: PostId,
        react: &ReactRequest,
    ) -> Result<Option<Post>, Error> {
        let endpoint = format!("/posts/{}/react", post_id);
        let body = to_body(&endpoint, react)?;
        let data = self
            .request(&endpoint, RequestOptions::post(Some(token), body))
            .await?;
        Ok(echoed(&endpoint, data))
    }

    async fn get_conversations(&self, token: &str) -> Result<Vec<Conversation>, Error> {
        self.fetch_list("/conversations", Some(token)).await
    }

    async fn send_message(
        &self,
        token: &str,
        message: &NewMessage,
    ) -> Result<Option<Message>, Error> {
        let endpoint = "/messages";
        let body = to_body(endpoint, message)?;
        let data = self
            .request(endpoint, RequestOptions::post(Some(token), body))
            .await?;
        Ok(echoed(endpoint, data))
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, Error> {
        let endpoint = "/auth/login";
        let body = to_body(endpoint, credentials)?;
        self.fetch(endpoint, RequestOptions::post(None, body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use unera_msg::{PostKind, ReactionType};
    use unera_ref::UserId;

    #[test]
    fn test_product_query_string() {
        assert_eq!(ProductQuery::default().to_query_string(), "");
        let query = ProductQuery {
            country: Some("TZ".to_string()),
            category: None,
            search: Some("red shoes".to_string()),
        };
        assert_eq!(query.to_query_string(), "?country=TZ&q=red%20shoes");
    }

    #[tokio::test]
    async fn test_get_feed_skips_malformed_posts() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/feed")
            .with_status(200)
            .with_body(
                json!([
                    { "id": 1, "authorId": 5, "content": "hi" },
                    { "authorId": 5 },
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        let feed = client.get_feed(None).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].author_id, UserId(5));
    }

    #[tokio::test]
    async fn test_get_feed_not_a_list() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/feed")
            .with_status(200)
            .with_body(r#"{"posts": []}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        assert!(matches!(
            client.get_feed(None).await,
            Err(Error::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_react_to_post_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/posts/12/react")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::Json(json!({ "type": "haha" })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        let echoed = client
            .react_to_post(
                "tok",
                PostId(12),
                &ReactRequest {
                    kind: ReactionType::Haha,
                },
            )
            .await
            .unwrap();
        mock.assert_async().await;
        assert!(echoed.is_none());
    }

    #[tokio::test]
    async fn test_create_post_echo() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/posts")
            .match_body(Matcher::Json(json!({ "content": "hello", "type": "text" })))
            .with_status(201)
            .with_body(json!({ "id": 77, "authorId": 1, "content": "hello" }).to_string())
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        let post = client
            .create_post(
                "tok",
                &NewPost {
                    content: "hello".to_string(),
                    kind: PostKind::Text,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(post.id, PostId(77));
    }

    #[tokio::test]
    async fn test_login_rejected_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/auth/login")
            .match_header("authorization", Matcher::Missing)
            .with_status(400)
            .with_body(r#"{"message":"Invalid credentials"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url());
        let err = client
            .login(&Credentials {
                email: "a@unera.app".to_string(),
                password: "wrong".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
    }
}
