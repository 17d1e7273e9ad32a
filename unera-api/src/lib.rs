use log::{debug, warn};
use reqwest::{header::CONTENT_TYPE, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error as ThisError;
use unera_ref::AuthToken;

mod backend;
pub use backend::{Backend, ProductQuery};

/// How much of a non-JSON body is kept as the error message.
const SNIPPET_LEN: usize = 100;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{message}")]
    Request { status: u16, message: String },
    #[error("Failed to reach server, cause: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Failed to decode response of {endpoint}, cause: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug)]
pub struct RequestOptions<'a> {
    pub method: Method,
    pub body: Option<Value>,
    pub token: Option<&'a str>,
}

impl<'a> RequestOptions<'a> {
    pub fn get(token: Option<&'a str>) -> Self {
        RequestOptions {
            method: Method::GET,
            body: None,
            token,
        }
    }

    pub fn post(token: Option<&'a str>, body: Value) -> Self {
        RequestOptions {
            method: Method::POST,
            body: Some(body),
            token,
        }
    }
}

/// Thin JSON client for the `/api` REST surface.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        ApiClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one request and returns the parsed body.
    ///
    /// Bodies that are not JSON never fail here: they become
    /// `{"message": <first 100 chars>}`, so a gateway error page surfaces as
    /// a [`Error::Request`] carrying a readable snippet.
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions<'_>,
    ) -> Result<Value, Error> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{} {}", options.method, endpoint);

        let mut request = self
            .http
            .request(options.method, url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = options.token.filter(|token| AuthToken::is_plausible(token)) {
            request = request.bearer_auth(token);
        }
        if let Some(body) = options.body {
            request = request.body(body.to_string());
        }

        let response = request.send().await.map_err(Error::Transport)?;
        let status = response.status();

        let token_supplied = options.token.map_or(false, |token| !token.is_empty());
        if status == StatusCode::UNAUTHORIZED && token_supplied {
            return Err(Error::Unauthorized);
        }

        let text = response.text().await.map_err(Error::Transport)?;
        let data = parse_body(endpoint, &text);

        if !status.is_success() {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .filter(|message| !message.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            return Err(Error::Request {
                status: status.as_u16(),
                message,
            });
        }

        Ok(data)
    }

    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions<'_>,
    ) -> Result<T, Error> {
        let data = self.request(endpoint, options).await?;
        serde_json::from_value(data).map_err(|source| Error::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    /// Like [`ApiClient::fetch`] for list endpoints, but entries that fail to
    /// decode are logged and skipped instead of failing the whole list.
    pub(crate) async fn fetch_list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        token: Option<&str>,
    ) -> Result<Vec<T>, Error> {
        let entries: Vec<Value> = self.fetch(endpoint, RequestOptions::get(token)).await?;
        Ok(decode_entries(endpoint, entries))
    }
}

fn parse_body(endpoint: &str, text: &str) -> Value {
    if text.is_empty() {
        return json!({});
    }
    match serde_json::from_str(text) {
        Ok(data) => data,
        Err(err) => {
            warn!("API parse error for {}: {}", endpoint, err);
            let snippet: String = text.chars().take(SNIPPET_LEN).collect();
            if snippet.is_empty() {
                json!({ "message": "Invalid JSON response" })
            } else {
                json!({ "message": snippet })
            }
        }
    }
}

fn decode_entries<T: DeserializeOwned>(endpoint: &str, entries: Vec<Value>) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(entity) => Some(entity),
            Err(err) => {
                warn!("Skipping malformed entry from {}: {}", endpoint, err);
                None
            }
        })
        .collect()
}
