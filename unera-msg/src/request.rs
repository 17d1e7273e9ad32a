use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};
use unera_ref::ConversationId;

use crate::{PostKind, ReactionType};

/// Body of `POST /posts`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NewPost {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: PostKind,
}

/// Body of `POST /posts/:id/react`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ReactRequest {
    #[serde(rename = "type")]
    pub kind: ReactionType,
}

/// Body of `POST /messages`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sticker_url: Option<String>,
}

#[derive(Clone, PartialEq, Deserialize, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Reply of `POST /auth/login`: a token on success, a message otherwise.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct LoginResponse {
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub token: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub message: Option<String>,
}
