use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};
use unera_ref::{ConversationId, MessageId, NotificationId, PostId, ReelId, UserId};

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(rename = "participants")]
    pub participant_ids: Vec<UserId>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub last_message: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub last_message_timestamp: i64,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    pub fn other_participant(&self, me: UserId) -> Option<UserId> {
        self.participant_ids.iter().copied().find(|id| *id != me)
    }

    pub fn includes(&self, user_id: UserId) -> bool {
        self.participant_ids.contains(&user_id)
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    #[serde(default)]
    pub text: String,
    pub timestamp: i64,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub sticker_url: Option<String>,
}

impl Message {
    /// Text shown as the conversation's last message.
    pub fn preview(&self) -> String {
        if self.text.is_empty() && self.sticker_url.is_some() {
            "Sent a sticker".to_string()
        } else {
            self.text.clone()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Share,
    Birthday,
    Reaction,
    Event,
    #[default]
    System,
    Mention,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub sender_id: UserId,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default, rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub content: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub post_id: Option<PostId>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub reel_id: Option<ReelId>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub read: bool,
}
