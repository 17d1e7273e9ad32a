use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};
use unera_ref::{BrandId, CommentId, GroupId, PostId, UserId};

use crate::{Event, Product};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    Like,
    Love,
    Haha,
    Wow,
    Sad,
    Angry,
}

impl ReactionType {
    pub const ALL: [ReactionType; 6] = [
        ReactionType::Like,
        ReactionType::Love,
        ReactionType::Haha,
        ReactionType::Wow,
        ReactionType::Sad,
        ReactionType::Angry,
    ];

    pub fn icon(&self) -> &'static str {
        match self {
            ReactionType::Like => "👍",
            ReactionType::Love => "❤️",
            ReactionType::Haha => "😆",
            ReactionType::Wow => "😮",
            ReactionType::Sad => "😢",
            ReactionType::Angry => "😡",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: ReactionType,
}

/// What a call to [`toggle_reaction`] did to the reaction list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactionChange {
    Added(ReactionType),
    Replaced {
        from: ReactionType,
        to: ReactionType,
    },
    Removed(ReactionType),
}

/// Applies a reaction by `user_id`: the same type again removes it, another
/// type replaces it. Leaves at most one entry for the user.
pub fn toggle_reaction(
    reactions: &mut Vec<Reaction>,
    user_id: UserId,
    kind: ReactionType,
) -> ReactionChange {
    let previous = reaction_of(reactions, user_id);
    reactions.retain(|reaction| reaction.user_id != user_id);

    match previous {
        Some(previous) if previous == kind => ReactionChange::Removed(kind),
        Some(previous) => {
            reactions.push(Reaction { user_id, kind });
            ReactionChange::Replaced {
                from: previous,
                to: kind,
            }
        }
        None => {
            reactions.push(Reaction { user_id, kind });
            ReactionChange::Added(kind)
        }
    }
}

pub fn reaction_of(reactions: &[Reaction], user_id: UserId) -> Option<ReactionType> {
    reactions
        .iter()
        .find(|reaction| reaction.user_id == user_id)
        .map(|reaction| reaction.kind)
}

/// Distinct reaction types in order of first use, for the summary row.
pub fn top_reaction_types(reactions: &[Reaction], limit: usize) -> Vec<ReactionType> {
    let mut kinds: Vec<ReactionType> = Vec::new();
    for reaction in reactions {
        if !kinds.contains(&reaction.kind) {
            kinds.push(reaction.kind);
        }
    }
    kinds.truncate(limit);
    kinds
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Gif,
    File,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub file_name: Option<String>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub user_id: UserId,
    #[serde(default)]
    pub text: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub timestamp: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub likes: u32,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub sticker_url: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub parent_id: Option<CommentId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    #[default]
    Text,
    Image,
    Video,
    Event,
    Product,
    Audio,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Visibility {
    #[default]
    Public,
    Friends,
    #[serde(rename = "Only Me")]
    OnlyMe,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub content: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub image: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub video: Option<String>,
    /// Display string such as "Just now" or "2h".
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub timestamp: String,
    /// Milliseconds since the epoch.
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub shares: u32,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub views: Option<u64>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default, rename = "type")]
    pub kind: PostKind,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub visibility: Visibility,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub location: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub feeling: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub background: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub event: Option<Event>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub product: Option<Product>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub shared_post_id: Option<PostId>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub brand_id: Option<BrandId>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub brand_name: Option<String>,
}

impl Post {
    pub fn new(id: PostId, author_id: UserId) -> Self {
        Post {
            id,
            author_id,
            content: None,
            image: None,
            video: None,
            timestamp: String::new(),
            created_at: None,
            reactions: Vec::new(),
            comments: Vec::new(),
            shares: 0,
            views: None,
            kind: PostKind::Text,
            visibility: Visibility::Public,
            tags: Vec::new(),
            location: None,
            feeling: None,
            background: None,
            event: None,
            product: None,
            shared_post_id: None,
            group_id: None,
            group_name: None,
            brand_id: None,
            brand_name: None,
        }
    }

    pub fn created_at_or_zero(&self) -> i64 {
        self.created_at.unwrap_or(0)
    }

    pub fn find_comment(&self, comment_id: CommentId) -> Option<&Comment> {
        self.comments.iter().find(|comment| comment.id == comment_id)
    }
}
