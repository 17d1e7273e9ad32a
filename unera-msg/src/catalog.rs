use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};
use unera_ref::{PodcastId, ProductId, ReelId, SongId, StoryId, UserId};

use crate::{Comment, Reaction};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryKind {
    Text,
    #[default]
    Image,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub user_id: UserId,
    /// Milliseconds since the epoch; the story expires 24 hours later.
    pub created_at: i64,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default, rename = "type")]
    pub kind: StoryKind,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub image: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub text: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub background: Option<String>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reel {
    pub id: ReelId,
    pub user_id: UserId,
    pub video_url: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub song_name: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub shares: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Sold,
    Inactive,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// Country code, e.g. "TZ".
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub address: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub main_price: f64,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub discount_price: Option<f64>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub quantity: u32,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub images: Vec<String>,
    pub seller_id: UserId,
    #[serde(default)]
    pub seller_name: String,
    #[serde(default)]
    pub seller_avatar: String,
    /// Listing time in milliseconds since the epoch.
    #[serde(default)]
    pub date: i64,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub status: ProductStatus,
}

impl Product {
    pub fn effective_price(&self) -> f64 {
        match self.discount_price {
            Some(discount) if discount > 0.0 && discount < self.main_price => discount,
            _ => self.main_price,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default)]
    pub plays: u64,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub shares: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub reels_use: u64,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: SongId,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub duration: String,
    pub audio_url: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub stats: Stats,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub uploader_id: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Podcast {
    pub id: PodcastId,
    pub title: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub followers: u64,
}
