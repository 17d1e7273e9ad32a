use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};
use std::collections::BTreeSet;
use unera_ref::{BrandId, EventId, GroupId, PostId, UserId};

use crate::{Comment, Reaction};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    #[default]
    Public,
    Private,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPost {
    pub id: PostId,
    pub author_id: UserId,
    #[serde(default)]
    pub content: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub image: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub video: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub background: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub shares: u32,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: i64,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default, rename = "type")]
    pub kind: GroupKind,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub cover_image: String,
    pub admin_id: UserId,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub members: BTreeSet<UserId>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub posts: Vec<GroupPost>,
    #[serde(default)]
    pub created_date: i64,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub member_posting_allowed: Option<bool>,
}

impl Group {
    pub fn is_member(&self, user_id: UserId) -> bool {
        self.admin_id == user_id || self.members.contains(&user_id)
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_id == user_id
    }

    pub fn can_post(&self, user_id: UserId) -> bool {
        self.is_admin(user_id)
            || (self.is_member(user_id) && self.member_posting_allowed.unwrap_or(true))
    }

    pub fn find_post(&self, post_id: PostId) -> Option<&GroupPost> {
        self.posts.iter().find(|post| post.id == post_id)
    }

    pub fn find_post_mut(&mut self, post_id: PostId) -> Option<&mut GroupPost> {
        self.posts.iter_mut().find(|post| post.id == post_id)
    }
}

/// Partial update applied by the group admin.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettings {
    pub name: Option<String>,
    pub description: Option<String>,
    pub member_posting_allowed: Option<bool>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: BrandId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub admin_id: UserId,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub followers: BTreeSet<UserId>,
    #[serde(default)]
    pub location: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub created_date: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attendance {
    NotAttending,
    Interested,
    Attending,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub organizer_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Calendar date as entered, e.g. "2025-03-01".
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub attendees: BTreeSet<UserId>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub interested_ids: BTreeSet<UserId>,
}

impl Event {
    pub fn attendance_of(&self, user_id: UserId) -> Attendance {
        if self.attendees.contains(&user_id) {
            Attendance::Attending
        } else if self.interested_ids.contains(&user_id) {
            Attendance::Interested
        } else {
            Attendance::NotAttending
        }
    }

    /// Moves `user_id` into `attendance`, keeping the two sets disjoint.
    pub fn set_attendance(&mut self, user_id: UserId, attendance: Attendance) {
        self.attendees.remove(&user_id);
        self.interested_ids.remove(&user_id);
        match attendance {
            Attendance::NotAttending => {}
            Attendance::Interested => {
                self.interested_ids.insert(user_id);
            }
            Attendance::Attending => {
                self.attendees.insert(user_id);
            }
        }
    }
}
