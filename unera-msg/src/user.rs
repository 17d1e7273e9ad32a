use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};
use std::collections::BTreeSet;
use unera_ref::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub profile_image: String,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub bio: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub location: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub work: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub is_online: bool,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub is_verified: bool,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub role: Option<Role>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub followers: BTreeSet<UserId>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub following: BTreeSet<UserId>,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        User {
            id,
            name: name.into(),
            profile_image: String::new(),
            cover_image: None,
            bio: None,
            location: None,
            work: None,
            is_online: false,
            is_verified: false,
            role: None,
            followers: BTreeSet::new(),
            following: BTreeSet::new(),
        }
    }

    pub fn is_following(&self, other: UserId) -> bool {
        self.following.contains(&other)
    }

    pub fn shares_location_with(&self, other: &User) -> bool {
        match (&self.location, &other.location) {
            (Some(mine), Some(theirs)) => !mine.is_empty() && mine == theirs,
            _ => false,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Some(Role::Admin))
    }
}
