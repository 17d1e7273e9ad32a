use hashtag_regex::HASHTAG_RE_STRING;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};
use thiserror::Error as ThisError;

/// Product promotions are projected into the feed as posts whose id is the
/// product id shifted by this offset. Organic post ids must stay below it.
pub const SYNTHETIC_POST_ID_OFFSET: u64 = 1_000_000_000_000_000;

#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum RefError {
    #[error("Does not match as {ref_type}: {input}")]
    BadFormat {
        ref_type: &'static str,
        input: String,
    },
    #[error("Id {id} does not fit in the synthetic post id range")]
    SyntheticOverflow { id: u64 },
}

macro_rules! numeric_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_ref!(UserId);
numeric_ref!(
    /// Id of a post in the global feed, organic or synthetic.
    PostId
);
numeric_ref!(CommentId);
numeric_ref!(StoryId);
numeric_ref!(ReelId);
numeric_ref!(ProductId);
numeric_ref!(BrandId);
numeric_ref!(EventId);
numeric_ref!(ConversationId);
numeric_ref!(MessageId);
numeric_ref!(NotificationId);

impl PostId {
    pub fn is_synthetic(&self) -> bool {
        self.0 >= SYNTHETIC_POST_ID_OFFSET
    }

    // Only meaningful for ids produced by ProductId::to_synthetic_post_id
    pub fn to_product_id(&self) -> Option<ProductId> {
        if self.is_synthetic() {
            Some(ProductId(self.0 - SYNTHETIC_POST_ID_OFFSET))
        } else {
            None
        }
    }
}

impl ProductId {
    pub fn to_synthetic_post_id(&self) -> Result<PostId, RefError> {
        self.0
            .checked_add(SYNTHETIC_POST_ID_OFFSET)
            .map(PostId)
            .ok_or(RefError::SyntheticOverflow { id: self.0 })
    }
}

macro_rules! string_ref {
    ($name:ident) => {
        #[derive(
            Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_ref!(GroupId);
string_ref!(SongId);
string_ref!(PodcastId);

/// Bearer token handed out by `/auth/login`.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String")]
pub struct AuthToken(String);

impl AuthToken {
    pub fn from_string(string: String) -> Result<Self, RefError> {
        if !Self::is_plausible(string.as_str()) {
            Err(RefError::BadFormat {
                ref_type: "AuthToken",
                input: string,
            })
        } else {
            Ok(Self(string))
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn single_regex() -> &'static Regex {
        lazy_static! {
            // RFC 6750 b64token
            static ref RE: Regex = Regex::new(r"^[A-Za-z0-9\-._~+/]+=*$").unwrap();
        }
        &*RE
    }

    /// Whether a raw string may be sent as a bearer credential. Serialized
    /// absent values ("null", "undefined") from persisted state never qualify.
    pub fn is_plausible(string: &str) -> bool {
        if string.is_empty() || string == "null" || string == "undefined" {
            return false;
        }
        Self::single_regex().is_match(string)
    }
}

impl TryFrom<String> for AuthToken {
    type Error = RefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AuthToken::from_string(value)
    }
}

impl From<&AuthToken> for String {
    fn from(value: &AuthToken) -> String {
        value.0.clone()
    }
}

// keep tokens out of logs
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(..)")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HashtagRef(String);

impl HashtagRef {
    fn multi_regex() -> &'static Regex {
        lazy_static! {
            static ref RE: Regex = Regex::new(&HASHTAG_RE_STRING).unwrap();
        }
        &*RE
    }

    /// Tag without the leading `#`.
    pub fn tag(&self) -> &str {
        self.0.trim_start_matches(|c| c == '#' || c == '＃')
    }

    /// Every distinct hashtag in `text`, in order of first appearance.
    pub fn extract_all(text: &str) -> Vec<HashtagRef> {
        let mut found: Vec<HashtagRef> = Vec::new();
        for caps in Self::multi_regex().captures_iter(text) {
            let tag = match caps.name("tag") {
                Some(tag) => tag.as_str().to_string(),
                None => caps[0]
                    .trim()
                    .trim_start_matches(|c| c == '#' || c == '＃')
                    .to_string(),
            };
            if tag.is_empty() {
                continue;
            }
            let hashtag = HashtagRef(format!("#{}", tag));
            if !found.contains(&hashtag) {
                found.push(hashtag);
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_post_id() {
        let post_id = ProductId(42).to_synthetic_post_id().unwrap();
        assert_eq!(post_id, PostId(42 + SYNTHETIC_POST_ID_OFFSET));
        assert!(post_id.is_synthetic());
        assert_eq!(post_id.to_product_id(), Some(ProductId(42)));
    }

    #[test]
    fn test_organic_post_id_is_not_synthetic() {
        // a millisecond timestamp, the largest organic ids the client mints
        let post_id = PostId(4_102_444_800_000);
        assert!(!post_id.is_synthetic());
        assert_eq!(post_id.to_product_id(), None);
    }

    #[test]
    fn test_synthetic_post_id_overflow() {
        assert_eq!(
            ProductId(u64::MAX).to_synthetic_post_id(),
            Err(RefError::SyntheticOverflow { id: u64::MAX })
        );
    }

    #[test]
    fn test_is_plausible_token() {
        assert!(AuthToken::is_plausible("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOjF9.abc-_"));
        assert!(!AuthToken::is_plausible(""));
        assert!(!AuthToken::is_plausible("null"));
        assert!(!AuthToken::is_plausible("undefined"));
        assert!(!AuthToken::is_plausible("two words"));
    }

    #[test]
    fn test_token_from_string() {
        assert!(AuthToken::from_string("abc123".to_string()).is_ok());
        assert!(matches!(
            AuthToken::from_string("null".to_string()),
            Err(RefError::BadFormat { .. })
        ));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AuthToken::from_string("secret".to_string()).unwrap();
        assert_eq!(format!("{:?}", token), "AuthToken(..)");
    }

    #[test]
    fn test_extract_hashtags() {
        let tags = HashtagRef::extract_all("Sunset in #Arusha with #friends and #Arusha again");
        let tags: Vec<&str> = tags.iter().map(|t| t.tag()).collect();
        assert_eq!(tags, vec!["Arusha", "friends"]);
    }

    #[test]
    fn test_extract_hashtags_none() {
        assert!(HashtagRef::extract_all("no tags here, just # and ＃").is_empty());
    }
}
