use itertools::Itertools;
use log::trace;
use std::collections::{BTreeSet, HashMap};
use unera_msg::{
    Brand, Conversation, Event, Group, Message, Notification, Podcast, Post, Product, Reel, Song,
    Story, User,
};
use unera_ref::{ConversationId, GroupId, PostId, StoryId};

use crate::{Error, Store};

/// Stories leave the active set this long after they were created.
pub const STORY_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Every entity store of one session. Each `*_mut` accessor bumps the
/// revision, which is what derived views are cached against.
#[derive(Clone, Debug, Default)]
pub struct Stores {
    revision: u64,
    users: Store<User>,
    posts: Store<Post>,
    stories: Store<Story>,
    reels: Store<Reel>,
    products: Store<Product>,
    groups: Store<Group>,
    brands: Store<Brand>,
    events: Store<Event>,
    conversations: Store<Conversation>,
    messages: Store<Message>,
    notifications: Store<Notification>,
    songs: Store<Song>,
    podcasts: Store<Podcast>,
}

macro_rules! accessors {
    ($($name:ident, $name_mut:ident: $entity:ty;)*) => {
        $(
            pub fn $name(&self) -> &Store<$entity> {
                &self.$name
            }

            pub fn $name_mut(&mut self) -> &mut Store<$entity> {
                self.touch();
                &mut self.$name
            }
        )*
    };
}

impl Stores {
    pub fn new() -> Self {
        Self::default()
    }

    accessors! {
        users, users_mut: User;
        posts, posts_mut: Post;
        stories, stories_mut: Story;
        reels, reels_mut: Reel;
        products, products_mut: Product;
        groups, groups_mut: Group;
        brands, brands_mut: Brand;
        events, events_mut: Event;
        conversations, conversations_mut: Conversation;
        messages, messages_mut: Message;
        notifications, notifications_mut: Notification;
        songs, songs_mut: Song;
        podcasts, podcasts_mut: Podcast;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// The post store's default view: newest first, ties by id.
    pub fn posts_recent_first(&self) -> Vec<&Post> {
        self.posts
            .get_all()
            .sorted_by(|a, b| {
                b.created_at_or_zero()
                    .cmp(&a.created_at_or_zero())
                    .then(b.id.cmp(&a.id))
            })
            .collect()
    }

    pub fn post_mut(&mut self, post_id: PostId) -> Result<&mut Post, Error> {
        self.posts_mut()
            .get_mut(&post_id)
            .ok_or(Error::UnknownPost(post_id))
    }

    pub fn group_mut(&mut self, group_id: &GroupId) -> Result<&mut Group, Error> {
        self.groups_mut()
            .get_mut(group_id)
            .ok_or_else(|| Error::UnknownGroup(group_id.clone()))
    }

    /// Removes a group together with every feed post attributed to it.
    pub fn remove_group(&mut self, group_id: &GroupId) -> Result<Group, Error> {
        let group = self
            .groups_mut()
            .remove(group_id)
            .ok_or_else(|| Error::UnknownGroup(group_id.clone()))?;
        self.posts_mut()
            .retain(|post| post.group_id.as_ref() != Some(group_id));
        trace!("removed group {} and its feed projections", group_id);
        Ok(group)
    }

    pub fn conversations_by_recency(&self) -> Vec<&Conversation> {
        self.conversations
            .get_all()
            .sorted_by(|a, b| {
                b.last_message_timestamp
                    .cmp(&a.last_message_timestamp)
                    .then(a.id.cmp(&b.id))
            })
            .collect()
    }

    pub fn messages_in(&self, conversation_id: ConversationId) -> Vec<&Message> {
        self.messages
            .get_all()
            .filter(|message| message.conversation_id == conversation_id)
            .sorted_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)))
            .collect()
    }

    /// Stores `message` and moves its conversation's last message fields
    /// forward in the same step, so no reader sees one without the other.
    pub fn append_message(&mut self, message: Message) -> Result<(), Error> {
        let conversation = self
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or(Error::UnknownConversation(message.conversation_id))?;

        if message.timestamp >= conversation.last_message_timestamp {
            conversation.last_message = message.preview();
            conversation.last_message_timestamp = message.timestamp;
        }
        self.messages.upsert(message);
        self.touch();

        Ok(())
    }

    /// Takes the server's conversation list as truth, except where a local
    /// message is newer than what the server reported.
    pub fn reconcile_conversations(&mut self, conversations: Vec<Conversation>) {
        let latest: HashMap<ConversationId, &Message> =
            self.messages
                .get_all()
                .fold(HashMap::new(), |mut latest, message| {
                    let newer = latest
                        .get(&message.conversation_id)
                        .map_or(true, |current: &&Message| {
                            message.timestamp >= current.timestamp
                        });
                    if newer {
                        latest.insert(message.conversation_id, message);
                    }
                    latest
                });

        let merged: Vec<Conversation> = conversations
            .into_iter()
            .map(|mut conversation| {
                if let Some(message) = latest.get(&conversation.id) {
                    if message.timestamp > conversation.last_message_timestamp {
                        conversation.last_message = message.preview();
                        conversation.last_message_timestamp = message.timestamp;
                    }
                }
                conversation
            })
            .collect();

        let known: BTreeSet<ConversationId> = merged.iter().map(|c| c.id).collect();
        self.conversations_mut().replace_all(merged);
        self.messages_mut()
            .retain(|message| known.contains(&message.conversation_id));
    }

    pub fn active_stories(&self, now: i64) -> Vec<&Story> {
        self.stories
            .get_all()
            .filter(|story| now - story.created_at < STORY_TTL_MS)
            .sorted_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)))
            .collect()
    }

    /// Drops stories whose 24 hours are up, returning their ids.
    pub fn sweep_expired_stories(&mut self, now: i64) -> Vec<StoryId> {
        let expired: Vec<StoryId> = self
            .stories
            .get_all()
            .filter(|story| now - story.created_at >= STORY_TTL_MS)
            .map(|story| story.id)
            .collect();

        if !expired.is_empty() {
            let stories = self.stories_mut();
            for id in expired.iter() {
                stories.remove(id);
            }
            trace!("swept {} expired stories", expired.len());
        }

        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unera_msg::StoryKind;
    use unera_ref::{MessageId, UserId};

    const NOW: i64 = 1_700_000_000_000;

    fn story(id: u64, created_at: i64) -> Story {
        Story {
            id: StoryId(id),
            user_id: UserId(1),
            created_at,
            kind: StoryKind::Text,
            image: None,
            text: Some("hello".to_string()),
            background: None,
        }
    }

    fn conversation(id: u64, last_message_timestamp: i64) -> Conversation {
        Conversation {
            id: ConversationId(id),
            participant_ids: vec![UserId(1), UserId(2)],
            last_message: "old".to_string(),
            last_message_timestamp,
            unread_count: 0,
        }
    }

    fn message(id: u64, conversation_id: u64, text: &str, timestamp: i64) -> Message {
        Message {
            id: MessageId(id),
            conversation_id: ConversationId(conversation_id),
            sender_id: UserId(1),
            text: text.to_string(),
            timestamp,
            sticker_url: None,
        }
    }

    #[test]
    fn test_sweep_expired_stories() {
        let mut stores = Stores::new();
        stores.stories_mut().upsert(story(1, NOW - STORY_TTL_MS - 1));
        stores
            .stories_mut()
            .upsert(story(2, NOW - (23 * 60 + 59) * 60 * 1000));

        let swept = stores.sweep_expired_stories(NOW);

        assert_eq!(swept, vec![StoryId(1)]);
        assert!(!stores.stories().contains(&StoryId(1)));
        assert!(stores.stories().contains(&StoryId(2)));
    }

    #[test]
    fn test_sweep_without_expiry_keeps_revision() {
        let mut stores = Stores::new();
        stores.stories_mut().upsert(story(1, NOW));
        let revision = stores.revision();
        assert!(stores.sweep_expired_stories(NOW).is_empty());
        assert_eq!(stores.revision(), revision);
    }

    #[test]
    fn test_append_message_updates_conversation() {
        let mut stores = Stores::new();
        stores.conversations_mut().upsert(conversation(1, NOW - 10));
        let revision = stores.revision();

        stores.append_message(message(5, 1, "hi", NOW)).unwrap();

        let convo = stores.conversations().get_by_id(&ConversationId(1)).unwrap();
        assert_eq!(convo.last_message, "hi");
        assert_eq!(convo.last_message_timestamp, NOW);
        assert!(stores.revision() > revision);
    }

    #[test]
    fn test_append_message_to_unknown_conversation() {
        let mut stores = Stores::new();
        assert!(matches!(
            stores.append_message(message(5, 9, "hi", NOW)),
            Err(Error::UnknownConversation(ConversationId(9)))
        ));
        assert!(stores.messages().is_empty());
    }

    #[test]
    fn test_reconcile_keeps_newer_local_message() {
        let mut stores = Stores::new();
        stores.conversations_mut().upsert(conversation(1, NOW - 10));
        stores.append_message(message(5, 1, "local", NOW)).unwrap();

        stores.reconcile_conversations(vec![conversation(1, NOW - 100), conversation(2, NOW - 5)]);

        let convo = stores.conversations().get_by_id(&ConversationId(1)).unwrap();
        assert_eq!(convo.last_message, "local");
        assert_eq!(convo.last_message_timestamp, NOW);
        let order: Vec<ConversationId> = stores
            .conversations_by_recency()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(order, vec![ConversationId(1), ConversationId(2)]);
    }

    #[test]
    fn test_messages_in_timestamp_order() {
        let mut stores = Stores::new();
        stores.conversations_mut().upsert(conversation(1, 0));
        stores.append_message(message(2, 1, "second", 20)).unwrap();
        stores.append_message(message(1, 1, "first", 10)).unwrap();
        let texts: Vec<&str> = stores
            .messages_in(ConversationId(1))
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
        // an older message never rewinds the conversation
        let convo = stores.conversations().get_by_id(&ConversationId(1)).unwrap();
        assert_eq!(convo.last_message, "second");
    }

    #[test]
    fn test_remove_group_drops_feed_projections() {
        let mut stores = Stores::new();
        let group_id = GroupId::from("g1");
        stores.groups_mut().upsert(Group {
            id: group_id.clone(),
            name: "Hikers".to_string(),
            description: String::new(),
            kind: Default::default(),
            image: String::new(),
            cover_image: String::new(),
            admin_id: UserId(1),
            members: BTreeSet::new(),
            posts: Vec::new(),
            created_date: 0,
            events: Vec::new(),
            member_posting_allowed: None,
        });
        let mut attributed = Post::new(PostId(1), UserId(1));
        attributed.group_id = Some(group_id.clone());
        stores.posts_mut().upsert(attributed);
        stores.posts_mut().upsert(Post::new(PostId(2), UserId(1)));

        stores.remove_group(&group_id).unwrap();

        assert!(stores.groups().is_empty());
        assert_eq!(stores.posts().len(), 1);
        assert!(stores.posts().contains(&PostId(2)));
    }

    #[test]
    fn test_posts_recent_first() {
        let mut stores = Stores::new();
        for (id, created_at) in [(1, 100), (2, 300), (3, 200), (4, 300)] {
            let mut post = Post::new(PostId(id), UserId(1));
            post.created_at = Some(created_at);
            stores.posts_mut().upsert(post);
        }
        let ids: Vec<u64> = stores.posts_recent_first().iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![4, 2, 3, 1]);
    }
}
