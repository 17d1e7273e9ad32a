use std::{collections::BTreeMap, fmt::Debug};
use unera_msg::{
    Brand, Conversation, Event, Group, Message, Notification, Podcast, Post, Product, Reel, Song,
    Story, User,
};
use unera_ref::{
    BrandId, ConversationId, EventId, GroupId, MessageId, NotificationId, PodcastId, PostId,
    ProductId, ReelId, SongId, StoryId, UserId,
};

pub trait Entity: Clone {
    type Id: Ord + Clone + Debug;

    fn id(&self) -> Self::Id;
}

macro_rules! entity {
    ($entity:ty, $id:ty) => {
        impl Entity for $entity {
            type Id = $id;

            fn id(&self) -> Self::Id {
                self.id.clone()
            }
        }
    };
}

entity!(User, UserId);
entity!(Post, PostId);
entity!(Story, StoryId);
entity!(Reel, ReelId);
entity!(Product, ProductId);
entity!(Group, GroupId);
entity!(Brand, BrandId);
entity!(Event, EventId);
entity!(Conversation, ConversationId);
entity!(Message, MessageId);
entity!(Notification, NotificationId);
entity!(Song, SongId);
entity!(Podcast, PodcastId);

/// Entities of one type keyed by id. Iteration is in id order, which keeps
/// every derived view deterministic.
#[derive(Clone, Debug)]
pub struct Store<E: Entity> {
    entries: BTreeMap<E::Id, E>,
}

impl<E: Entity> Default for Store<E> {
    fn default() -> Self {
        Store {
            entries: BTreeMap::new(),
        }
    }
}

impl<E: Entity> Store<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces, returning the previous entity.
    pub fn upsert(&mut self, entity: E) -> Option<E> {
        self.entries.insert(entity.id(), entity)
    }

    pub fn remove(&mut self, id: &E::Id) -> Option<E> {
        self.entries.remove(id)
    }

    pub fn get_all(&self) -> impl Iterator<Item = &E> {
        self.entries.values()
    }

    pub fn get_all_mut(&mut self) -> impl Iterator<Item = &mut E> {
        self.entries.values_mut()
    }

    pub fn get_by_id(&self, id: &E::Id) -> Option<&E> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &E::Id) -> Option<&mut E> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &E::Id) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops everything and takes `entities` as the new truth.
    pub fn replace_all(&mut self, entities: impl IntoIterator<Item = E>) {
        self.entries = entities
            .into_iter()
            .map(|entity| (entity.id(), entity))
            .collect();
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&E) -> bool) {
        self.entries.retain(|_, entity| keep(entity));
    }
}

impl<E: Entity> FromIterator<E> for Store<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut store = Store::new();
        store.replace_all(iter);
        store
    }
}
