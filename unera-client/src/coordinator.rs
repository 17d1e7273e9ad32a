use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use unera_api::{Backend, ProductQuery};
use unera_db::{Error as StoreError, Store, Stores};
use unera_feed::detect_country;
use unera_msg::{
    reaction_of, toggle_reaction, Attachment, Attendance, Comment, Event, Group, GroupKind,
    GroupPost, GroupSettings, Message, NewMessage, NewPost, Post, PostKind, Product, ProductStatus,
    ReactRequest, Reaction, ReactionChange, ReactionType, Story, StoryKind, User, Visibility,
};
use unera_ref::{
    BrandId, CommentId, ConversationId, EventId, GroupId, HashtagRef, MessageId, PostId, ProductId,
    ReelId, StoryId, UserId,
};

use crate::{now_ms, session::Authenticated, shared::Shared, Error};

const JUST_NOW: &str = "Just now";

/// Client-minted ids: the current time in milliseconds, bumped past the
/// last id handed out so two ids never collide within a session.
#[derive(Debug, Default)]
struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    fn next(&self) -> u64 {
        let now = u64::try_from(now_ms()).unwrap_or(0);
        let previous = self
            .last
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }
}

/// Entities whose mutations go to the server and may need rolling back.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum EntityKey {
    Post(PostId),
    Conversation(ConversationId),
}

#[derive(Clone, Debug, Default)]
pub struct PostDraft {
    pub content: String,
    pub kind: PostKind,
    pub image: Option<String>,
    pub video: Option<String>,
    pub visibility: Visibility,
    pub location: Option<String>,
    pub feeling: Option<String>,
    pub background: Option<String>,
}

impl PostDraft {
    pub fn text(content: impl Into<String>) -> Self {
        PostDraft {
            content: content.into(),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.image.is_none() && self.video.is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct CommentDraft {
    pub text: String,
    pub attachment: Option<Attachment>,
    pub sticker_url: Option<String>,
    pub parent_id: Option<CommentId>,
}

impl CommentDraft {
    pub fn text(text: impl Into<String>) -> Self {
        CommentDraft {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn reply_to(mut self, parent_id: CommentId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShareTarget {
    Profile,
    Group(GroupId),
    Brand(BrandId),
}

#[derive(Clone, Debug, Default)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub kind: GroupKind,
}

#[derive(Clone, Debug, Default)]
pub struct StoryDraft {
    pub kind: StoryKind,
    pub text: Option<String>,
    pub image: Option<String>,
    pub background: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub work: Option<String>,
}

/// Most images a single listing may carry.
pub const MAX_PRODUCT_IMAGES: usize = 10;

#[derive(Clone, Debug, Default)]
pub struct ProductDraft {
    pub title: String,
    pub category: String,
    pub description: String,
    pub address: String,
    pub main_price: f64,
    pub discount_price: Option<f64>,
    pub quantity: u32,
    pub images: Vec<String>,
}

impl ProductDraft {
    fn validate(&self) -> Result<(), Error> {
        let blank = [&self.title, &self.category, &self.description, &self.address]
            .iter()
            .any(|field| field.trim().is_empty());
        if blank {
            return Err(Error::Invalid("listing is missing required details"));
        }
        if self.main_price.is_nan() || self.main_price <= 0.0 {
            return Err(Error::Invalid("price must be positive"));
        }
        if self.images.is_empty() {
            return Err(Error::Invalid("listing needs at least one image"));
        }
        if self.images.len() > MAX_PRODUCT_IMAGES {
            return Err(Error::Invalid("listing has too many images"));
        }
        Ok(())
    }
}

fn unknown_post(post_id: PostId) -> Error {
    Error::Store(StoreError::UnknownPost(post_id))
}

fn find_group_post(stores: &mut Stores, post_id: PostId) -> Option<&mut GroupPost> {
    stores
        .groups_mut()
        .get_all_mut()
        .find_map(|group| group.find_post_mut(post_id))
}

// Posts of the feed store first, then posts living inside a group.
fn reactions_mut(stores: &mut Stores, post_id: PostId) -> Result<&mut Vec<Reaction>, Error> {
    if stores.posts().contains(&post_id) {
        return Ok(&mut stores.post_mut(post_id)?.reactions);
    }
    find_group_post(stores, post_id)
        .map(|post| &mut post.reactions)
        .ok_or_else(|| unknown_post(post_id))
}

fn comments_mut(stores: &mut Stores, post_id: PostId) -> Result<&mut Vec<Comment>, Error> {
    if stores.posts().contains(&post_id) {
        return Ok(&mut stores.post_mut(post_id)?.comments);
    }
    find_group_post(stores, post_id)
        .map(|post| &mut post.comments)
        .ok_or_else(|| unknown_post(post_id))
}

fn group_mut<'a>(stores: &'a mut Stores, group_id: &GroupId) -> Result<&'a mut Group, Error> {
    Ok(stores.group_mut(group_id)?)
}

/// Applies user actions to the stores optimistically. Actions with an
/// endpoint are then confirmed with the server; a failure rolls the change
/// back unless a newer change to the same entity has landed since.
pub struct Coordinator<B: Backend> {
    shared: Arc<Shared<B>>,
    ids: IdGenerator,
    sequences: Mutex<HashMap<EntityKey, u64>>,
}

impl<B: Backend> Coordinator<B> {
    pub(crate) fn new(shared: Arc<Shared<B>>) -> Self {
        Coordinator {
            shared,
            ids: IdGenerator::default(),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    async fn begin(&self, key: EntityKey) -> u64 {
        let mut sequences = self.sequences.lock().await;
        let sequence = sequences.entry(key).or_insert(0);
        *sequence += 1;
        *sequence
    }

    /// Whether a server reply for mutation `sequence` may still touch the
    /// stores: same session, and no newer mutation of the entity.
    async fn still_latest(&self, auth: &Authenticated, key: &EntityKey, sequence: u64) -> bool {
        let latest = self.sequences.lock().await.get(key).copied().unwrap_or(0);
        latest == sequence && self.shared.session.is_current(auth.epoch).await
    }

    /// Toggles the user's reaction on a post. Feed posts are confirmed with
    /// the server; group posts shown in the feed are updated in their group.
    pub async fn react(
        &self,
        post_id: PostId,
        kind: ReactionType,
    ) -> Result<ReactionChange, Error> {
        let auth = self.shared.guard().await?;
        let user_id = auth.user_id;

        let (change, pre_image, in_feed) = self
            .shared
            .write(|stores| {
                let in_feed = stores.posts().contains(&post_id);
                let reactions = reactions_mut(stores, post_id)?;
                let pre_image = reactions.clone();
                Ok((
                    toggle_reaction(reactions, user_id, kind),
                    pre_image,
                    in_feed,
                ))
            })
            .await?;
        if !in_feed {
            return Ok(change);
        }

        let key = EntityKey::Post(post_id);
        let sequence = self.begin(key.clone()).await;
        debug!("reacting {:?} to post {}", kind, post_id);

        let request = ReactRequest { kind };
        match self
            .shared
            .backend
            .react_to_post(auth.token.as_str(), post_id, &request)
            .await
        {
            Ok(Some(post)) if post.id == post_id => {
                if self.still_latest(&auth, &key, sequence).await {
                    self.shared
                        .write(|stores| {
                            stores.posts_mut().upsert(post);
                            Ok(())
                        })
                        .await?;
                }
                Ok(change)
            }
            Ok(_) => Ok(change),
            Err(err) => {
                if self.still_latest(&auth, &key, sequence).await {
                    self.shared
                        .write(|stores| {
                            if let Some(post) = stores.posts_mut().get_mut(&post_id) {
                                post.reactions = pre_image;
                            }
                            Ok(())
                        })
                        .await?;
                }
                Err(self.shared.fail(auth.epoch, err).await)
            }
        }
    }

    /// Appends a comment, as a reply when `parent_id` is set.
    pub async fn comment(&self, post_id: PostId, draft: CommentDraft) -> Result<Comment, Error> {
        let auth = self.shared.guard().await?;
        if draft.text.trim().is_empty() && draft.attachment.is_none() && draft.sticker_url.is_none()
        {
            return Err(Error::Invalid("comment is empty"));
        }

        let comment = Comment {
            id: CommentId(self.ids.next()),
            user_id: auth.user_id,
            text: draft.text,
            timestamp: JUST_NOW.to_string(),
            likes: 0,
            attachment: draft.attachment,
            sticker_url: draft.sticker_url,
            parent_id: draft.parent_id,
        };

        self.shared
            .write(|stores| {
                let comments = comments_mut(stores, post_id)?;
                if let Some(parent_id) = comment.parent_id {
                    if !comments.iter().any(|existing| existing.id == parent_id) {
                        return Err(StoreError::UnknownComment(parent_id).into());
                    }
                }
                comments.push(comment.clone());
                Ok(())
            })
            .await?;

        Ok(comment)
    }

    pub async fn like_comment(&self, post_id: PostId, comment_id: CommentId) -> Result<u32, Error> {
        self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let comment = comments_mut(stores, post_id)?
                    .iter_mut()
                    .find(|comment| comment.id == comment_id)
                    .ok_or(StoreError::UnknownComment(comment_id))?;
                comment.likes += 1;
                Ok(comment.likes)
            })
            .await
    }

    /// Publishes a post. It shows at the top of the feed straight away and
    /// is swapped for the server's copy once confirmed.
    pub async fn create_post(&self, draft: PostDraft) -> Result<Post, Error> {
        let auth = self.shared.guard().await?;
        if draft.is_empty() {
            return Err(Error::Invalid("post is empty"));
        }

        let mut post = Post::new(PostId(self.ids.next()), auth.user_id);
        post.tags = HashtagRef::extract_all(&draft.content)
            .iter()
            .map(|hashtag| hashtag.tag().to_string())
            .collect();
        post.content = Some(draft.content.clone()).filter(|content| !content.trim().is_empty());
        post.image = draft.image;
        post.video = draft.video;
        post.timestamp = JUST_NOW.to_string();
        post.created_at = Some(now_ms());
        post.kind = draft.kind;
        post.visibility = draft.visibility;
        post.location = draft.location;
        post.feeling = draft.feeling;
        post.background = draft.background;

        let local_id = post.id;
        self.shared
            .write(|stores| {
                stores.posts_mut().upsert(post.clone());
                Ok(())
            })
            .await?;

        let key = EntityKey::Post(local_id);
        let sequence = self.begin(key.clone()).await;
        let request = NewPost {
            content: draft.content,
            kind: draft.kind,
        };

        match self
            .shared
            .backend
            .create_post(auth.token.as_str(), &request)
            .await
        {
            Ok(Some(stored)) if !stored.id.is_synthetic() => {
                if self.shared.session.is_current(auth.epoch).await {
                    let confirmed = stored.clone();
                    self.shared
                        .write(|stores| {
                            stores.posts_mut().remove(&local_id);
                            stores.posts_mut().upsert(confirmed);
                            Ok(())
                        })
                        .await?;
                }
                Ok(stored)
            }
            Ok(Some(stored)) => {
                warn!("Ignoring created post echoed with promotion id {}", stored.id);
                Ok(post)
            }
            Ok(None) => Ok(post),
            Err(err) => {
                if self.still_latest(&auth, &key, sequence).await {
                    self.shared
                        .write(|stores| {
                            stores.posts_mut().remove(&local_id);
                            Ok(())
                        })
                        .await?;
                }
                Err(self.shared.fail(auth.epoch, err).await)
            }
        }
    }

    /// Reposts `post_id` as the current user with a back-reference to the
    /// original. The share count is left to the server.
    pub async fn share(
        &self,
        post_id: PostId,
        target: ShareTarget,
        caption: Option<String>,
    ) -> Result<Post, Error> {
        let auth = self.shared.guard().await?;
        let id = PostId(self.ids.next());

        self.shared
            .write(|stores| {
                let source = resolve_post(stores, post_id)?;
                let mut post = Post::new(id, auth.user_id);
                post.content = caption
                    .filter(|caption| !caption.trim().is_empty())
                    .or_else(|| source.content.clone());
                post.image = source.image.clone();
                post.video = source.video.clone();
                post.background = source.background.clone();
                post.kind = source.kind;
                post.event = source.event.clone();
                post.product = source.product.clone();
                post.shared_post_id = Some(source.shared_post_id.unwrap_or(source.id));
                post.timestamp = JUST_NOW.to_string();
                post.created_at = Some(now_ms());

                match &target {
                    ShareTarget::Profile => {}
                    ShareTarget::Group(group_id) => {
                        let group = stores
                            .groups()
                            .get_by_id(group_id)
                            .ok_or_else(|| StoreError::UnknownGroup(group_id.clone()))?;
                        if !group.can_post(auth.user_id) {
                            return Err(Error::Forbidden("posting in this group is not allowed"));
                        }
                        post.group_id = Some(group.id.clone());
                        post.group_name = Some(group.name.clone());
                    }
                    ShareTarget::Brand(brand_id) => {
                        let brand = stores
                            .brands()
                            .get_by_id(brand_id)
                            .ok_or(StoreError::UnknownBrand(*brand_id))?;
                        post.brand_id = Some(brand.id);
                        post.brand_name = Some(brand.name.clone());
                    }
                }

                stores.posts_mut().upsert(post.clone());
                Ok(post)
            })
            .await
    }

    /// Deletes one of the current user's own posts. Shares of it keep their
    /// back-reference and render without the original.
    pub async fn delete_post(&self, post_id: PostId) -> Result<Post, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let post = stores
                    .posts()
                    .get_by_id(&post_id)
                    .ok_or_else(|| unknown_post(post_id))?;
                if post.author_id != auth.user_id {
                    return Err(Error::Forbidden("only the author can delete a post"));
                }
                stores
                    .posts_mut()
                    .remove(&post_id)
                    .ok_or_else(|| unknown_post(post_id))
            })
            .await
    }

    /// Sends a message. The message and its conversation's last message
    /// fields change in one store write.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
        sticker_url: Option<String>,
    ) -> Result<Message, Error> {
        let auth = self.shared.guard().await?;
        if text.trim().is_empty() && sticker_url.is_none() {
            return Err(Error::Invalid("message is empty"));
        }

        let message = Message {
            id: MessageId(self.ids.next()),
            conversation_id,
            sender_id: auth.user_id,
            text: text.to_string(),
            timestamp: now_ms(),
            sticker_url: sticker_url.clone(),
        };
        let pre_image = self
            .shared
            .write(|stores| {
                let pre_image = stores
                    .conversations()
                    .get_by_id(&conversation_id)
                    .cloned()
                    .ok_or(StoreError::UnknownConversation(conversation_id))?;
                stores.append_message(message.clone())?;
                Ok(pre_image)
            })
            .await?;

        let key = EntityKey::Conversation(conversation_id);
        let sequence = self.begin(key.clone()).await;
        let request = NewMessage {
            conversation_id,
            text: text.to_string(),
            sticker_url,
        };

        match self
            .shared
            .backend
            .send_message(auth.token.as_str(), &request)
            .await
        {
            Ok(Some(stored)) if stored.conversation_id == conversation_id => {
                if self.shared.session.is_current(auth.epoch).await {
                    let confirmed = stored.clone();
                    self.shared
                        .write(|stores| {
                            stores.messages_mut().remove(&message.id);
                            stores.append_message(confirmed)?;
                            Ok(())
                        })
                        .await?;
                }
                Ok(stored)
            }
            Ok(_) => Ok(message),
            Err(err) => {
                if self.still_latest(&auth, &key, sequence).await {
                    self.shared
                        .write(|stores| {
                            stores.messages_mut().remove(&message.id);
                            if let Some(conversation) =
                                stores.conversations_mut().get_mut(&conversation_id)
                            {
                                if conversation.last_message_timestamp == message.timestamp {
                                    conversation.last_message = pre_image.last_message;
                                    conversation.last_message_timestamp =
                                        pre_image.last_message_timestamp;
                                }
                            }
                            Ok(())
                        })
                        .await?;
                }
                Err(self.shared.fail(auth.epoch, err).await)
            }
        }
    }

    pub async fn create_group(&self, new_group: NewGroup) -> Result<Group, Error> {
        let auth = self.shared.guard().await?;
        if new_group.name.trim().is_empty() {
            return Err(Error::Invalid("group name is empty"));
        }

        let group = Group {
            id: GroupId(format!("g{}", self.ids.next())),
            name: new_group.name.trim().to_string(),
            description: new_group.description,
            kind: new_group.kind,
            image: String::new(),
            cover_image: String::new(),
            admin_id: auth.user_id,
            members: [auth.user_id].into_iter().collect(),
            posts: Vec::new(),
            created_date: now_ms(),
            events: Vec::new(),
            member_posting_allowed: Some(true),
        };
        self.shared
            .write(|stores| {
                stores.groups_mut().upsert(group.clone());
                Ok(())
            })
            .await?;

        Ok(group)
    }

    /// Returns false if the user was already a member.
    pub async fn join_group(&self, group_id: &GroupId) -> Result<bool, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let group = group_mut(stores, group_id)?;
                if group.is_member(auth.user_id) {
                    return Ok(false);
                }
                group.members.insert(auth.user_id);
                Ok(true)
            })
            .await
    }

    pub async fn leave_group(&self, group_id: &GroupId) -> Result<bool, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let group = group_mut(stores, group_id)?;
                if group.is_admin(auth.user_id) {
                    return Err(Error::Forbidden("the admin cannot leave their own group"));
                }
                Ok(group.members.remove(&auth.user_id))
            })
            .await
    }

    /// Deletes a group along with its posts in the feed. Group admin or
    /// site admin only.
    pub async fn delete_group(&self, group_id: &GroupId) -> Result<Group, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let group = stores
                    .groups()
                    .get_by_id(group_id)
                    .ok_or_else(|| StoreError::UnknownGroup(group_id.clone()))?;
                let site_admin = stores
                    .users()
                    .get_by_id(&auth.user_id)
                    .map_or(false, |user| user.is_admin());
                if !group.is_admin(auth.user_id) && !site_admin {
                    return Err(Error::Forbidden("only the group admin can delete a group"));
                }
                Ok(stores.remove_group(group_id)?)
            })
            .await
    }

    /// Posts inside a group. The global feed shows it through the group, so
    /// there is a single copy to react to and comment on.
    pub async fn post_to_group(
        &self,
        group_id: &GroupId,
        draft: PostDraft,
    ) -> Result<GroupPost, Error> {
        let auth = self.shared.guard().await?;
        if draft.is_empty() {
            return Err(Error::Invalid("post is empty"));
        }

        let group_post = GroupPost {
            id: PostId(self.ids.next()),
            author_id: auth.user_id,
            content: draft.content,
            image: draft.image,
            video: draft.video,
            background: draft.background,
            reactions: Vec::new(),
            comments: Vec::new(),
            shares: 0,
            timestamp: now_ms(),
        };
        self.shared
            .write(|stores| {
                let group = group_mut(stores, group_id)?;
                if !group.can_post(auth.user_id) {
                    return Err(Error::Forbidden("posting in this group is not allowed"));
                }
                group.posts.insert(0, group_post.clone());
                Ok(())
            })
            .await?;

        Ok(group_post)
    }

    pub async fn react_group_post(
        &self,
        group_id: &GroupId,
        post_id: PostId,
        kind: ReactionType,
    ) -> Result<ReactionChange, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let post = group_mut(stores, group_id)?
                    .find_post_mut(post_id)
                    .ok_or_else(|| unknown_post(post_id))?;
                Ok(toggle_reaction(&mut post.reactions, auth.user_id, kind))
            })
            .await
    }

    pub async fn delete_group_post(
        &self,
        group_id: &GroupId,
        post_id: PostId,
    ) -> Result<GroupPost, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let group = group_mut(stores, group_id)?;
                let index = group
                    .posts
                    .iter()
                    .position(|post| post.id == post_id)
                    .ok_or_else(|| unknown_post(post_id))?;
                let author = group.posts[index].author_id;
                if author != auth.user_id && !group.is_admin(auth.user_id) {
                    return Err(Error::Forbidden(
                        "only the author or the group admin can delete a group post",
                    ));
                }
                Ok(group.posts.remove(index))
            })
            .await
    }

    pub async fn remove_member(
        &self,
        group_id: &GroupId,
        member_id: UserId,
    ) -> Result<bool, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let group = group_mut(stores, group_id)?;
                if !group.is_admin(auth.user_id) {
                    return Err(Error::Forbidden("only the group admin can remove members"));
                }
                if group.is_admin(member_id) {
                    return Err(Error::Forbidden("the admin cannot be removed"));
                }
                Ok(group.members.remove(&member_id))
            })
            .await
    }

    pub async fn update_group_settings(
        &self,
        group_id: &GroupId,
        settings: GroupSettings,
    ) -> Result<Group, Error> {
        let auth = self.shared.guard().await?;
        if let Some(name) = &settings.name {
            if name.trim().is_empty() {
                return Err(Error::Invalid("group name is empty"));
            }
        }

        self.shared
            .write(|stores| {
                let group = group_mut(stores, group_id)?;
                if !group.is_admin(auth.user_id) {
                    return Err(Error::Forbidden("only the group admin can change settings"));
                }
                if let Some(name) = settings.name {
                    group.name = name.trim().to_string();
                }
                if let Some(description) = settings.description {
                    group.description = description;
                }
                if let Some(allowed) = settings.member_posting_allowed {
                    group.member_posting_allowed = Some(allowed);
                }
                let group = group.clone();

                // feed copies attributed to the group carry its name
                for post in stores.posts_mut().get_all_mut() {
                    if post.group_id.as_ref() == Some(&group.id) {
                        post.group_name = Some(group.name.clone());
                    }
                }
                Ok(group)
            })
            .await
    }

    /// Toggles following a brand. Returns whether the user now follows it.
    pub async fn follow_brand(&self, brand_id: BrandId) -> Result<bool, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let brand = stores
                    .brands_mut()
                    .get_mut(&brand_id)
                    .ok_or(StoreError::UnknownBrand(brand_id))?;
                if brand.followers.remove(&auth.user_id) {
                    Ok(false)
                } else {
                    brand.followers.insert(auth.user_id);
                    Ok(true)
                }
            })
            .await
    }

    /// Toggles following another user, updating both sides together.
    pub async fn follow_user(&self, user_id: UserId) -> Result<bool, Error> {
        let auth = self.shared.guard().await?;
        if user_id == auth.user_id {
            return Err(Error::Invalid("cannot follow yourself"));
        }

        self.shared
            .write(|stores| {
                if !stores.users().contains(&user_id) {
                    return Err(StoreError::UnknownUser(user_id).into());
                }
                let me = stores
                    .users_mut()
                    .get_mut(&auth.user_id)
                    .ok_or(StoreError::UnknownUser(auth.user_id))?;
                let following = if me.following.remove(&user_id) {
                    false
                } else {
                    me.following.insert(user_id);
                    true
                };

                if let Some(target) = stores.users_mut().get_mut(&user_id) {
                    if following {
                        target.followers.insert(auth.user_id);
                    } else {
                        target.followers.remove(&auth.user_id);
                    }
                }
                Ok(following)
            })
            .await
    }

    /// Steps the user through not attending, interested, attending. Joining
    /// an event already attended leaves it.
    pub async fn join_event(&self, event_id: EventId) -> Result<Attendance, Error> {
        self.set_attendance(event_id, |current| match current {
            Attendance::NotAttending => Attendance::Interested,
            Attendance::Interested => Attendance::Attending,
            Attendance::Attending => Attendance::NotAttending,
        })
        .await
    }

    /// Interested toggle: marking from any other state is interested
    /// (clearing attendance), marking again clears it.
    pub async fn mark_interested(&self, event_id: EventId) -> Result<Attendance, Error> {
        self.set_attendance(event_id, |current| match current {
            Attendance::Interested => Attendance::NotAttending,
            _ => Attendance::Interested,
        })
        .await
    }

    async fn set_attendance(
        &self,
        event_id: EventId,
        transition: fn(Attendance) -> Attendance,
    ) -> Result<Attendance, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let current = current_attendance(stores, event_id, auth.user_id)
                    .ok_or(StoreError::UnknownEvent(event_id))?;
                let next = transition(current);

                // the event store and any copy embedded in a group move together
                if let Some(event) = stores.events_mut().get_mut(&event_id) {
                    event.set_attendance(auth.user_id, next);
                }
                for group in stores.groups_mut().get_all_mut() {
                    for event in group.events.iter_mut().filter(|event| event.id == event_id) {
                        event.set_attendance(auth.user_id, next);
                    }
                }
                Ok(next)
            })
            .await
    }

    pub async fn react_reel(
        &self,
        reel_id: ReelId,
        kind: ReactionType,
    ) -> Result<ReactionChange, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let reel = stores
                    .reels_mut()
                    .get_mut(&reel_id)
                    .ok_or(StoreError::UnknownReel(reel_id))?;
                Ok(toggle_reaction(&mut reel.reactions, auth.user_id, kind))
            })
            .await
    }

    pub async fn comment_reel(&self, reel_id: ReelId, text: &str) -> Result<Comment, Error> {
        let auth = self.shared.guard().await?;
        if text.trim().is_empty() {
            return Err(Error::Invalid("comment is empty"));
        }

        let comment = Comment {
            id: CommentId(self.ids.next()),
            user_id: auth.user_id,
            text: text.trim().to_string(),
            timestamp: JUST_NOW.to_string(),
            likes: 0,
            attachment: None,
            sticker_url: None,
            parent_id: None,
        };
        self.shared
            .write(|stores| {
                stores
                    .reels_mut()
                    .get_mut(&reel_id)
                    .ok_or(StoreError::UnknownReel(reel_id))?
                    .comments
                    .push(comment.clone());
                Ok(())
            })
            .await?;

        Ok(comment)
    }

    /// Edits the current user's profile details. Fields left `None` keep
    /// their value; an empty string clears an optional field.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, Error> {
        let auth = self.shared.guard().await?;
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(Error::Invalid("name is empty"));
            }
        }

        self.shared
            .write(|stores| {
                let user = stores
                    .users_mut()
                    .get_mut(&auth.user_id)
                    .ok_or(StoreError::UnknownUser(auth.user_id))?;
                if let Some(name) = update.name {
                    user.name = name.trim().to_string();
                }
                let optional =
                    |value: String| Some(value.trim().to_string()).filter(|v| !v.is_empty());
                if let Some(bio) = update.bio {
                    user.bio = optional(bio);
                }
                if let Some(location) = update.location {
                    user.location = optional(location);
                }
                if let Some(work) = update.work {
                    user.work = optional(work);
                }
                Ok(user.clone())
            })
            .await
    }

    /// Lists a product for sale. The country comes from the address.
    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product, Error> {
        let auth = self.shared.guard().await?;
        draft.validate()?;

        self.shared
            .write(|stores| {
                let seller = stores
                    .users()
                    .get_by_id(&auth.user_id)
                    .ok_or(StoreError::UnknownUser(auth.user_id))?;
                let product = Product {
                    id: ProductId(self.ids.next()),
                    title: draft.title.trim().to_string(),
                    category: draft.category,
                    description: draft.description,
                    country: detect_country(&draft.address).to_string(),
                    address: draft.address,
                    main_price: draft.main_price,
                    discount_price: draft.discount_price,
                    quantity: draft.quantity,
                    images: draft.images,
                    seller_id: seller.id,
                    seller_name: seller.name.clone(),
                    seller_avatar: seller.profile_image.clone(),
                    date: now_ms(),
                    status: ProductStatus::Active,
                };
                stores.products_mut().upsert(product.clone());
                Ok(product)
            })
            .await
    }

    /// Marks the current user's notifications read, returning how many
    /// changed.
    pub async fn mark_notifications_read(&self) -> Result<usize, Error> {
        let auth = self.shared.guard().await?;
        self.shared
            .write(|stores| {
                let mut changed = 0;
                for notification in stores.notifications_mut().get_all_mut() {
                    if notification.user_id == auth.user_id && !notification.read {
                        notification.read = true;
                        changed += 1;
                    }
                }
                Ok(changed)
            })
            .await
    }

    pub async fn create_story(&self, draft: StoryDraft) -> Result<Story, Error> {
        let auth = self.shared.guard().await?;
        let has_text = draft.text.as_ref().map_or(false, |text| !text.trim().is_empty());
        match draft.kind {
            StoryKind::Text if !has_text => return Err(Error::Invalid("text story is empty")),
            StoryKind::Image if draft.image.is_none() => {
                return Err(Error::Invalid("image story has no image"))
            }
            _ => {}
        }

        let story = Story {
            id: StoryId(self.ids.next()),
            user_id: auth.user_id,
            created_at: now_ms(),
            kind: draft.kind,
            image: draft.image,
            text: draft.text,
            background: draft.background,
        };
        self.shared
            .write(|stores| {
                stores.stories_mut().upsert(story.clone());
                Ok(())
            })
            .await?;

        Ok(story)
    }

    /// Initial load: every public list concurrently, plus the current user
    /// and conversations when a token is held. A 401 from any of them ends
    /// the session; the public lists still land.
    /// Reloads every list the backend serves. Server lists replace the
    /// local stores, except that posts and comments this client created
    /// and the server has not returned yet are carried over.
    pub async fn refresh(&self) -> Result<(), Error> {
        let epoch = self.shared.session.epoch().await;
        let token = self.shared.session.token().await;
        let token = token.as_ref().map(|token| token.as_str());
        let backend = &self.shared.backend;
        let query = ProductQuery::default();

        let (feed, stories, reels, products, songs, podcasts) = tokio::join!(
            backend.get_feed(token),
            backend.get_stories(token),
            backend.get_reels(token),
            backend.get_products(token, &query),
            backend.get_songs(token),
            backend.get_podcasts(token)
        );
        let (me, conversations) = match token {
            Some(token) => {
                let (me, conversations) = tokio::join!(
                    backend.get_current_user(token),
                    backend.get_conversations(token)
                );
                (Some(me), Some(conversations))
            }
            None => (None, None),
        };

        if !self.shared.session.is_current(epoch).await {
            debug!("discarding refresh issued before the session changed");
            return Ok(());
        }

        let mut outcome = Outcome::default();
        let feed = outcome.settle("/feed", feed);
        let stories = outcome.settle("/stories", stories);
        let reels = outcome.settle("/reels", reels);
        let products = outcome.settle("/products", products);
        let songs = outcome.settle("/songs", songs);
        let podcasts = outcome.settle("/podcasts", podcasts);
        let me = me.and_then(|me| outcome.settle("/users/me", me));
        let conversations =
            conversations.and_then(|conversations| outcome.settle("/conversations", conversations));

        let now = now_ms();
        let user_id = me.as_ref().map(|user| user.id);
        self.shared
            .write(|stores| {
                if let Some(posts) = feed {
                    let posts = keep_pending_posts(stores.posts(), posts);
                    stores.posts_mut().replace_all(posts);
                }
                if let Some(stories) = stories {
                    stores.stories_mut().replace_all(stories);
                    stores.sweep_expired_stories(now);
                }
                if let Some(reels) = reels {
                    stores.reels_mut().replace_all(reels);
                }
                if let Some(products) = products {
                    stores.products_mut().replace_all(products);
                }
                if let Some(songs) = songs {
                    stores.songs_mut().replace_all(songs);
                }
                if let Some(podcasts) = podcasts {
                    stores.podcasts_mut().replace_all(podcasts);
                }
                if let Some(user) = me {
                    stores.users_mut().upsert(user);
                }
                if let Some(conversations) = conversations {
                    stores.reconcile_conversations(conversations);
                }
                Ok(())
            })
            .await?;

        if let Some(user_id) = user_id {
            self.shared.session.resolve_user(epoch, user_id).await;
        }

        if outcome.unauthorized {
            self.shared.expire_session().await;
            return Err(Error::Unauthorized);
        }
        match outcome.first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// `server`, plus the local posts and comments still stamped "Just now"
/// that it does not contain.
fn keep_pending_posts(local: &Store<Post>, mut server: Vec<Post>) -> Vec<Post> {
    for post in server.iter_mut() {
        if let Some(mine) = local.get_by_id(&post.id) {
            let pending: Vec<Comment> = mine
                .comments
                .iter()
                .filter(|comment| comment.timestamp == JUST_NOW)
                .filter(|comment| !post.comments.iter().any(|known| known.id == comment.id))
                .cloned()
                .collect();
            post.comments.extend(pending);
        }
    }

    let pending: Vec<Post> = local
        .get_all()
        .filter(|post| post.timestamp == JUST_NOW)
        .filter(|post| !server.iter().any(|known| known.id == post.id))
        .cloned()
        .collect();
    if !pending.is_empty() {
        debug!("keeping {} local posts the server has not returned", pending.len());
    }
    server.extend(pending);
    server
}

fn resolve_post(stores: &Stores, post_id: PostId) -> Result<Post, Error> {
    if let Some(post) = stores.posts().get_by_id(&post_id) {
        return Ok(post.clone());
    }
    if let Some(product_id) = post_id.to_product_id() {
        return stores
            .products()
            .get_by_id(&product_id)
            .and_then(unera_feed::promote_product)
            .ok_or_else(|| unknown_post(post_id));
    }
    stores
        .groups()
        .get_all()
        .find_map(|group| {
            group
                .find_post(post_id)
                .map(|group_post| unera_feed::project_group_post(group, group_post))
        })
        .ok_or_else(|| unknown_post(post_id))
}

fn current_attendance(stores: &Stores, event_id: EventId, user_id: UserId) -> Option<Attendance> {
    let stored = stores.events().get_by_id(&event_id);
    let embedded = || {
        stores
            .groups()
            .get_all()
            .flat_map(|group| group.events.iter())
            .find(|event| event.id == event_id)
    };
    stored
        .or_else(embedded)
        .map(|event: &Event| event.attendance_of(user_id))
}

#[derive(Default)]
struct Outcome {
    unauthorized: bool,
    first_error: Option<unera_api::Error>,
}

impl Outcome {
    fn settle<T>(&mut self, endpoint: &str, result: Result<T, unera_api::Error>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(unera_api::Error::Unauthorized) => {
                self.unauthorized = true;
                None
            }
            Err(err) => {
                warn!("Failed to load {}, cause: {}", endpoint, err);
                if self.first_error.is_none() {
                    self.first_error = Some(err);
                }
                None
            }
        }
    }
}

/// The user's current reaction on a feed or group post, for highlighting.
pub fn my_reaction(stores: &Stores, post_id: PostId, user_id: UserId) -> Option<ReactionType> {
    if let Some(post) = stores.posts().get_by_id(&post_id) {
        return reaction_of(&post.reactions, user_id);
    }
    stores
        .groups()
        .get_all()
        .find_map(|group| group.find_post(post_id))
        .and_then(|post| reaction_of(&post.reactions, user_id))
}
