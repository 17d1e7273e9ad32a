// Derived, read-only views over the entity stores. Nothing here mutates or
// caches; every function is a pure function of its input snapshot.

use itertools::Itertools;
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use unera_db::Stores;
use unera_msg::{Event, Group, GroupKind, Post, PostKind, Product, ProductStatus, User, Visibility};
use unera_ref::{EventId, PostId, UserId};

mod group;
mod market;
mod suggest;
mod thread;

pub use group::{group_feed, project_group_post};
pub use market::{
    detect_country, filter_products, ProductFilter, DEFAULT_COUNTRY, MARKET_COUNTRIES,
};
pub use suggest::{suggest_users, Suggestion};
pub use thread::{comment_thread, CommentNode};

/// One promoted product after every this many feed entries.
pub const PROMOTION_INTERVAL: usize = 5;

// Ranking boosts, expressed as a head start in milliseconds.
const FOLLOW_BOOST_MS: i64 = 6 * 60 * 60 * 1000;
const LOCATION_BOOST_MS: i64 = 2 * 60 * 60 * 1000;

/// Everything the composer reads, borrowed from the stores.
#[derive(Clone, Debug, Default)]
pub struct FeedSnapshot<'a> {
    pub posts: Vec<&'a Post>,
    pub products: Vec<&'a Product>,
    pub groups: Vec<&'a Group>,
    pub events: Vec<&'a Event>,
    pub users: Vec<&'a User>,
    pub current_user: Option<&'a User>,
}

impl<'a> FeedSnapshot<'a> {
    pub fn from_stores(stores: &'a Stores, current_user: Option<&'a User>) -> Self {
        FeedSnapshot {
            posts: stores.posts().get_all().collect(),
            products: stores.products().get_all().collect(),
            groups: stores.groups().get_all().collect(),
            events: stores.events().get_all().collect(),
            users: stores.users().get_all().collect(),
            current_user,
        }
    }
}

/// Composes the home feed: visible organic and group posts ranked into a
/// total order, with one promoted product inserted at every
/// [`PROMOTION_INTERVAL`]th position and the rest appended at the end.
pub fn compose_feed(snapshot: &FeedSnapshot) -> Vec<Post> {
    let viewer = snapshot.current_user;
    let users: BTreeMap<UserId, &User> =
        snapshot.users.iter().map(|user| (user.id, *user)).collect();
    let events: BTreeMap<EventId, &Event> =
        snapshot.events.iter().map(|event| (event.id, *event)).collect();

    let group_posts: Vec<Post> = snapshot
        .groups
        .iter()
        .filter(|group| group_visible_to(group, viewer))
        .flat_map(|group| {
            group
                .posts
                .iter()
                .map(move |group_post| project_group_post(group, group_post))
        })
        .collect();
    let projected: BTreeSet<PostId> = group_posts.iter().map(|post| post.id).collect();

    let organic = snapshot
        .posts
        .iter()
        .filter(|post| {
            if post.id.is_synthetic() {
                warn!("Dropping post {} with an id in the promotion range", post.id);
                return false;
            }
            // the group's own copy is the one shown
            !projected.contains(&post.id)
        })
        .map(|post| (*post).clone())
        .chain(group_posts)
        .filter(|post| post_visible_to(post, viewer))
        .map(|mut post| {
            resolve_event(&mut post, &events);
            post
        });

    let ranked = organic
        .map(|post| (rank_score(&post, viewer, &users), post))
        .sorted_by(|(a_score, a), (b_score, b)| b_score.cmp(a_score).then(b.id.cmp(&a.id)))
        .map(|(_, post)| post);

    let promoted = snapshot
        .products
        .iter()
        .filter(|product| product.status == ProductStatus::Active)
        .filter_map(|product| promote_product(product));

    interleave(ranked, promoted)
}

fn interleave(
    ranked: impl Iterator<Item = Post>,
    promoted: impl Iterator<Item = Post>,
) -> Vec<Post> {
    let mut promoted = promoted.peekable();
    let mut feed: Vec<Post> = Vec::new();
    let mut next_slot = PROMOTION_INTERVAL;

    for post in ranked {
        if feed.len() == next_slot {
            if let Some(product_post) = promoted.next() {
                feed.push(product_post);
                next_slot += PROMOTION_INTERVAL;
            }
        }
        feed.push(post);
    }
    feed.extend(promoted);

    feed
}

/// Projects a product into the feed under its synthetic post id.
pub fn promote_product(product: &Product) -> Option<Post> {
    let post_id = match product.id.to_synthetic_post_id() {
        Ok(post_id) => post_id,
        Err(err) => {
            warn!("Not promoting product {}: {}", product.id, err);
            return None;
        }
    };

    let mut post = Post::new(post_id, product.seller_id);
    post.content = Some(product.title.clone());
    post.image = product.images.first().cloned();
    post.timestamp = "Sponsored".to_string();
    post.created_at = Some(product.date);
    post.kind = PostKind::Product;
    post.location = Some(product.address.clone()).filter(|address| !address.is_empty());
    post.product = Some(product.clone());
    Some(post)
}

fn rank_score(post: &Post, viewer: Option<&User>, users: &BTreeMap<UserId, &User>) -> i64 {
    let mut score = post.created_at_or_zero();
    if let Some(viewer) = viewer {
        if viewer.is_following(post.author_id) {
            score = score.saturating_add(FOLLOW_BOOST_MS);
        }
        let same_location = users
            .get(&post.author_id)
            .map_or(false, |author| author.id != viewer.id && viewer.shares_location_with(author));
        if same_location {
            score = score.saturating_add(LOCATION_BOOST_MS);
        }
    }
    score
}

fn post_visible_to(post: &Post, viewer: Option<&User>) -> bool {
    match (post.visibility, viewer) {
        (Visibility::Public, _) => true,
        (_, None) => false,
        (Visibility::OnlyMe, Some(viewer)) => viewer.id == post.author_id,
        (Visibility::Friends, Some(viewer)) => {
            viewer.id == post.author_id || viewer.is_following(post.author_id)
        }
    }
}

fn group_visible_to(group: &Group, viewer: Option<&User>) -> bool {
    match group.kind {
        GroupKind::Public => true,
        GroupKind::Private => viewer.map_or(false, |viewer| group.is_member(viewer.id)),
    }
}

// Embedded events are display copies; the event store holds attendance.
fn resolve_event(post: &mut Post, events: &BTreeMap<EventId, &Event>) {
    if let Some(event) = post.event.as_mut() {
        if let Some(current) = events.get(&event.id) {
            *event = (*current).clone();
        }
    }
}
