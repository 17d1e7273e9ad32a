use itertools::Itertools;
use unera_msg::{Group, GroupPost, Post, PostKind};

/// A group post as it appears in a feed: a Post-shaped view carrying group
/// attribution and keyed by the group post's own id.
pub fn project_group_post(group: &Group, group_post: &GroupPost) -> Post {
    let kind = if group_post.video.is_some() {
        PostKind::Video
    } else if group_post.image.is_some() {
        PostKind::Image
    } else {
        PostKind::Text
    };

    let mut post = Post::new(group_post.id, group_post.author_id);
    post.content = Some(group_post.content.clone()).filter(|content| !content.is_empty());
    post.image = group_post.image.clone();
    post.video = group_post.video.clone();
    post.background = group_post.background.clone();
    post.timestamp = "Recently".to_string();
    post.created_at = Some(group_post.timestamp);
    post.reactions = group_post.reactions.clone();
    post.comments = group_post.comments.clone();
    post.shares = group_post.shares;
    post.kind = kind;
    post.group_id = Some(group.id.clone());
    post.group_name = Some(group.name.clone());
    post
}

/// The feed shown on a group's own page, newest first.
pub fn group_feed(group: &Group) -> Vec<Post> {
    group
        .posts
        .iter()
        .map(|group_post| project_group_post(group, group_post))
        .sorted_by(|a, b| {
            b.created_at_or_zero()
                .cmp(&a.created_at_or_zero())
                .then(b.id.cmp(&a.id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use unera_msg::GroupKind;
    use unera_ref::{GroupId, PostId, UserId};

    fn group_post(id: u64, timestamp: i64) -> GroupPost {
        GroupPost {
            id: PostId(id),
            author_id: UserId(2),
            content: format!("post {}", id),
            image: None,
            video: None,
            background: None,
            reactions: Vec::new(),
            comments: Vec::new(),
            shares: 0,
            timestamp,
        }
    }

    #[test]
    fn test_group_feed_newest_first_with_attribution() {
        let mut with_image = group_post(3, 200);
        with_image.image = Some("photo.jpg".to_string());
        let group = Group {
            id: GroupId::from("g-hikers"),
            name: "Kilimanjaro Hikers".to_string(),
            description: String::new(),
            kind: GroupKind::Public,
            image: String::new(),
            cover_image: String::new(),
            admin_id: UserId(1),
            members: BTreeSet::new(),
            posts: vec![group_post(1, 100), with_image, group_post(2, 300)],
            created_date: 0,
            events: Vec::new(),
            member_posting_allowed: None,
        };

        let feed = group_feed(&group);

        let ids: Vec<u64> = feed.iter().map(|post| post.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(feed[1].kind, PostKind::Image);
        assert!(feed
            .iter()
            .all(|post| post.group_name.as_deref() == Some("Kilimanjaro Hikers")));
        assert_eq!(feed[0].group_id, Some(GroupId::from("g-hikers")));
    }
}
