use std::collections::{BTreeMap, BTreeSet};
use unera_msg::{Comment, Post};
use unera_ref::CommentId;

#[derive(Clone, Debug, PartialEq)]
pub struct CommentNode<'a> {
    pub comment: &'a Comment,
    pub replies: Vec<CommentNode<'a>>,
}

impl<'a> CommentNode<'a> {
    /// Number of comments in this subtree, itself included.
    pub fn len(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::len).sum::<usize>()
    }
}

/// Groups a post's comments into reply trees by `parent_id`, keeping
/// insertion order within each level. A reply whose parent is missing is
/// shown at the root.
pub fn comment_thread(post: &Post) -> Vec<CommentNode<'_>> {
    let known: BTreeSet<CommentId> = post.comments.iter().map(|comment| comment.id).collect();
    let mut children: BTreeMap<CommentId, Vec<&Comment>> = BTreeMap::new();
    let mut roots: Vec<&Comment> = Vec::new();

    for comment in post.comments.iter() {
        match comment.parent_id {
            Some(parent_id) if parent_id != comment.id && known.contains(&parent_id) => {
                children.entry(parent_id).or_default().push(comment)
            }
            _ => roots.push(comment),
        }
    }

    let mut placed: BTreeSet<CommentId> = BTreeSet::new();
    let mut thread: Vec<CommentNode> = roots
        .into_iter()
        .map(|comment| build_node(comment, &children, &mut placed))
        .collect();

    // replies caught in a parent cycle never hang off a root
    for comment in post.comments.iter() {
        if !placed.contains(&comment.id) {
            thread.push(build_node(comment, &children, &mut placed));
        }
    }

    thread
}

fn build_node<'a>(
    comment: &'a Comment,
    children: &BTreeMap<CommentId, Vec<&'a Comment>>,
    placed: &mut BTreeSet<CommentId>,
) -> CommentNode<'a> {
    placed.insert(comment.id);
    let replies = children
        .get(&comment.id)
        .map(|replies| {
            replies
                .iter()
                .filter(|reply| !placed.contains(&reply.id))
                .copied()
                .collect::<Vec<&Comment>>()
        })
        .unwrap_or_default()
        .into_iter()
        .map(|reply| build_node(reply, children, placed))
        .collect();

    CommentNode { comment, replies }
}
