//! Comment tree kept as an arena keyed by comment id.
//!
//! Nodes refer to their parent by id and to their children through an
//! ordered list of [`Entry`] values, so a "load more" placeholder can be
//! replaced in place without touching its siblings.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::reddit::{Comment, CommentThing, Listing, More, Post};
use crate::validate;
use crate::vote::{SaveToggle, Votable, VoteState};

const DELETED_SENTINELS: [&str; 2] = ["[deleted]", "[removed]"];

pub fn is_deleted_text(text: &str) -> bool {
    DELETED_SENTINELS.contains(&text.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StubId(u64);

impl fmt::Display for StubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "more#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Comment(String),
    More(StubId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("no comment with id {0}")]
    UnknownComment(String),
    #[error("no placeholder {0}")]
    UnknownStub(StubId),
    #[error("{0} was already resolved")]
    AlreadyResolved(StubId),
    #[error("{0} is already being loaded")]
    InProgress(StubId),
    #[error("{0} was never requested")]
    NotRequested(StubId),
    #[error("this thread is archived and no longer accepts replies")]
    Preserved,
}

#[derive(Debug, Clone)]
pub struct PostNode {
    pub id: String,
    pub name: String,
    pub subreddit: String,
    pub title: String,
    pub author: String,
    pub body: String,
    pub url: String,
    pub permalink: String,
    pub num_comments: i64,
    pub created_utc: f64,
    pub vote: Votable,
    pub save: SaveToggle,
    pub preserved: bool,
    pub official: bool,
}

#[derive(Debug, Clone)]
pub struct CommentNode {
    pub id: String,
    pub name: String,
    /// `None` for top-level comments.
    pub parent_id: Option<String>,
    pub author: String,
    pub body: String,
    pub created_utc: f64,
    pub vote: Votable,
    pub save: SaveToggle,
    pub deleted: bool,
    pub edited: bool,
    pub distinguished: Option<String>,
    pub is_op: bool,
    pub collapsed: bool,
    pub depth: usize,
    pub children: Vec<Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubState {
    Pending,
    Resolving,
    Resolved,
}

#[derive(Debug, Clone)]
pub struct MoreStub {
    pub id: StubId,
    pub remote_id: String,
    pub parent_id: Option<String>,
    pub count: i64,
    pub child_ids: Vec<String>,
    pub depth: usize,
    pub state: StubState,
}

/// What to fetch to resolve a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoreRequest {
    /// Reload the owning comment; the answer echoes it with its replies.
    Subtree { stub: StubId, anchor: String },
    /// Load the hidden ids themselves; the answer is a flat list.
    Children { stub: StubId, ids: Vec<String> },
}

impl MoreRequest {
    pub fn stub(&self) -> StubId {
        match self {
            MoreRequest::Subtree { stub, .. } | MoreRequest::Children { stub, .. } => *stub,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    /// Comments scoring below this start collapsed.
    pub hidden_threshold: i64,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            hidden_threshold: -4,
        }
    }
}

/// One step of a depth-first walk over the visible tree.
#[derive(Debug, Clone, Copy)]
pub enum Visit<'a> {
    Comment(&'a CommentNode),
    More(&'a MoreStub),
}

#[derive(Debug, Clone)]
pub struct CommentTree {
    post: PostNode,
    roots: Vec<Entry>,
    comments: HashMap<String, CommentNode>,
    stubs: HashMap<StubId, MoreStub>,
    next_stub: u64,
    options: TreeOptions,
}

impl CommentTree {
    pub fn build(post: Post, comments: Vec<CommentThing>, options: TreeOptions, now: f64) -> Self {
        let post = PostNode {
            preserved: validate::is_preserved(post.created_utc, now),
            vote: Votable::new(post.score, VoteState::from_likes(post.likes)),
            save: SaveToggle::new(post.saved),
            name: if post.name.is_empty() {
                format!("t3_{}", post.id)
            } else {
                post.name
            },
            id: post.id,
            subreddit: post.subreddit,
            title: post.title,
            author: post.author,
            body: post.selftext,
            url: post.url,
            permalink: post.permalink,
            num_comments: post.num_comments,
            created_utc: post.created_utc,
            official: false,
        };
        let mut tree = CommentTree {
            post,
            roots: Vec::new(),
            comments: HashMap::new(),
            stubs: HashMap::new(),
            next_stub: 0,
            options,
        };
        tree.roots = tree.assemble(comments, None, 0);
        tracing::debug!(
            post = %tree.post.id,
            comments = tree.comments.len(),
            stubs = tree.stubs.len(),
            "assembled comment tree"
        );
        tree
    }

    pub fn post(&self) -> &PostNode {
        &self.post
    }

    pub fn post_mut(&mut self) -> &mut PostNode {
        &mut self.post
    }

    pub fn roots(&self) -> &[Entry] {
        &self.roots
    }

    pub fn comment(&self, id: &str) -> Option<&CommentNode> {
        self.comments.get(id)
    }

    pub fn comment_mut(&mut self, id: &str) -> Option<&mut CommentNode> {
        self.comments.get_mut(id)
    }

    pub fn stub(&self, id: StubId) -> Option<&MoreStub> {
        self.stubs.get(&id)
    }

    /// Placeholders that are still waiting to be expanded, in tree order.
    pub fn pending_stubs(&self) -> Vec<StubId> {
        let mut pending = Vec::new();
        self.walk_entries(&self.roots, false, &mut |visit| {
            if let Visit::More(stub) = visit {
                if stub.state == StubState::Pending {
                    pending.push(stub.id);
                }
            }
        });
        pending
    }

    /// Depth-first walk that skips the replies of collapsed comments.
    pub fn visible(&self) -> Vec<Visit<'_>> {
        let mut out = Vec::new();
        self.walk_entries(&self.roots, true, &mut |visit| out.push(visit));
        out
    }

    fn walk_entries<'a>(&'a self, entries: &'a [Entry], honour_collapse: bool, f: &mut dyn FnMut(Visit<'a>)) {
        for entry in entries {
            match entry {
                Entry::Comment(id) => {
                    if let Some(node) = self.comments.get(id) {
                        f(Visit::Comment(node));
                        if !(honour_collapse && node.collapsed) {
                            self.walk_entries(&node.children, honour_collapse, f);
                        }
                    }
                }
                Entry::More(stub) => {
                    if let Some(stub) = self.stubs.get(stub) {
                        if stub.state != StubState::Resolved {
                            f(Visit::More(stub));
                        }
                    }
                }
            }
        }
    }

    /// Marks a placeholder as loading and returns what to fetch for it.
    ///
    /// Nested placeholders reload their owning comment. Top-level ones have
    /// no owner, so every hidden id is requested directly.
    pub fn begin_expand(&mut self, id: StubId) -> Result<MoreRequest, TreeError> {
        let stub = self.stubs.get_mut(&id).ok_or(TreeError::UnknownStub(id))?;
        match stub.state {
            StubState::Resolved => return Err(TreeError::AlreadyResolved(id)),
            StubState::Resolving => return Err(TreeError::InProgress(id)),
            StubState::Pending => {}
        }
        stub.state = StubState::Resolving;
        Ok(match &stub.parent_id {
            Some(anchor) => MoreRequest::Subtree {
                stub: id,
                anchor: anchor.clone(),
            },
            None => MoreRequest::Children {
                stub: id,
                ids: stub.child_ids.clone(),
            },
        })
    }

    /// Puts a placeholder back to pending after a failed fetch.
    pub fn abort_expand(&mut self, id: StubId) -> Result<(), TreeError> {
        let stub = self.stubs.get_mut(&id).ok_or(TreeError::UnknownStub(id))?;
        match stub.state {
            StubState::Resolving => {
                stub.state = StubState::Pending;
                Ok(())
            }
            StubState::Resolved => Err(TreeError::AlreadyResolved(id)),
            StubState::Pending => Err(TreeError::NotRequested(id)),
        }
    }

    /// Replaces a loading placeholder with the fetched comments, at the
    /// placeholder's position. Comments already in the tree are skipped.
    /// Returns the number of entries inserted.
    pub fn complete_expand(
        &mut self,
        id: StubId,
        fetched: Vec<CommentThing>,
    ) -> Result<usize, TreeError> {
        let (parent_id, depth) = {
            let stub = self.stubs.get(&id).ok_or(TreeError::UnknownStub(id))?;
            match stub.state {
                StubState::Resolved => return Err(TreeError::AlreadyResolved(id)),
                StubState::Pending => return Err(TreeError::NotRequested(id)),
                StubState::Resolving => {}
            }
            (stub.parent_id.clone(), stub.depth)
        };

        let fetched = match parent_id.as_deref() {
            Some(anchor) => unwrap_anchor(fetched, anchor),
            None => self.adopt_descendants(nest_flat(fetched)),
        };
        let entries = self.assemble(fetched, parent_id.as_deref(), depth);
        let inserted = entries.len();

        let siblings = match parent_id.as_deref() {
            None => &mut self.roots,
            Some(parent) => {
                &mut self
                    .comments
                    .get_mut(parent)
                    .ok_or_else(|| TreeError::UnknownComment(parent.to_string()))?
                    .children
            }
        };
        let index = siblings
            .iter()
            .position(|entry| *entry == Entry::More(id))
            .ok_or(TreeError::UnknownStub(id))?;
        siblings.splice(index..=index, entries);

        if let Some(stub) = self.stubs.get_mut(&id) {
            stub.state = StubState::Resolved;
        }
        tracing::debug!(stub = %id, inserted, "expanded placeholder");
        Ok(inserted)
    }

    pub fn can_reply(&self) -> bool {
        !self.post.preserved
    }

    /// Inserts a freshly posted comment as the first child of `parent`, or
    /// as the first top-level comment.
    pub fn insert_reply(&mut self, parent: Option<&str>, comment: Comment) -> Result<(), TreeError> {
        if self.post.preserved {
            return Err(TreeError::Preserved);
        }
        let depth = match parent {
            None => 0,
            Some(id) => {
                self.comments
                    .get(id)
                    .ok_or_else(|| TreeError::UnknownComment(id.to_string()))?
                    .depth
                    + 1
            }
        };
        let entries = self.assemble(vec![CommentThing::Comment(comment)], parent, depth);
        let siblings = match parent {
            None => &mut self.roots,
            Some(id) => match self.comments.get_mut(id) {
                Some(node) => &mut node.children,
                None => return Err(TreeError::UnknownComment(id.to_string())),
            },
        };
        for entry in entries.into_iter().rev() {
            siblings.insert(0, entry);
        }
        Ok(())
    }

    pub fn apply_edit(&mut self, id: &str, body: impl Into<String>) -> Result<(), TreeError> {
        let node = self
            .comments
            .get_mut(id)
            .ok_or_else(|| TreeError::UnknownComment(id.to_string()))?;
        node.body = body.into();
        node.edited = true;
        Ok(())
    }

    /// Keeps the node so the shape of the conversation survives.
    pub fn mark_deleted(&mut self, id: &str) -> Result<(), TreeError> {
        let node = self
            .comments
            .get_mut(id)
            .ok_or_else(|| TreeError::UnknownComment(id.to_string()))?;
        node.deleted = true;
        node.body = DELETED_SENTINELS[0].to_string();
        node.author = DELETED_SENTINELS[0].to_string();
        node.is_op = false;
        Ok(())
    }

    pub fn toggle_collapsed(&mut self, id: &str) -> Result<bool, TreeError> {
        let node = self
            .comments
            .get_mut(id)
            .ok_or_else(|| TreeError::UnknownComment(id.to_string()))?;
        node.collapsed = !node.collapsed;
        Ok(node.collapsed)
    }

    /// Hands comments whose parent is already in the tree to that parent and
    /// returns the rest.
    fn adopt_descendants(&mut self, things: Vec<CommentThing>) -> Vec<CommentThing> {
        let mut rest = Vec::with_capacity(things.len());
        for thing in things {
            let owner = thing_parent(&thing)
                .strip_prefix("t1_")
                .filter(|id| self.comments.contains_key(*id))
                .map(str::to_string);
            let Some(owner) = owner else {
                rest.push(thing);
                continue;
            };
            let depth = self.comments.get(&owner).map_or(0, |node| node.depth + 1);
            let entries = self.assemble(vec![thing], Some(&owner), depth);
            if let Some(node) = self.comments.get_mut(&owner) {
                node.children.extend(entries);
            }
        }
        rest
    }

    fn assemble(
        &mut self,
        things: Vec<CommentThing>,
        parent: Option<&str>,
        depth: usize,
    ) -> Vec<Entry> {
        let mut entries = Vec::with_capacity(things.len());
        for thing in things {
            match thing {
                CommentThing::Comment(comment) => {
                    if self.comments.contains_key(&comment.id) {
                        continue;
                    }
                    let id = self.insert_comment(comment, parent, depth);
                    entries.push(Entry::Comment(id));
                }
                CommentThing::More(more) => {
                    entries.push(Entry::More(self.insert_stub(more, parent, depth)));
                }
            }
        }
        entries
    }

    fn insert_comment(&mut self, mut comment: Comment, parent: Option<&str>, depth: usize) -> String {
        let replies = comment
            .replies
            .take()
            .map(|listing| listing.children)
            .unwrap_or_default();
        let deleted = is_deleted_text(&comment.body) || is_deleted_text(&comment.author);
        let id = comment.id.clone();
        let node = CommentNode {
            is_op: !deleted && !comment.author.is_empty() && comment.author == self.post.author,
            collapsed: comment.score < self.options.hidden_threshold,
            vote: Votable::new(comment.score, VoteState::from_likes(comment.likes)),
            save: SaveToggle::new(comment.saved),
            parent_id: parent.map(str::to_string),
            id: comment.id,
            name: comment.name,
            author: comment.author,
            body: comment.body,
            created_utc: comment.created_utc,
            deleted,
            edited: comment.edited,
            distinguished: comment.distinguished,
            depth,
            children: Vec::new(),
        };
        self.comments.insert(id.clone(), node);
        let children = self.assemble(replies, Some(&id), depth + 1);
        if let Some(node) = self.comments.get_mut(&id) {
            node.children = children;
        }
        id
    }

    fn insert_stub(&mut self, more: More, parent: Option<&str>, depth: usize) -> StubId {
        let id = StubId(self.next_stub);
        self.next_stub += 1;
        self.stubs.insert(
            id,
            MoreStub {
                id,
                remote_id: more.id,
                parent_id: parent.map(str::to_string),
                count: more.count,
                child_ids: more.children,
                depth,
                state: StubState::Pending,
            },
        );
        id
    }
}

/// A fetch anchored on the owning comment echoes that comment back with the
/// expanded replies underneath it.
fn unwrap_anchor(fetched: Vec<CommentThing>, anchor: &str) -> Vec<CommentThing> {
    match fetched.as_slice() {
        [CommentThing::Comment(comment)] if comment.id == anchor => {}
        _ => return fetched,
    }
    match fetched.into_iter().next() {
        Some(CommentThing::Comment(comment)) => comment
            .replies
            .map(|listing| listing.children)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn thing_parent(thing: &CommentThing) -> &str {
    match thing {
        CommentThing::Comment(comment) => &comment.parent_id,
        CommentThing::More(more) => &more.parent_id,
    }
}

/// Rebuilds nesting for a flat batch of things linked by `parent_id`.
/// Order within each level is kept.
fn nest_flat(things: Vec<CommentThing>) -> Vec<CommentThing> {
    let names: HashSet<String> = things
        .iter()
        .filter_map(|thing| match thing {
            CommentThing::Comment(comment) => Some(comment.name.clone()),
            CommentThing::More(_) => None,
        })
        .collect();
    let mut tops = Vec::new();
    let mut replies: HashMap<String, Vec<CommentThing>> = HashMap::new();
    for thing in things {
        let parent = thing_parent(&thing);
        if names.contains(parent) {
            replies.entry(parent.to_string()).or_default().push(thing);
        } else {
            tops.push(thing);
        }
    }
    tops.into_iter()
        .map(|thing| attach_replies(thing, &mut replies))
        .collect()
}

fn attach_replies(
    thing: CommentThing,
    replies: &mut HashMap<String, Vec<CommentThing>>,
) -> CommentThing {
    let mut comment = match thing {
        CommentThing::Comment(comment) => comment,
        more => return more,
    };
    if let Some(children) = replies.remove(&comment.name) {
        let children: Vec<CommentThing> = children
            .into_iter()
            .map(|child| attach_replies(child, replies))
            .collect();
        match comment.replies.as_mut() {
            Some(listing) => listing.children.extend(children),
            None => {
                comment.replies = Some(Box::new(Listing {
                    after: None,
                    before: None,
                    modhash: None,
                    children,
                }))
            }
        }
    }
    CommentThing::Comment(comment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reddit::fixtures;
    use serde_json::Value;

    const NOW: f64 = 1_700_000_100.0;

    fn things(values: Vec<Value>) -> Vec<CommentThing> {
        let listing: Listing<CommentThing> =
            serde_json::from_value(serde_json::json!({ "children": values })).unwrap();
        listing.children
    }

    fn post() -> Post {
        serde_json::from_value(serde_json::json!({
            "id": "p1",
            "name": "t3_p1",
            "title": "A video",
            "subreddit": "videos",
            "author": "author_b",
            "score": 10,
            "num_comments": 6,
            "created_utc": 1_700_000_000.0,
        }))
        .unwrap()
    }

    fn ids(entries: &[Entry], tree: &CommentTree) -> Vec<String> {
        entries
            .iter()
            .map(|entry| match entry {
                Entry::Comment(id) => id.clone(),
                Entry::More(stub) => format!("more:{}", tree.stub(*stub).unwrap().remote_id),
            })
            .collect()
    }

    fn sample_tree() -> CommentTree {
        let comments = things(vec![
            fixtures::comment(
                "a",
                "t3_p1",
                "first",
                vec![fixtures::comment("a1", "t1_a", "[deleted]", vec![])],
            ),
            fixtures::comment("b", "t3_p1", "second", vec![]),
            fixtures::more("m1", "t3_p1", &["c", "d", "d1", "e", "b1"]),
            fixtures::comment("f", "t3_p1", "last", vec![]),
        ]);
        CommentTree::build(post(), comments, TreeOptions::default(), NOW)
    }

    fn top_level_stub(tree: &CommentTree) -> StubId {
        match &tree.roots()[2] {
            Entry::More(stub) => *stub,
            other => panic!("expected placeholder, got {other:?}"),
        }
    }

    #[test]
    fn builds_nested_tree_with_markers() {
        let tree = sample_tree();
        assert_eq!(ids(tree.roots(), &tree), ["a", "b", "more:m1", "f"]);
        let a = tree.comment("a").unwrap();
        assert_eq!(a.depth, 0);
        assert_eq!(a.parent_id, None);
        let a1 = tree.comment("a1").unwrap();
        assert!(a1.deleted);
        assert_eq!(a1.depth, 1);
        assert_eq!(a1.parent_id.as_deref(), Some("a"));
        assert!(tree.comment("b").unwrap().is_op);
        assert!(!tree.comment("a").unwrap().is_op);
        assert!(!tree.post().preserved);
        assert_eq!(tree.post().vote.score(), 10);
    }

    #[test]
    fn top_level_placeholder_requests_every_hidden_id() {
        let mut tree = sample_tree();
        let stub = top_level_stub(&tree);
        assert_eq!(
            tree.begin_expand(stub).unwrap(),
            MoreRequest::Children {
                stub,
                ids: vec!["c".into(), "d".into(), "d1".into(), "e".into(), "b1".into()],
            }
        );

        // The batch answer is flat; nesting comes from `parent_id`.
        let fetched = things(vec![
            fixtures::comment("c", "t3_p1", "c", vec![]),
            fixtures::comment("d", "t3_p1", "d", vec![]),
            fixtures::comment("d1", "t1_d", "under d", vec![]),
            fixtures::comment("e", "t3_p1", "e", vec![]),
            fixtures::comment("b1", "t1_b", "under b", vec![]),
        ]);
        assert_eq!(tree.complete_expand(stub, fetched).unwrap(), 3);
        assert_eq!(ids(tree.roots(), &tree), ["a", "b", "c", "d", "e", "f"]);
        assert_eq!(ids(&tree.comment("d").unwrap().children, &tree), ["d1"]);
        assert_eq!(tree.comment("d1").unwrap().depth, 1);
        assert_eq!(ids(&tree.comment("b").unwrap().children, &tree), ["b1"]);
        assert_eq!(tree.comment("b1").unwrap().parent_id.as_deref(), Some("b"));
        assert!(tree.pending_stubs().is_empty());

        assert_eq!(tree.begin_expand(stub), Err(TreeError::AlreadyResolved(stub)));
        assert_eq!(
            tree.complete_expand(stub, Vec::new()),
            Err(TreeError::AlreadyResolved(stub))
        );
    }

    #[test]
    fn nested_placeholder_anchors_on_owner_and_unwraps_echo() {
        let comments = things(vec![fixtures::comment(
            "a",
            "t3_p1",
            "parent",
            vec![
                fixtures::comment("a1", "t1_a", "kept", vec![]),
                fixtures::more("m2", "t1_a", &["a2", "a3"]),
            ],
        )]);
        let mut tree = CommentTree::build(post(), comments, TreeOptions::default(), NOW);
        let stub = tree.pending_stubs()[0];
        assert_eq!(
            tree.begin_expand(stub).unwrap(),
            MoreRequest::Subtree {
                stub,
                anchor: "a".into(),
            }
        );

        let echoed = things(vec![fixtures::comment(
            "a",
            "t3_p1",
            "parent",
            vec![
                fixtures::comment("a1", "t1_a", "kept", vec![]),
                fixtures::comment("a2", "t1_a", "two", vec![]),
                fixtures::comment(
                    "a3",
                    "t1_a",
                    "three",
                    vec![fixtures::more("m3", "t1_a3", &["x"])],
                ),
            ],
        )]);
        assert_eq!(tree.complete_expand(stub, echoed).unwrap(), 2);
        let a = tree.comment("a").unwrap();
        assert_eq!(ids(&a.children, &tree), ["a1", "a2", "a3"]);
        assert_eq!(tree.comment("a3").unwrap().depth, 1);
        assert_eq!(tree.pending_stubs().len(), 1);
    }

    #[test]
    fn aborted_expand_can_be_retried() {
        let mut tree = sample_tree();
        let stub = top_level_stub(&tree);
        tree.begin_expand(stub).unwrap();
        assert_eq!(tree.begin_expand(stub), Err(TreeError::InProgress(stub)));
        tree.abort_expand(stub).unwrap();
        assert!(tree.begin_expand(stub).is_ok());
        assert_eq!(
            tree.complete_expand(StubId(99), Vec::new()),
            Err(TreeError::UnknownStub(StubId(99)))
        );
    }

    #[test]
    fn low_scores_start_collapsed_and_hide_replies() {
        let mut raw = fixtures::comment(
            "low",
            "t3_p1",
            "meh",
            vec![fixtures::comment("under", "t1_low", "hidden", vec![])],
        );
        raw["data"]["score"] = serde_json::json!(-9);
        let mut tree =
            CommentTree::build(post(), things(vec![raw]), TreeOptions::default(), NOW);
        assert!(tree.comment("low").unwrap().collapsed);
        assert_eq!(tree.visible().len(), 1);
        assert!(!tree.toggle_collapsed("low").unwrap());
        assert_eq!(tree.visible().len(), 2);
    }

    #[test]
    fn replies_edits_and_deletes_apply_locally() {
        let mut tree = sample_tree();
        let reply: Comment = serde_json::from_value(
            fixtures::comment("r1", "t1_b", "hello", vec![])["data"].clone(),
        )
        .unwrap();
        tree.insert_reply(Some("b"), reply).unwrap();
        let b = tree.comment("b").unwrap();
        assert_eq!(b.children, [Entry::Comment("r1".into())]);
        assert_eq!(tree.comment("r1").unwrap().depth, 1);

        tree.apply_edit("r1", "hello again").unwrap();
        assert!(tree.comment("r1").unwrap().edited);
        tree.mark_deleted("b").unwrap();
        let b = tree.comment("b").unwrap();
        assert!(b.deleted);
        assert_eq!(b.children.len(), 1);
        assert_eq!(
            tree.apply_edit("missing", "x"),
            Err(TreeError::UnknownComment("missing".into()))
        );
    }

    #[test]
    fn preserved_threads_reject_replies() {
        let comments = things(vec![fixtures::comment("a", "t3_p1", "old", vec![])]);
        let now = 1_700_000_000.0 + validate::PRESERVED_AFTER_SECS;
        let mut tree = CommentTree::build(post(), comments, TreeOptions::default(), now);
        assert!(!tree.can_reply());
        let reply: Comment = serde_json::from_value(
            fixtures::comment("r", "t1_a", "late", vec![])["data"].clone(),
        )
        .unwrap();
        assert_eq!(tree.insert_reply(Some("a"), reply), Err(TreeError::Preserved));
    }
}
