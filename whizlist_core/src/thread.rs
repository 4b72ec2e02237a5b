//! Comment threads.
//!
//! Comments for one entity are kept as a flat arena keyed by id. The nested
//! reply tree is derived from the arena on demand and never stored, so edits and
//! deletions only ever touch flat records.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::prelude::EntityRef;
use crate::ids::{CommentId, UserId};

/// Replies are displayed at most this many levels below a root comment.
pub const MAX_NESTING_DEPTH: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// A comment row joined with its author and like metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: CommentId,
    pub content: String,
    pub entity: EntityRef,
    pub author: Author,
    pub parent_id: Option<CommentId>,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub like_count: u64,
    pub is_liked_by_user: bool,
}

/// A comment with its replies, oldest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadedComment {
    pub comment: CommentRecord,
    pub replies: Vec<ThreadedComment>,
}

impl ThreadedComment {
    /// Pre-order walk over this comment and every nested reply.
    pub fn walk(&self) -> Vec<&CommentRecord> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(&node.comment);
            stack.extend(node.replies.iter().rev());
        }
        out
    }
}

impl Drop for ThreadedComment {
    // unlink replies level by level so deep chains don't drop recursively
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.replies);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.replies);
        }
    }
}

/// Flattens a thread back into pre-order.
pub fn flatten(thread: &[ThreadedComment]) -> Vec<&CommentRecord> {
    thread.iter().flat_map(ThreadedComment::walk).collect()
}

/// Builds the reply tree.
///
/// A comment whose parent is missing from `records` becomes a root. Parent
/// chains that loop back on themselves are cut at the oldest comment, so every
/// distinct id ends up in the output exactly once. Roots and every reply list are
/// ordered by `created_at`, ties broken by id.
pub fn build_thread(records: impl IntoIterator<Item = CommentRecord>) -> Vec<ThreadedComment> {
    let mut seen = HashSet::new();
    let mut records: Vec<CommentRecord> = records
        .into_iter()
        .filter(|record| seen.insert(record.id))
        .collect();
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let index: HashMap<CommentId, usize> = records
        .iter()
        .enumerate()
        .map(|(i, record)| (record.id, i))
        .collect();

    // records are chronological, so children and roots come out sorted
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut roots = Vec::new();
    for (i, record) in records.iter().enumerate() {
        match record.parent_id.and_then(|parent| index.get(&parent)) {
            Some(&parent) if parent != i => children[parent].push(i),
            _ => roots.push(i),
        }
    }

    let mut slots: Vec<Option<CommentRecord>> = records.into_iter().map(Some).collect();
    let mut thread: Vec<ThreadedComment> = roots
        .into_iter()
        .filter_map(|root| assemble(root, &children, &mut slots))
        .collect();

    // anything still unplaced sits on a parent cycle
    let mut cut = false;
    for i in 0..slots.len() {
        if let Some(node) = assemble(i, &children, &mut slots) {
            thread.push(node);
            cut = true;
        }
    }
    if cut {
        thread.sort_by(|a, b| {
            (a.comment.created_at, a.comment.id).cmp(&(b.comment.created_at, b.comment.id))
        });
    }

    thread
}

struct Frame {
    index: usize,
    comment: CommentRecord,
    next_child: usize,
    replies: Vec<ThreadedComment>,
}

// Post-order over `children` with an explicit stack; reply chains can be
// arbitrarily deep.
fn assemble(
    root: usize,
    children: &[Vec<usize>],
    slots: &mut [Option<CommentRecord>],
) -> Option<ThreadedComment> {
    let comment = slots[root].take()?;
    let mut stack = vec![Frame {
        index: root,
        comment,
        next_child: 0,
        replies: Vec::new(),
    }];

    while let Some(frame) = stack.last_mut() {
        if let Some(&child) = children[frame.index].get(frame.next_child) {
            frame.next_child += 1;
            if let Some(comment) = slots[child].take() {
                stack.push(Frame {
                    index: child,
                    comment,
                    next_child: 0,
                    replies: Vec::new(),
                });
            }
            continue;
        }

        let Some(done) = stack.pop() else { break };
        let node = ThreadedComment {
            comment: done.comment,
            replies: done.replies,
        };
        match stack.last_mut() {
            Some(parent) => parent.replies.push(node),
            None => return Some(node),
        }
    }
    None
}

/// Flat store of one entity's comments plus locally predicted likes.
///
/// `like_count` and `is_liked_by_user` on the stored records are the values from
/// the last fetch. Like toggles made since then live in a separate overlay that
/// is thrown away when the arena is replaced by a fresh fetch.
#[derive(Clone, Debug, Default)]
pub struct CommentArena {
    records: HashMap<CommentId, CommentRecord>,
    predicted_likes: HashMap<CommentId, bool>,
}

impl CommentArena {
    pub fn from_records(records: impl IntoIterator<Item = CommentRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.id, record))
                .collect(),
            predicted_likes: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        self.records.contains_key(id)
    }

    /// The record as currently displayed, predicted likes applied.
    pub fn get(&self, id: &CommentId) -> Option<CommentRecord> {
        self.records.get(id).map(|record| self.with_prediction(record))
    }

    fn with_prediction(&self, record: &CommentRecord) -> CommentRecord {
        let mut record = record.clone();
        if let Some(&liked) = self.predicted_likes.get(&record.id) {
            if liked != record.is_liked_by_user {
                record.like_count = if liked {
                    record.like_count + 1
                } else {
                    record.like_count.saturating_sub(1)
                };
                record.is_liked_by_user = liked;
            }
        }
        record
    }

    /// Records the outcome of a like toggle for the current user.
    ///
    /// Predicting the fetched state again clears the overlay entry, so two toggles
    /// always land back on the fetched values.
    pub fn predict_like(&mut self, id: CommentId, liked: bool) -> bool {
        let Some(record) = self.records.get(&id) else {
            return false;
        };
        if record.is_liked_by_user == liked {
            self.predicted_likes.remove(&id);
        } else {
            self.predicted_likes.insert(id, liked);
        }
        true
    }

    /// Applies an edit in place. Replies and like data are untouched.
    pub fn apply_edit(&mut self, id: CommentId, content: String, updated_at: DateTime<Utc>) -> bool {
        match self.records.get_mut(&id) {
            Some(record) => {
                record.content = content;
                record.is_edited = true;
                record.updated_at = updated_at;
                true
            }
            None => false,
        }
    }

    /// Removes a comment and every comment below it. Returns the removed ids.
    pub fn remove_subtree(&mut self, id: CommentId) -> Vec<CommentId> {
        if !self.records.contains_key(&id) {
            return Vec::new();
        }

        let mut children: HashMap<CommentId, Vec<CommentId>> = HashMap::new();
        for record in self.records.values() {
            if let Some(parent) = record.parent_id {
                children.entry(parent).or_default().push(record.id);
            }
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if self.records.remove(&next).is_none() {
                continue;
            }
            self.predicted_likes.remove(&next);
            removed.push(next);
            if let Some(kids) = children.get(&next) {
                stack.extend(kids.iter().copied());
            }
        }
        removed
    }

    /// Nesting depth of a comment, roots (and orphans) being depth 0.
    pub fn depth(&self, id: &CommentId) -> Option<usize> {
        let mut record = self.records.get(id)?;
        let mut depth = 0;
        while let Some(parent) = record
            .parent_id
            .filter(|p| *p != record.id)
            .and_then(|p| self.records.get(&p))
        {
            depth += 1;
            if depth >= self.records.len() {
                break;
            }
            record = parent;
        }
        Some(depth)
    }

    /// The comment a reply should attach to when the user replies on `clicked`.
    ///
    /// Replies never nest deeper than [`MAX_NESTING_DEPTH`]: replying on a comment
    /// already at that depth attaches to its nearest ancestor above the limit.
    pub fn reply_parent(&self, clicked: &CommentId) -> Option<CommentId> {
        let mut target = *clicked;
        for _ in 0..=self.records.len() {
            if self.depth(&target)? < MAX_NESTING_DEPTH {
                return Some(target);
            }
            match self.records.get(&target).and_then(|r| r.parent_id) {
                Some(parent) if self.records.contains_key(&parent) => target = parent,
                _ => return Some(target),
            }
        }
        Some(*clicked)
    }

    /// The threaded view, predicted likes applied.
    pub fn thread(&self) -> Vec<ThreadedComment> {
        build_thread(
            self.records
                .values()
                .map(|record| self.with_prediction(record)),
        )
    }
}
