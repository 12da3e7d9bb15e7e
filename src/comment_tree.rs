//! Nesting of flat comment lists into reply trees
//!
//! The store returns comments as a flat, chronologically ordered list. The
//! public listing renders them as threads, so [`build_tree`] turns the list
//! into a forest where every comment carries its direct replies.
//!
//! Rules:
//! - a comment whose parent is in the input becomes one of its replies
//! - a comment without a parent, or whose parent is missing from the input
//!   (for example an unapproved parent filtered out by the caller), becomes a
//!   root
//! - siblings keep the relative order they had in the input
//!
//! Both the build and [`flatten`] run on explicit stacks, so arbitrarily deep
//! threads cannot overflow the call stack.

use std::collections::{HashMap, HashSet};

use crate::model::{Comment, NestedComment};

/// Builds the reply forest for `comments`.
///
/// Runs in linear time. If several comments share an id, the last one is the
/// one replies attach to; every input comment still becomes its own node.
///
/// Parent references that form a cycle can never reach a root. The earliest
/// cycle member (by input position) is promoted to a root and the cycle is cut
/// there, so no comment is lost or duplicated.
///
/// # Example
///
/// ```
/// # use chrono::Utc;
/// # use portfolio::comment_tree::build_tree;
/// # use portfolio::model::Comment;
/// # let comment = |id, parent: Option<u64>| Comment {
/// #     id, post_id: 1, parent_comment_id: parent, depth: 0, is_approved: true,
/// #     author_name: "a".into(), author_email: None, content: "c".into(),
/// #     created_at: Utc::now(),
/// # };
/// let tree = build_tree(vec![comment(1, None), comment(2, Some(1))]);
/// assert_eq!(tree.len(), 1);
/// assert_eq!(tree[0].replies[0].id(), 2);
/// ```
pub fn build_tree(comments: Vec<Comment>) -> Vec<NestedComment> {
    let count = comments.len();

    // First pass: index every comment by id
    let mut position_by_id: HashMap<u64, usize> = HashMap::with_capacity(count);
    for (position, comment) in comments.iter().enumerate() {
        position_by_id.insert(comment.id, position);
    }

    // Second pass: attach each comment to its parent or to the roots
    let mut parent_of: Vec<Option<usize>> = vec![None; count];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut roots: Vec<usize> = Vec::new();
    for (position, comment) in comments.iter().enumerate() {
        let parent = comment
            .parent_comment_id
            .and_then(|parent_id| position_by_id.get(&parent_id).copied());

        match parent {
            Some(parent) => {
                parent_of[position] = Some(parent);
                children[parent].push(position);
            }
            None => roots.push(position),
        }
    }

    let mut walk = Walk::new(count);
    for &root in &roots {
        walk.visit(root, &children);
    }

    // Whatever is still unvisited hangs off a parent cycle
    for position in 0..count {
        if !walk.visited[position] {
            let root = cycle_entry(position, &parent_of);
            tracing::warn!(
                comment_id = comments[root].id,
                "comment parent chain forms a cycle, promoting to root"
            );
            walk.visit(root, &children);
            roots.push(root);
        }
    }

    walk.assemble(comments, &roots)
}

/// Flattens a forest back into a list, each comment before its replies.
pub fn flatten(tree: &[NestedComment]) -> Vec<Comment> {
    let mut flat = Vec::new();
    let mut stack: Vec<&NestedComment> = tree.iter().rev().collect();

    while let Some(node) = stack.pop() {
        flat.push(node.comment.clone());
        stack.extend(node.replies.iter().rev());
    }

    flat
}

/// Total number of comments in a forest, replies included.
pub fn count_comments(tree: &[NestedComment]) -> usize {
    let mut total = 0;
    let mut stack: Vec<&NestedComment> = tree.iter().collect();

    while let Some(node) = stack.pop() {
        total += 1;
        stack.extend(node.replies.iter());
    }

    total
}

/// Iterative depth-first traversal that records the spanning forest.
struct Walk {
    visited: Vec<bool>,
    /// Pre-order: every node precedes all of its descendants
    order: Vec<usize>,
    tree_children: Vec<Vec<usize>>,
}

impl Walk {
    fn new(count: usize) -> Self {
        Self {
            visited: vec![false; count],
            order: Vec::with_capacity(count),
            tree_children: vec![Vec::new(); count],
        }
    }

    fn visit(&mut self, root: usize, children: &[Vec<usize>]) {
        if self.visited[root] {
            return;
        }
        self.visited[root] = true;

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            self.order.push(node);

            for &child in &children[node] {
                if !self.visited[child] {
                    self.visited[child] = true;
                    self.tree_children[node].push(child);
                }
            }

            stack.extend(self.tree_children[node].iter().rev());
        }
    }

    /// Builds owned nodes bottom-up by walking the pre-order backwards.
    fn assemble(mut self, comments: Vec<Comment>, roots: &[usize]) -> Vec<NestedComment> {
        let mut pending: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
        let mut built: Vec<Option<NestedComment>> = Vec::with_capacity(pending.len());
        built.resize_with(pending.len(), || None);

        for &node in self.order.iter().rev() {
            let replies = std::mem::take(&mut self.tree_children[node])
                .into_iter()
                .filter_map(|child| built[child].take())
                .collect();

            if let Some(comment) = pending[node].take() {
                built[node] = Some(NestedComment { comment, replies });
            }
        }

        roots
            .iter()
            .filter_map(|&root| built[root].take())
            .collect()
    }
}

/// Follows parent links from `start` until they loop, then returns the
/// lowest input position on that loop.
fn cycle_entry(start: usize, parent_of: &[Option<usize>]) -> usize {
    let mut seen = HashSet::new();
    let mut current = start;

    while seen.insert(current) {
        match parent_of[current] {
            Some(parent) => current = parent,
            None => return current,
        }
    }

    let mut lowest = current;
    let mut member = parent_of[current];
    while let Some(position) = member {
        if position == current {
            break;
        }
        lowest = lowest.min(position);
        member = parent_of[position];
    }

    lowest
}
