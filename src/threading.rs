//! Two-level reply threading.
//!
//! Replies arrive flat, in creation order. Top-level replies (no parent)
//! keep that order and each one carries its direct children, also in input
//! order. A reply whose parent is not a top-level reply of the same input
//! (a grandchild, or a dangling id) is left out of the result: only one
//! level of nesting is rendered.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::ReplyView;

/// Anything that can be placed in a reply thread.
pub trait Threadable {
    fn thread_id(&self) -> &str;
    fn parent_id(&self) -> Option<&str>;
}

impl Threadable for ReplyView {
    fn thread_id(&self) -> &str {
        &self.id
    }
    fn parent_id(&self) -> Option<&str> {
        self.parent_reply_id.as_deref()
    }
}

impl Threadable for crate::models::Reply {
    fn thread_id(&self) -> &str {
        &self.id
    }
    fn parent_id(&self) -> Option<&str> {
        self.parent_reply_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadedReply<T> {
    pub reply: T,
    pub children: Vec<T>,
}

pub fn build_thread<T: Threadable>(replies: Vec<T>) -> Vec<ThreadedReply<T>> {
    let mut top_level = Vec::new();
    let mut by_parent: HashMap<String, Vec<T>> = HashMap::new();

    for reply in replies {
        match reply.parent_id() {
            None => top_level.push(reply),
            Some(parent) => {
                let key = parent.to_string();
                by_parent.entry(key).or_default().push(reply);
            }
        }
    }

    top_level
        .into_iter()
        .map(|reply| {
            // remove, so a duplicated top-level id cannot render the same child twice
            let children = by_parent.remove(reply.thread_id()).unwrap_or_default();
            ThreadedReply { reply, children }
        })
        .collect()
}
