//! A general-purpose atomic, head-prepend singly linked list.
//!
//! Named directly in spec.md §1 as one of the library's infrastructure
//! building blocks, and specialized by `store`'s expiry/delete lists (spec.md
//! §3: "an insertion-ordered singly linked list of nodes... Head-prepend is
//! performed with an atomic pointer swap so concurrent inserters never block
//! each other"). This module gives that specific behavior a standalone,
//! independently-tested home: push is a lock-free compare-and-swap retry
//! loop, and `drain` atomically detaches the whole chain for a maintenance
//! pass to walk, exactly as spec.md §4.1's expiry pass describes ("swap the
//! expiry-list head to null atomically; walk the previous generation").

use arc_swap::ArcSwapOption;
use std::sync::Arc;

struct Node<T> {
    value: T,
    next: Option<Arc<Node<T>>>,
}

/// A lock-free singly linked list supporting atomic head-prepend and
/// atomic whole-list detachment.
pub struct AtomicList<T> {
    head: ArcSwapOption<Node<T>>,
}

impl<T> Default for AtomicList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> AtomicList<T> {
    pub fn new() -> Self {
        Self {
            head: ArcSwapOption::from(None),
        }
    }

    /// Prepend `value` to the list. Lock-free: races with concurrent
    /// pushers are resolved by retrying the compare-and-swap, never by
    /// blocking.
    pub fn push(&self, value: T) {
        self.head.rcu(|current| {
            Some(Arc::new(Node {
                value: value.clone(),
                next: current.clone(),
            }))
        });
    }

    /// Atomically detach the entire chain, leaving the list empty, and
    /// return an iterator over the detached elements in push (most-recent
    /// first) order.
    pub fn drain(&self) -> Drain<T> {
        let head = self.head.swap(None);
        Drain { current: head }
    }

    /// True if the list is currently empty. Racy against concurrent
    /// pushers/drainers by construction — useful only as a hint.
    pub fn is_empty(&self) -> bool {
        self.head.load().is_none()
    }
}

/// Iterator returned by [`AtomicList::drain`].
pub struct Drain<T> {
    current: Option<Arc<Node<T>>>,
}

impl<T: Clone> Iterator for Drain<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let node = self.current.take()?;
        self.current = node.next.clone();
        // `node` is the sole remaining owner once `self.current` has moved
        // past it (the list was detached from `head`, and no other `Drain`
        // can be iterating the same chain), so unwrapping here never races.
        match Arc::try_unwrap(node) {
            Ok(inner) => Some(inner.value),
            Err(shared) => Some(shared.value.clone()),
        }
    }
}
