//! Node representation for the radix store.
//!
//! Grounded on the teacher's `coredb::lock::QuickLock` for the per-node spin
//! (simplified here to a pure exclusion token, see [`crate::sync::SpinLock`]'s
//! own doc comment) and on `engine::idx::mtchm`'s CAS-node-replacement trie
//! for the general shape of a concurrently-mutated radix structure, though
//! the reclamation strategy diverges: `mtchm` uses `crossbeam_epoch` to defer
//! frees until no reader can observe a node; this store instead gives every
//! node reachability through `Arc`, so a node is freed the moment its last
//! `Arc` (the parent's child-list slot, plus whatever the maintenance lists
//! hold) drops — Rust's ownership model dissolves the epoch-reclamation
//! problem the teacher has to solve by hand.
//!
//! spec.md §9's "re-architect as arena-allocated nodes indexed by handle, or
//! an ownership rule where the deepest live node on a key's path owns the
//! bytes" is satisfied here by `key: Arc<[u8]>`: every node on a root-to-leaf
//! path clones the same `Arc`, so the bytes are freed exactly when the last
//! node referencing them is reclaimed, with no explicit owner bookkeeping
//! (K3) required at all.

use crate::sync::SpinLock;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

pub(super) const FLAG_ON_EXPIRY: u8 = 0b001;
pub(super) const FLAG_ON_DELETE: u8 = 0b010;
pub(super) const FLAG_DEAD: u8 = 0b100;

/// A user-supplied destructor, invoked with the key and the value it owned.
pub type Destructor<V> = Box<dyn FnOnce(&[u8], V) + Send>;

/// The payload a node carries while it is a leaf.
pub(super) struct Leaf<V> {
    pub value: V,
    pub destructor: Destructor<V>,
    pub timestamp: Instant,
}

#[derive(Default)]
pub(super) struct Flags(AtomicU8);

impl Flags {
    fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, bit: u8) {
        self.0.fetch_or(bit, Ordering::AcqRel);
    }

    pub fn clear(&self, bit: u8) {
        self.0.fetch_and(!bit, Ordering::AcqRel);
    }

    pub fn is_set(&self, bit: u8) -> bool {
        self.get() & bit != 0
    }
}

/// A trie node. Per spec.md §3: "A node in practice holds both fields [leaf
/// payload and child list]; the distinguishing attribute is whether its
/// child list is empty." We express that literally: every `Node` carries
/// both `leaf` and `children_head`, and "is this a leaf" is simply
/// `children_head.load().is_none()`.
pub(super) struct Node<V> {
    pub id: u8,
    pub level: u32,
    /// The key bytes for the leaf this node was created to represent. Set
    /// once at construction and never mutated afterwards — see the module
    /// doc comment on how this replaces `key_ref`.
    pub key: Option<Arc<[u8]>>,
    pub children_head: ArcSwapOption<Node<V>>,
    pub next: ArcSwapOption<Node<V>>,
    pub parent: Option<Weak<Node<V>>>,
    pub leaf: Mutex<Option<Leaf<V>>>,
    pub spin: SpinLock,
    pub flags: Flags,
}

impl<V> Node<V> {
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            id: 0,
            level: 0,
            key: None,
            children_head: ArcSwapOption::from(None),
            next: ArcSwapOption::from(None),
            parent: None,
            leaf: Mutex::new(None),
            spin: SpinLock::new(),
            flags: Flags::new(),
        })
    }

    pub fn new_leaf(id: u8, level: u32, key: Arc<[u8]>, leaf: Leaf<V>, parent: &Arc<Node<V>>) -> Arc<Self> {
        Arc::new(Self {
            id,
            level,
            key: Some(key),
            children_head: ArcSwapOption::from(None),
            next: ArcSwapOption::from(None),
            parent: Some(Arc::downgrade(parent)),
            leaf: Mutex::new(Some(leaf)),
            spin: SpinLock::new(),
            flags: Flags::new(),
        })
    }

    /// Childless, i.e. a leaf in the spec's sense.
    pub fn is_leaf(&self) -> bool {
        self.children_head.load().is_none()
    }

    pub fn parent(&self) -> Option<Arc<Node<V>>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// The level to use when slicing a key to find/create one of this
    /// node's children: 0 for the root, `self.level + 1` otherwise.
    pub fn child_level(&self) -> u32 {
        if self.parent.is_none() {
            0
        } else {
            self.level + 1
        }
    }

    /// Scan this node's children for one whose `id == slice`, regardless of
    /// delete-list status. Used by `add`'s descent: spec.md §9 requires a
    /// node flagged on-delete-list to be treated as a collision candidate,
    /// not skipped, to avoid momentarily duplicating a key.
    pub fn scan_any(&self, slice: u8) -> Option<Arc<Node<V>>> {
        let mut cur = self.children_head.load_full();
        while let Some(node) = cur {
            if node.id == slice {
                return Some(node);
            }
            cur = node.next.load_full();
        }
        None
    }

    /// Scan this node's children for a *live* match: a node flagged
    /// on-delete-list is treated as absent. Used by `find`/`delete`.
    pub fn scan_live(&self, slice: u8) -> Option<Arc<Node<V>>> {
        let mut cur = self.children_head.load_full();
        while let Some(node) = cur {
            if node.id == slice && !node.flags.is_set(FLAG_ON_DELETE) {
                return Some(node);
            }
            cur = node.next.load_full();
        }
        None
    }

    /// Approximate heap footprint, for the memory tracker.
    pub fn approx_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.key.as_ref().map_or(0, |k| k.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_key_and_is_a_leaf_by_default() {
        let root: Arc<Node<i32>> = Node::root();
        assert!(root.key.is_none());
        assert!(root.is_leaf());
        assert!(root.parent().is_none());
    }

    #[test]
    fn new_leaf_links_to_its_parent() {
        let root: Arc<Node<i32>> = Node::root();
        let key: Arc<[u8]> = Arc::from(vec![1, 2, 3, 4].into_boxed_slice());
        let leaf = Leaf {
            value: 42,
            destructor: Box::new(|_, _| {}),
            timestamp: Instant::now(),
        };
        let child = Node::new_leaf(1, 1, key, leaf, &root);
        assert!(child.is_leaf());
        assert!(Arc::ptr_eq(&child.parent().unwrap(), &root));
    }
}
