//! Deferred release of removed elements and detached subtrees.
//!
//! Element `Drop` impls are user code and may panic. Mutation routines
//! therefore never drop an element in the middle of rebalancing —
//! removed elements and unlinked subtrees are pushed here and released
//! only after the tree is coherent again, one entry at a time, so an
//! unwinding destructor leaves the queue reflecting exactly the
//! still-pending releases.

use crate::node::{Node, NodeRef};

pub(crate) enum Deferred<T> {
    Elem(T),
    Tree(NodeRef<T>),
}

pub(crate) struct DropQueue<T> {
    pending: Vec<Deferred<T>>,
}

impl<T> DropQueue<T> {
    pub(crate) fn new() -> Self {
        DropQueue { pending: Vec::new() }
    }

    pub(crate) fn defer_elems(&mut self, elems: impl IntoIterator<Item = T>) {
        self.pending.extend(elems.into_iter().map(Deferred::Elem));
    }

    /// Defer a whole unlinked subtree. If the handle is shared the
    /// release is just a count decrement and happens immediately.
    pub(crate) fn defer_tree(&mut self, tree: NodeRef<T>) {
        if let Ok(node) = std::rc::Rc::try_unwrap(tree) {
            self.defer_node(node);
        }
    }

    /// Defer the children of an owned node, consuming it.
    pub(crate) fn defer_node(&mut self, node: Node<T>) {
        match node {
            Node::Leaf(elems) => self.defer_elems(elems),
            Node::Internal { children, .. } => {
                self.pending.extend(children.into_iter().map(Deferred::Tree));
            }
        }
    }

    /// Take back the most recently deferred element, if the tail of
    /// the queue is one.
    pub(crate) fn pop_elem(&mut self) -> Option<T> {
        match self.pending.pop() {
            Some(Deferred::Elem(v)) => Some(v),
            Some(other) => {
                self.pending.push(other);
                None
            }
            None => None,
        }
    }

    /// Release everything, one entry at a time. Trees are unpacked
    /// level by level rather than dropped recursively.
    pub(crate) fn flush(&mut self) {
        while let Some(entry) = self.pending.pop() {
            match entry {
                Deferred::Elem(elem) => drop(elem),
                Deferred::Tree(tree) => {
                    if let Ok(node) = std::rc::Rc::try_unwrap(tree) {
                        self.defer_node(node);
                    }
                }
            }
        }
    }
}

impl<T> Drop for DropQueue<T> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountDrop<'a>(&'a Cell<usize>);
    impl Drop for CountDrop<'_> {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn flush_releases_everything_exactly_once() {
        let drops = Cell::new(0);
        let mut q = DropQueue::new();
        q.defer_elems([CountDrop(&drops), CountDrop(&drops)]);
        assert_eq!(drops.get(), 0);
        q.flush();
        assert_eq!(drops.get(), 2);
        q.flush();
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn shared_trees_are_only_unshared() {
        let leaf: NodeRef<u32> = Rc::new(Node::Leaf((0..4).collect()));
        let keep = leaf.clone();
        let mut q = DropQueue::new();
        q.defer_tree(leaf);
        q.flush();
        // The other holder keeps the subtree alive.
        assert_eq!(keep.len(), 4);
        assert_eq!(Rc::strong_count(&keep), 1);
    }
}
