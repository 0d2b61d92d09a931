//! Tree nodes and the handle type they are shared through.
//!
//! A node is either a leaf owning up to [`LIMIT`] elements or an
//! internal node owning up to [`LIMIT`] child handles. Handles are
//! `Rc`s: a handle with a strong count above 1 is co-owned by several
//! trees and must be privatized before any mutation. `Rc::make_mut`
//! does exactly the right thing here — it shallow-copies the node,
//! bumping the share count of each grandchild handle (or cloning the
//! elements of a leaf), and swaps the private copy into place.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::LIMIT;

/// Shared handle to a subtree.
pub(crate) type NodeRef<T> = Rc<Node<T>>;

pub(crate) type Elems<T> = SmallVec<[T; LIMIT]>;
pub(crate) type Kids<T> = SmallVec<[NodeRef<T>; LIMIT]>;

#[derive(Clone, Debug)]
pub(crate) enum Node<T> {
    Leaf(Elems<T>),
    /// `n` is the element total over the whole subtree and must equal
    /// the sum of the children's totals.
    Internal { n: usize, children: Kids<T> },
}

impl<T> Node<T> {
    pub(crate) fn new_leaf() -> Self {
        Node::Leaf(SmallVec::new())
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Number of elements under this node.
    pub(crate) fn len(&self) -> usize {
        match self {
            Node::Leaf(elems) => elems.len(),
            Node::Internal { n, .. } => *n,
        }
    }

    /// Number of immediate children (for a leaf: elements).
    pub(crate) fn child_count(&self) -> usize {
        match self {
            Node::Leaf(elems) => elems.len(),
            Node::Internal { children, .. } => children.len(),
        }
    }

    pub(crate) fn unwrap_leaf(&self) -> &Elems<T> {
        match self {
            Node::Leaf(elems) => elems,
            Node::Internal { .. } => panic!("Expected leaf - found internal node"),
        }
    }

    pub(crate) fn unwrap_leaf_mut(&mut self) -> &mut Elems<T> {
        match self {
            Node::Leaf(elems) => elems,
            Node::Internal { .. } => panic!("Expected leaf - found internal node"),
        }
    }

    pub(crate) fn unwrap_children(&self) -> &Kids<T> {
        match self {
            Node::Internal { children, .. } => children,
            Node::Leaf(_) => panic!("Expected internal node"),
        }
    }

    pub(crate) fn unwrap_children_mut(&mut self) -> &mut Kids<T> {
        match self {
            Node::Internal { children, .. } => children,
            Node::Leaf(_) => panic!("Expected internal node"),
        }
    }

    /// Child count of child `k`. Internal nodes only.
    pub(crate) fn child_len(&self, k: usize) -> usize {
        self.unwrap_children()[k].child_count()
    }

    /// Find the child containing element offset `i` and the number of
    /// elements under the preceding siblings. The search scans from
    /// whichever end is nearer; `i == self.len()` resolves to the last
    /// child. Internal nodes only.
    pub(crate) fn locate(&self, i: usize) -> (usize, usize) {
        let Node::Internal { n, children } = self else {
            panic!("Expected internal node");
        };
        if i <= n / 2 {
            let mut so_far = 0;
            for (k, child) in children.iter().enumerate() {
                if i < so_far + child.len() {
                    return (k, so_far);
                }
                so_far += child.len();
            }
        } else {
            let mut so_far = *n;
            for (k, child) in children.iter().enumerate().rev() {
                so_far -= child.len();
                if i >= so_far {
                    return (k, so_far);
                }
            }
        }
        let k = children.len() - 1;
        (k, n - children[k].len())
    }

    /// Height of this subtree, recomputed down the rightmost spine. A
    /// single leaf has height 1. Heights are not stored; keeping them
    /// current everywhere would cost more than the occasional walk.
    pub(crate) fn height(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Internal { children, .. } => 1 + children.last().unwrap().height(),
        }
    }

    /// Recompute `n` from the immediate children. No-op for leaves.
    pub(crate) fn adjust_n(&mut self) {
        if let Node::Internal { n, children } = self {
            *n = children.iter().map(|c| c.len()).sum();
        }
    }
}

impl<T: Clone> Node<T> {
    pub(crate) fn internal_from(children: Kids<T>) -> Self {
        let n = children.iter().map(|c| c.len()).sum();
        Node::Internal { n, children }
    }

    /// Privatize child `k`: if its handle is shared, replace it with an
    /// exclusively-owned shallow copy. Returns the writable child.
    /// Any previously obtained reference into the old child is invalid.
    pub(crate) fn child_mut(&mut self, k: usize) -> &mut Node<T> {
        Rc::make_mut(&mut self.unwrap_children_mut()[k])
    }
}

/// Turn a handle into an owned node: move out of it if this was the
/// last holder, otherwise detach a shallow copy (sharing one level
/// down).
pub(crate) fn take_or_clone<T: Clone>(node: NodeRef<T>) -> Node<T> {
    Rc::try_unwrap(node).unwrap_or_else(|rc| (*rc).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn leaf_of(r: std::ops::Range<usize>) -> NodeRef<usize> {
        Rc::new(Node::Leaf(r.collect()))
    }

    #[test]
    fn locate_scans_from_the_nearer_end() {
        let node: Node<usize> = Node::internal_from(smallvec![
            leaf_of(0..4),
            leaf_of(4..9),
            leaf_of(9..13),
        ]);
        assert_eq!(node.len(), 13);
        assert_eq!(node.locate(0), (0, 0));
        assert_eq!(node.locate(3), (0, 0));
        assert_eq!(node.locate(4), (1, 4));
        assert_eq!(node.locate(8), (1, 4));
        assert_eq!(node.locate(12), (2, 9));
        // One past the end resolves to the last child.
        assert_eq!(node.locate(13), (2, 9));
    }

    #[test]
    fn privatizing_a_shared_child_copies_it() {
        let shared = leaf_of(0..4);
        let mut node: Node<usize> = Node::internal_from(smallvec![shared.clone(), leaf_of(4..8)]);
        assert_eq!(Rc::strong_count(&shared), 2);

        node.child_mut(0).unwrap_leaf_mut()[0] = 99;
        // The outside holder still sees the original data.
        assert_eq!(shared.unwrap_leaf()[0], 0);
        assert_eq!(node.unwrap_children()[0].unwrap_leaf()[0], 99);
        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    fn height_follows_the_rightmost_spine() {
        let leaf = leaf_of(0..2);
        assert_eq!(leaf.height(), 1);
        let mid = Rc::new(Node::internal_from(smallvec![leaf_of(0..2), leaf_of(2..4)]));
        let top: Node<usize> = Node::internal_from(smallvec![mid.clone(), mid]);
        assert_eq!(top.height(), 3);
    }
}
