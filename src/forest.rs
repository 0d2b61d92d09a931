//! Bottom-up tree construction in O(n).
//!
//! A forest is a transient, position-ordered array of trees of mixed
//! heights. Leaves are appended left to right; whenever LIMIT trees of
//! the same height have accumulated they are packed under one fresh
//! parent, which counts as a tree at the next height up, cascading.
//! `finish` then concatenates the per-height remainders from shortest
//! to tallest, which keeps the final tree left-balanced.

use std::rc::Rc;

use crate::mutations::{concat_roots, underflow};
use crate::node::{Elems, Kids, Node, NodeRef};
use crate::{HALF, LIMIT};

pub(crate) struct Forest<T> {
    /// Position order, left to right.
    trees: Vec<NodeRef<T>>,
    num_leaves: usize,
}

impl<T: Clone> Forest<T> {
    pub(crate) fn new() -> Self {
        Forest {
            trees: Vec::with_capacity(LIMIT),
            num_leaves: 0,
        }
    }

    /// Append one leaf. Empty leaves are skipped.
    pub(crate) fn append_leaf(&mut self, leaf: Node<T>) {
        debug_assert!(leaf.is_leaf());
        if leaf.child_count() == 0 {
            return;
        }

        self.trees.push(Rc::new(leaf));
        self.num_leaves += 1;

        let mut power = LIMIT;
        while self.num_leaves % power == 0 {
            let at = self.trees.len() - LIMIT;
            let group: Kids<T> = self.trees.drain(at..).collect();
            let mut parent = Node::internal_from(group);
            // The most recent leaf may be short.
            let collapsed = underflow(&mut parent, LIMIT - 1);
            debug_assert_eq!(collapsed, 0);
            self.trees.push(Rc::new(parent));
            power = power.saturating_mul(LIMIT);
        }
    }

    /// Combine everything into one tree. Collects the leftover trees
    /// at each height into a single node and concatenates upward.
    pub(crate) fn finish(mut self) -> Node<T> {
        let mut out: Option<(Node<T>, usize)> = None;
        let mut num_leaves = self.num_leaves;
        let mut group_height = 1;

        while !self.trees.is_empty() {
            let n = num_leaves % LIMIT;
            num_leaves /= LIMIT;
            group_height += 1;
            if n == 0 {
                continue;
            }

            let at = self.trees.len() - n;
            let group_kids: Kids<T> = self.trees.drain(at..).collect();
            let mut group = Node::internal_from(group_kids);
            let adj = underflow(&mut group, n - 1);
            let height = group_height - adj;

            out = Some(match out {
                None => (group, height),
                Some((tree, tree_height)) => concat_roots(group, height, tree, tree_height),
            });
        }

        match out {
            Some((tree, _)) => tree,
            None => Node::new_leaf(),
        }
    }
}

/// Build a tree from a slice in O(n): exact-LIMIT leaves plus one
/// trailing short one.
pub(crate) fn build_from_slice<T: Clone>(src: &[T]) -> Node<T> {
    if src.len() <= LIMIT {
        return Node::Leaf(src.iter().cloned().collect());
    }
    let mut forest = Forest::new();
    for chunk in src.chunks(LIMIT) {
        forest.append_leaf(Node::Leaf(chunk.iter().cloned().collect()));
    }
    forest.finish()
}

/// Build a tree by draining an iterator. Sequences of at most LIMIT
/// elements short-circuit to a single leaf without forest setup.
pub(crate) fn build_from_iter<T: Clone, I: Iterator<Item = T>>(mut iter: I) -> Node<T> {
    let mut first: Elems<T> = Elems::new();
    for _ in 0..LIMIT {
        match iter.next() {
            Some(v) => first.push(v),
            None => return Node::Leaf(first),
        }
    }

    let mut forest = Forest::new();
    forest.append_leaf(Node::Leaf(first));

    let mut cur: Elems<T> = Elems::new();
    for v in iter {
        if cur.len() == LIMIT {
            forest.append_leaf(Node::Leaf(std::mem::take(&mut cur)));
        }
        cur.push(v);
    }
    forest.append_leaf(Node::Leaf(cur));
    forest.finish()
}

/// The complementary bottom-up packer for children that are already
/// subtrees of one common height, each with at least HALF children
/// (except possibly a sole survivor). Used to reassemble a tree from
/// an ordered array of leaves.
pub(crate) fn build_from_children<T: Clone>(mut children: Vec<NodeRef<T>>) -> Node<T> {
    assert!(!children.is_empty());
    loop {
        if children.len() == 1 {
            return crate::node::take_or_clone(children.pop().unwrap());
        }

        let mut parents: Vec<NodeRef<T>> = Vec::with_capacity(children.len() / LIMIT + 1);
        let mut iter = children.into_iter().peekable();
        while iter.peek().is_some() {
            let group: Kids<T> = iter.by_ref().take(LIMIT).collect();
            debug_assert!(group.iter().all(|c| c.child_count() >= HALF));
            parents.push(Rc::new(Node::internal_from(group)));
        }

        // If the trailing parent came out short, rebalance it with its
        // left neighbor.
        let len = parents.len();
        if len >= 2 && parents[len - 1].child_count() < HALF {
            let needed = HALF - parents[len - 1].child_count();
            let (left_half, right_half) = parents.split_at_mut(len - 1);
            let left = Rc::make_mut(&mut left_half[len - 2]);
            let right = Rc::make_mut(&mut right_half[0]);
            let lc = left.unwrap_children_mut();
            let at = lc.len() - needed;
            let moved: Kids<T> = lc.drain(at..).collect();
            left.adjust_n();
            right.unwrap_children_mut().insert_many(0, moved);
            right.adjust_n();
        }

        children = parents;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(node: &Node<usize>) -> Vec<usize> {
        fn walk(node: &Node<usize>, out: &mut Vec<usize>) {
            match node {
                Node::Leaf(elems) => out.extend(elems.iter().copied()),
                Node::Internal { children, .. } => {
                    for c in children {
                        walk(c, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(node, &mut out);
        out
    }

    fn check_balanced(node: &Node<usize>) {
        fn depth_check(node: &Node<usize>, is_root: bool) -> usize {
            match node {
                Node::Leaf(e) => {
                    assert!(e.len() <= LIMIT);
                    1
                }
                Node::Internal { n, children } => {
                    if !is_root {
                        assert!(children.len() >= HALF);
                    }
                    assert!(children.len() <= LIMIT);
                    assert_eq!(*n, children.iter().map(|c| c.len()).sum::<usize>());
                    let ds: Vec<usize> =
                        children.iter().map(|c| depth_check(c, false)).collect();
                    assert!(ds.windows(2).all(|w| w[0] == w[1]));
                    ds[0] + 1
                }
            }
        }
        depth_check(node, true);
    }

    #[test]
    fn build_at_many_sizes() {
        for n in [
            0,
            1,
            LIMIT,
            LIMIT + 1,
            LIMIT * LIMIT,
            LIMIT * LIMIT + LIMIT / 2,
            LIMIT * LIMIT * LIMIT + 3,
        ] {
            let tree = build_from_iter(0..n);
            assert_eq!(tree.len(), n, "n = {}", n);
            check_balanced(&tree);
            assert_eq!(contents(&tree), (0..n).collect::<Vec<_>>(), "n = {}", n);
        }
    }

    #[test]
    fn slice_and_iter_builds_agree() {
        let src: Vec<usize> = (0..LIMIT * 5 + 3).collect();
        let a = build_from_slice(&src);
        let b = build_from_iter(src.iter().copied());
        assert_eq!(contents(&a), contents(&b));
        check_balanced(&a);
        check_balanced(&b);
    }

    #[test]
    fn repack_from_leaves() {
        for leaves_n in [1usize, 2, LIMIT, LIMIT + 1, LIMIT * 2 + 1] {
            let mut leaves: Vec<NodeRef<usize>> = Vec::new();
            let mut next = 0;
            for _ in 0..leaves_n {
                let leaf: Elems<usize> = (next..next + HALF).collect();
                next += HALF;
                leaves.push(Rc::new(Node::Leaf(leaf)));
            }
            let tree = build_from_children(leaves);
            check_balanced(&tree);
            assert_eq!(contents(&tree), (0..next).collect::<Vec<_>>());
        }
    }
}
