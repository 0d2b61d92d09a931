//! Every routine that changes the shape of a tree: balanced insertion
//! and deletion, underflow repair, splitting, and concatenation of
//! trees with different heights.
//!
//! The conventions shared by everything here:
//!
//! - A routine that descends with intent to write privatizes each child
//!   on the way down (`Node::child_mut`).
//! - Insertions report overflow by returning the freshly split-off
//!   right sibling; the caller installs it one slot to the right.
//! - Deletions report how many levels the subtree shrank by, so the
//!   parent can lift and re-insert the short subtree.
//! - Removed elements and unlinked subtrees go into the [`DropQueue`],
//!   never dropped mid-rebalance.

use std::rc::Rc;

use smallvec::smallvec;

use crate::drop_queue::DropQueue;
use crate::node::{take_or_clone, Elems, Node, NodeRef};
use crate::{HALF, LIMIT};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum Side {
    Left,
    Right,
}

/// The two things a slot can hold, depending on the node flavor.
pub(crate) enum Item<T> {
    Elem(T),
    Tree(NodeRef<T>),
}

fn insert_slot<T: Clone>(node: &mut Node<T>, k: usize, item: Item<T>) {
    match (node, item) {
        (Node::Leaf(elems), Item::Elem(v)) => elems.insert(k, v),
        (Node::Internal { n, children }, Item::Tree(t)) => {
            *n += t.len();
            children.insert(k, t);
        }
        _ => unreachable!("slot flavor does not match node flavor"),
    }
}

/// Split a full node, moving its upper HALF children into a fresh
/// sibling.
fn new_sibling<T: Clone>(node: &mut Node<T>) -> Node<T> {
    debug_assert_eq!(node.child_count(), LIMIT);
    match node {
        Node::Leaf(elems) => Node::Leaf(elems.drain(HALF..).collect()),
        Node::Internal { n, children } => {
            let upper: crate::node::Kids<T> = children.drain(HALF..).collect();
            let upper_n: usize = upper.iter().map(|c| c.len()).sum();
            *n -= upper_n;
            Node::Internal { n: upper_n, children: upper }
        }
    }
}

/// Insert `item` (an element or a whole subtree) at slot `k`. Since a
/// subtree may arrive with fewer than HALF children, the slot is
/// repaired with `underflow` after insertion. If the node would exceed
/// LIMIT children it splits, and the new right sibling is returned for
/// the caller to install.
pub(crate) fn insert_here<T: Clone>(
    node: &mut Node<T>,
    k: usize,
    item: Item<T>,
) -> Option<NodeRef<T>> {
    if node.child_count() < LIMIT {
        insert_slot(node, k, item);
        let collapse = underflow(node, k);
        debug_assert_eq!(collapse, 0);
        return None;
    }

    let mut sibling = new_sibling(node);

    if k < HALF {
        insert_slot(node, k, item);
        let collapse = underflow(node, k);
        debug_assert_eq!(collapse, 0);
    } else {
        insert_slot(&mut sibling, k - HALF, item);
        let collapse = underflow(&mut sibling, k - HALF);
        debug_assert_eq!(collapse, 0);
    }

    node.adjust_n();
    sibling.adjust_n();
    Some(Rc::new(sibling))
}

/// Recurse `depth` layers along the given side, then install `subtree`
/// as an immediate child there. Overflow propagates back up as a
/// returned sibling.
pub(crate) fn insert_subtree<T: Clone>(
    node: &mut Node<T>,
    side: Side,
    subtree: NodeRef<T>,
    depth: usize,
) -> Option<NodeRef<T>> {
    if depth > 0 {
        let Node::Internal { n, children } = node else {
            unreachable!("descent hit a leaf before reaching the target depth");
        };
        *n += subtree.len();
        let k = match side {
            Side::Left => 0,
            Side::Right => children.len() - 1,
        };
        let child = Rc::make_mut(&mut children[k]);
        let overflow = insert_subtree(child, side, subtree, depth - 1)?;
        return insert_here(node, k + 1, Item::Tree(overflow));
    }

    let at = match side {
        Side::Left => 0,
        Side::Right => node.child_count(),
    };
    insert_here(node, at, Item::Tree(subtree))
}

/// An insert overflowed at the root: demote the root's current state
/// into a new left child and adopt the overflow as the right child.
/// Returns true if the tree grew taller.
pub(crate) fn overflow_root<T: Clone>(root: &mut Node<T>, overflow: Option<NodeRef<T>>) -> bool {
    let Some(overflow) = overflow else {
        return false;
    };
    let old = std::mem::replace(root, Node::new_leaf());
    *root = Node::internal_from(smallvec![Rc::new(old), overflow]);
    true
}

/// Child `k` has underflowed. Move children over from the right
/// sibling until both hold ⌊total/2⌋-ish, preserving order.
fn borrow_right<T: Clone>(node: &mut Node<T>, k: usize) {
    let children = node.unwrap_children_mut();
    let total = children[k].child_count() + children[k + 1].child_count();
    let migrate = total / 2 - children[k].child_count();
    debug_assert!(total / 2 >= HALF && total - total / 2 >= HALF);

    let (left, right) = children.split_at_mut(k + 1);
    let p = Rc::make_mut(&mut left[k]);
    let sib = Rc::make_mut(&mut right[0]);
    match (p, sib) {
        (Node::Leaf(a), Node::Leaf(b)) => {
            a.extend(b.drain(..migrate));
        }
        (Node::Internal { n: na, children: ca }, Node::Internal { n: nb, children: cb }) => {
            for child in cb.drain(..migrate) {
                *na += child.len();
                *nb -= child.len();
                ca.push(child);
            }
        }
        _ => unreachable!("siblings at the same depth must share a flavor"),
    }
}

/// Child `k` has underflowed. Borrow from the left sibling.
fn borrow_left<T: Clone>(node: &mut Node<T>, k: usize) {
    let children = node.unwrap_children_mut();
    let total = children[k].child_count() + children[k - 1].child_count();
    let migrate = total / 2 - children[k].child_count();
    debug_assert!(total / 2 >= HALF && total - total / 2 >= HALF);

    let (left, right) = children.split_at_mut(k);
    let sib = Rc::make_mut(&mut left[k - 1]);
    let p = Rc::make_mut(&mut right[0]);
    match (sib, p) {
        (Node::Leaf(a), Node::Leaf(b)) => {
            let moved: Elems<T> = a.drain(a.len() - migrate..).collect();
            b.insert_many(0, moved);
        }
        (Node::Internal { n: na, children: ca }, Node::Internal { n: nb, children: cb }) => {
            let at = ca.len() - migrate;
            let moved: crate::node::Kids<T> = ca.drain(at..).collect();
            let moved_n: usize = moved.iter().map(|c| c.len()).sum();
            *na -= moved_n;
            *nb += moved_n;
            cb.insert_many(0, moved);
        }
        _ => unreachable!("siblings at the same depth must share a flavor"),
    }
}

/// Child `k` has underflowed and the right sibling is small enough to
/// absorb whole. The sibling's slot disappears; its children move (or,
/// if the sibling is shared, are shallow-copied) into child `k`.
fn merge_right<T: Clone>(node: &mut Node<T>, k: usize) {
    let children = node.unwrap_children_mut();
    let absorbed = take_or_clone(children.remove(k + 1));
    let p = Rc::make_mut(&mut children[k]);
    match (p, absorbed) {
        (Node::Leaf(a), Node::Leaf(b)) => a.extend(b),
        (Node::Internal { n, children: ca }, Node::Internal { n: nb, children: cb }) => {
            *n += nb;
            ca.extend(cb);
        }
        _ => unreachable!("siblings at the same depth must share a flavor"),
    }
}

/// Child `k` has underflowed; absorb the left sibling into its front.
fn merge_left<T: Clone>(node: &mut Node<T>, k: usize) {
    let children = node.unwrap_children_mut();
    let absorbed = take_or_clone(children.remove(k - 1));
    let p = Rc::make_mut(&mut children[k - 1]);
    match (p, absorbed) {
        (Node::Leaf(a), Node::Leaf(b)) => a.insert_many(0, b),
        (Node::Internal { n, children: ca }, Node::Internal { n: nb, children: cb }) => {
            *n += nb;
            ca.insert_many(0, cb);
        }
        _ => unreachable!("siblings at the same depth must share a flavor"),
    }
}

/// Fuse an internal node that is down to a single child with that
/// child, shortening the tree by one level. Returns 1 if a collapse
/// happened, 0 otherwise; either way `n` is recomputed.
pub(crate) fn collapse<T: Clone>(node: &mut Node<T>) -> usize {
    match node {
        Node::Internal { children, .. } if children.len() == 1 => {
            let child = take_or_clone(children.pop().unwrap());
            *node = child;
            1
        }
        _ => {
            node.adjust_n();
            0
        }
    }
}

/// Check whether children `k-1`, `k`, or `k+1` have underflowed and
/// move things around until `node` is the root of a valid subtree
/// again, possibly collapsing it. Always leaves `n` recomputed.
pub(crate) fn underflow<T: Clone>(node: &mut Node<T>, mut k: usize) -> usize {
    if node.is_leaf() {
        return 0;
    }

    if k < node.child_count() {
        loop {
            node.child_mut(k);
            let have = node.child_len(k);
            if have >= HALF {
                break;
            }
            let short = HALF - have;
            let num = node.child_count();
            if k + 1 < num && node.child_len(k + 1) >= HALF + short {
                borrow_right(node, k);
            } else if k > 0 && node.child_len(k - 1) >= HALF + short {
                borrow_left(node, k);
            } else if k + 1 < num {
                merge_right(node, k);
            } else if k > 0 {
                merge_left(node, k);
                k -= 1;
            } else {
                // No siblings for the short child.
                return collapse(node);
            }
        }
    }

    if k > 0 && node.child_len(k - 1) < HALF {
        let collapsed = underflow(node, k - 1);
        if collapsed != 0 {
            return collapsed;
        }
    }

    if k + 1 < node.child_count() && node.child_len(k + 1) < HALF {
        let collapsed = underflow(node, k + 1);
        if collapsed != 0 {
            return collapsed;
        }
    }

    collapse(node)
}

/// Child `k` is an exclusively-owned subtree that is `depth` levels too
/// short. Lift it out and re-insert it at the matching depth under a
/// neighboring sibling, then repair.
pub(crate) fn reinsert_subtree<T: Clone>(node: &mut Node<T>, k: usize, depth: usize) -> usize {
    let children = node.unwrap_children_mut();
    debug_assert_eq!(Rc::strong_count(&children[k]), 1);
    let subtree = children.remove(k);

    if node.child_count() > k {
        // Merge into the subtree now at `k`, along its left edge.
        let child = node.child_mut(k);
        let overflow = insert_subtree(child, Side::Left, subtree, depth - 1);
        if let Some(o) = overflow {
            node.unwrap_children_mut().insert(k + 1, o);
        }
    } else {
        let child = node.child_mut(k - 1);
        let overflow = insert_subtree(child, Side::Right, subtree, depth - 1);
        if let Some(o) = overflow {
            node.unwrap_children_mut().insert(k, o);
        }
    }

    underflow(node, k)
}

/// Delete elements `i..j` from the subtree. Returns how many levels
/// shorter the subtree came out (0 if unchanged, and, as a special
/// exception, 0 when the whole subtree was emptied).
pub(crate) fn delslice<T: Clone>(
    node: &mut Node<T>,
    i: usize,
    j: usize,
    dq: &mut DropQueue<T>,
) -> usize {
    let j = j.min(node.len());
    if i >= j {
        return 0;
    }

    if let Node::Leaf(elems) = node {
        dq.defer_elems(elems.drain(i..j));
        return 0;
    }

    if i == 0 && j >= node.len() {
        let old = std::mem::replace(node, Node::new_leaf());
        dq.defer_node(old);
        return 0;
    }

    let (k, so_far) = node.locate(i);
    let (k2, so_far2) = node.locate(j - 1);

    if k == k2 {
        // The whole deleted range lives under one child. Recurse, then
        // repair a short subtree and/or an underflow.
        debug_assert_eq!(so_far, so_far2);
        let child = node.child_mut(k);
        let depth = delslice(child, i - so_far, j - so_far, dq);
        if child.len() == 0 {
            let empty = node.unwrap_children_mut().remove(k);
            dq.defer_tree(empty);
            return collapse(node);
        }
        if depth == 0 {
            return underflow(node, k);
        }
        return reinsert_subtree(node, k, depth);
    }

    // The range spans children: a left boundary child keeping a prefix,
    // a right boundary child keeping a suffix, and fully deleted
    // children in between.
    let collapse_left = {
        let child = node.child_mut(k);
        delslice(child, i - so_far, j - so_far, dq)
    };
    let collapse_right = {
        let child = node.child_mut(k2);
        delslice(child, i.saturating_sub(so_far2), j - so_far2, dq)
    };

    {
        let children = node.unwrap_children_mut();
        for gone in children.drain(k + 1..k2) {
            dq.defer_tree(gone);
        }
    }
    let k2 = k + 1;

    let mut deleted_k = false;
    let mut deleted_k2 = false;
    {
        let children = node.unwrap_children_mut();
        if children[k2].len() == 0 {
            dq.defer_tree(children.remove(k2));
            deleted_k2 = true;
        }
        if children[k].len() == 0 {
            dq.defer_tree(children.remove(k));
            deleted_k = true;
        }
    }

    if deleted_k && deleted_k2 {
        // No messy subtrees left behind.
        return collapse(node);
    }

    // Fix collapsed boundary subtrees first, then worry about
    // underflow.
    let mut k = k;
    let depth;
    if !deleted_k && !deleted_k2 && collapse_left != 0 && collapse_right != 0 {
        // Both boundaries exist and both collapsed: fuse them.
        let children = node.unwrap_children_mut();
        let right = take_or_clone(children.remove(k + 1));
        let left = take_or_clone(children.remove(k));
        let (merged, d) = concat_subtrees(left, collapse_left, right, collapse_right);
        node.unwrap_children_mut().insert(k, Rc::new(merged));
        depth = d;
    } else if deleted_k {
        // Only the right boundary remains; it sits at `k` now.
        depth = collapse_right;
    } else if !deleted_k2 && collapse_left == 0 {
        k += 1;
        depth = collapse_right;
    } else {
        depth = collapse_left;
    }

    if depth == 0 || node.child_count() == 1 {
        return depth + underflow(node, k);
    }

    reinsert_subtree(node, k, depth)
}

/// Concatenate two exclusively-owned trees whose heights differ by
/// `left_height - right_height = height_diff`. Returns the combined
/// tree and how much taller it is than the taller input (0 or 1).
pub(crate) fn concat_trees<T: Clone>(
    left: Node<T>,
    right: Node<T>,
    height_diff: isize,
) -> (Node<T>, usize) {
    let mut adj = 0;
    let (mut root, overflow) = if height_diff == 0 {
        let mut root = Node::internal_from(smallvec![Rc::new(left), Rc::new(right)]);
        let mut collapsed = underflow(&mut root, 0);
        if collapsed == 0 {
            collapsed = underflow(&mut root, 1);
        }
        if collapsed == 0 {
            adj = 1;
        }
        (root, None)
    } else if height_diff > 0 {
        // Left is taller; push the right tree down its right spine.
        let mut root = left;
        let overflow = insert_subtree(&mut root, Side::Right, Rc::new(right), height_diff as usize - 1);
        (root, overflow)
    } else {
        let mut root = right;
        let overflow =
            insert_subtree(&mut root, Side::Left, Rc::new(left), (-height_diff) as usize - 1);
        (root, overflow)
    };

    if overflow_root(&mut root, overflow) {
        adj += 1;
    }
    (root, adj)
}

/// Concatenate two subtrees whose shortness below a common parent is
/// `left_depth` / `right_depth`. Returns the combined subtree and its
/// resulting shortness.
pub(crate) fn concat_subtrees<T: Clone>(
    left: Node<T>,
    left_depth: usize,
    right: Node<T>,
    right_depth: usize,
) -> (Node<T>, usize) {
    let deepest = left_depth.max(right_depth);
    let diff = right_depth as isize - left_depth as isize;
    let (root, adj) = concat_trees(left, right, diff);
    (root, deepest - adj)
}

/// Concatenate two whole trees of known heights. Returns the combined
/// tree and its height.
pub(crate) fn concat_roots<T: Clone>(
    left: Node<T>,
    left_height: usize,
    right: Node<T>,
    right_height: usize,
) -> (Node<T>, usize) {
    let highest = left_height.max(right_height);
    let diff = left_height as isize - right_height as isize;
    let (root, adj) = concat_trees(left, right, diff);
    (root, highest + adj)
}

pub(crate) fn concat_unknown<T: Clone>(left: Node<T>, right: Node<T>) -> Node<T> {
    let lh = left.height();
    let rh = right.height();
    concat_roots(left, lh, right, rh).0
}

/// Redistribute two adjacent leaves so that neither is below HALF (or,
/// if they fit, pour the second into the first).
pub(crate) fn balance_leaves<T: Clone>(leaf1: &mut Node<T>, leaf2: &mut Node<T>) {
    let a = leaf1.unwrap_leaf_mut();
    let b = leaf2.unwrap_leaf_mut();
    if a.len() + b.len() <= LIMIT {
        a.extend(b.drain(..));
    } else if a.len() < HALF {
        let needed = HALF - a.len();
        a.extend(b.drain(..needed));
    } else if b.len() < HALF {
        let needed = HALF - b.len();
        let at = a.len() - needed;
        let moved: Elems<T> = a.drain(at..).collect();
        b.insert_many(0, moved);
    }
}

/// Append the contents of `other` onto `root`. `other` is an owned
/// tree; pass a shallow clone to share subtrees with a surviving list.
pub(crate) fn extend_tree<T: Clone>(root: &mut Node<T>, other: Node<T>) {
    if other.len() == 0 {
        return;
    }
    if root.len() == 0 {
        *root = other;
        return;
    }

    // Special case for speed: two small leaves.
    if root.is_leaf() && other.is_leaf() && root.len() + other.len() <= LIMIT {
        let Node::Leaf(b) = other else { unreachable!() };
        root.unwrap_leaf_mut().extend(b);
        return;
    }

    let mut left = std::mem::replace(root, Node::new_leaf());
    let mut right = other;

    if left.is_leaf() && right.is_leaf() {
        balance_leaves(&mut left, &mut right);
        *root = Node::internal_from(smallvec![Rc::new(left), Rc::new(right)]);
        return;
    }

    *root = concat_unknown(left, right);
}

/// Try to append in place down the rightmost spine: every handle must
/// be exclusively owned and the terminal leaf must have room. Counters
/// are bumped on the way back up, only once the append is known good.
pub(crate) fn append_fast<T>(node: &mut Node<T>, v: T) -> Result<(), T> {
    match node {
        Node::Leaf(elems) => {
            if elems.len() < LIMIT {
                elems.push(v);
                Ok(())
            } else {
                Err(v)
            }
        }
        Node::Internal { n, children } => {
            let last = children.last_mut().unwrap();
            match Rc::get_mut(last) {
                None => Err(v),
                Some(child) => {
                    append_fast(child, v)?;
                    *n += 1;
                    Ok(())
                }
            }
        }
    }
}

/// The symmetric walk for removing the last element. Refuses (Err)
/// when a spine handle is shared or the terminal leaf would underflow.
pub(crate) fn pop_fast<T>(node: &mut Node<T>, is_root: bool) -> Result<Option<T>, ()> {
    match node {
        Node::Leaf(elems) => {
            if !is_root && elems.len() <= HALF {
                return Err(());
            }
            Ok(elems.pop())
        }
        Node::Internal { n, children } => {
            let last = children.last_mut().unwrap();
            match Rc::get_mut(last) {
                None => Err(()),
                Some(child) => {
                    let v = pop_fast(child, false)?;
                    debug_assert!(v.is_some());
                    *n -= 1;
                    Ok(v)
                }
            }
        }
    }
}

/// `root` doubled in place: small nodes duplicate their slots, larger
/// ones concatenate with a shallow self-copy.
pub(crate) fn double_tree<T: Clone>(root: &mut Node<T>) {
    if root.child_count() > HALF {
        let copy = root.clone();
        extend_tree(root, copy);
        return;
    }
    match root {
        Node::Leaf(elems) => {
            let copy: Elems<T> = elems.clone();
            elems.extend(copy);
        }
        Node::Internal { n, children } => {
            let copy: crate::node::Kids<T> = children.clone();
            children.extend(copy);
            *n *= 2;
        }
    }
}

/// Find position `i` and insert `v` just there. Returns the overflow
/// sibling, if any, for the caller to install.
pub(crate) fn insert_elem<T: Clone>(node: &mut Node<T>, i: usize, v: T) -> Option<NodeRef<T>> {
    if node.is_leaf() {
        let elems = node.unwrap_leaf_mut();
        // Speed up the common case.
        if elems.len() < LIMIT {
            elems.insert(i, v);
            return None;
        }
        return insert_here(node, i, Item::Elem(v));
    }

    let (k, so_far) = node.locate(i);
    let Node::Internal { n, children } = node else {
        unreachable!();
    };
    *n += 1;
    let child = Rc::make_mut(&mut children[k]);
    let overflow = insert_elem(child, i - so_far, v)?;
    insert_here(node, k + 1, Item::Tree(overflow))
}
