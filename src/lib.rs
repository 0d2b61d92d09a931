//! An ordered-sequence container backed by a B+-tree with copy-on-write
//! subtree sharing.
//!
//! [`TreeList`] supports the whole random-access list interface while
//! keeping the operations that are O(n) on an array-backed list
//! sub-linear: slice copy, slice assignment, slice deletion,
//! concatenation, repetition, and insertion / removal at arbitrary
//! positions are all O(log n) (plus the size of the data actually
//! touched).
//!
//! Three pieces make that work:
//!
//! - The tree itself. Nodes hold up to [`LIMIT`] children and subtrees
//!   are shared between lists through reference-counted handles, so
//!   `clone()`, `slice()` and `concat()` copy O(log n) nodes and defer
//!   the rest to copy-on-write.
//! - An index attached to each list that caches, per fixed-size offset
//!   bucket, which leaf holds that bucket. A warm cache turns repeated
//!   positional reads into two array lookups; a dirty-region tree keeps
//!   the cache honest across mutation.
//! - A bulk pipeline: bottom-up O(n) construction from iterators, and a
//!   stable sort that radix-sorts machine-word keys and gallop-merges
//!   everything else.
//!
//! ```rust
//! use treelist::TreeList;
//!
//! let mut list: TreeList<u32> = (0..1000).collect();
//! let tail = list.split_off(500);
//! list.extend_from_list(&tail); // cheap: shares subtrees
//! assert_eq!(list.len(), 1000);
//! assert_eq!(list[999], 999);
//! ```
//!
//! `TreeList` is a single-owner structure (`!Send`, `!Sync`). Elements
//! only need `Clone`; cloning happens when a shared leaf must be
//! privatized before a write. Wrap elements in `Rc` if cloning them is
//! expensive or if by-reference sharing semantics are wanted.

mod drop_queue;
mod forest;
mod index;
mod iter;
mod mutations;
mod node;
mod root;
#[cfg(feature = "serde")]
mod serde_helpers;
mod sort;

pub use iter::{IntoIter, Iter};
pub use root::TreeList;
pub use sort::{RadixKey, RawKey};

// In debug mode the fanout is kept intentionally small to exercise the
// node splitting / balancing code more.
#[cfg(debug_assertions)]
pub const LIMIT: usize = 8;
#[cfg(not(debug_assertions))]
pub const LIMIT: usize = 128;

const _: () = assert!(LIMIT % 2 == 0, "LIMIT must be divisible by 2");
const _: () = assert!(LIMIT >= 8, "LIMIT must be at least 8");

/// Minimum child count for internal non-root nodes.
pub(crate) const HALF: usize = LIMIT / 2;

/// Span of one index bucket, in elements.
pub(crate) const INDEX_FACTOR: usize = HALF;

/// Upper bound on the height of any reachable tree: every internal node
/// below the root carries at least HALF children, so a tree of height h
/// holds at least HALF^(h-1) elements.
pub(crate) const MAX_HEIGHT: usize = max_height();

const fn max_height() -> usize {
    let mut height = 1usize;
    let mut cap = HALF;
    while cap < isize::MAX as usize / HALF {
        cap *= HALF;
        height += 1;
    }
    height + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert_eq!(HALF * 2, LIMIT);
        assert_eq!(INDEX_FACTOR, HALF);
        // A tree of MAX_HEIGHT must be able to address any valid length.
        let mut cap = HALF as u128;
        for _ in 1..MAX_HEIGHT {
            cap *= HALF as u128;
        }
        assert!(cap >= isize::MAX as u128);
    }
}
